use super::parser::TSPacketParser;
use super::reader::PacketSource;
use super::types::*;
use crate::error::{Result, TsMetaError};
use crate::utils::Crc32Mpeg2;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};

/// Resolves which PID carries the wanted elementary stream.
#[async_trait]
pub trait StreamLocator: Send + Sync {
    /// Reads from `source` until the PID is known.
    ///
    /// Returns `Ok(None)` when the input ends first and
    /// [`TsMetaError::StreamNotFound`] when the program tables were read but
    /// none lists a matching stream.
    async fn locate(&self, source: &mut dyn PacketSource) -> Result<Option<u16>>;
}

/// Locates a stream by its PMT stream type, reading PAT then PMTs in order.
pub struct PmtStreamLocator {
    stream_type: u8,
    parser: TSPacketParser,
    crc: Crc32Mpeg2,
}

impl PmtStreamLocator {
    /// Locator for streams of `stream_type`.
    pub fn new(stream_type: u8) -> Self {
        Self {
            stream_type,
            parser: TSPacketParser::new(),
            crc: Crc32Mpeg2::new(),
        }
    }

    /// Stream type being searched for.
    pub fn stream_type(&self) -> u8 {
        self.stream_type
    }

    /// Reads packets until one complete, CRC-valid section with `table_id`
    /// arrives on `pid`. Packets on other PIDs are consumed and dropped.
    async fn read_section(
        &self,
        source: &mut dyn PacketSource,
        pid: u16,
        table_id: u8,
    ) -> Result<Option<Bytes>> {
        let mut assembler = SectionAssembler::default();

        while let Some(packet) = source.read_ts_packet().await? {
            if packet.pid() != pid {
                continue;
            }

            let unit_start = packet.header.payload_unit_start;
            let Some(section) = assembler.push(&self.parser, unit_start, &packet.payload) else {
                continue;
            };

            if section[0] != table_id {
                debug!(
                    "ignoring table {:#04x} on PID {:#06x}, waiting for {:#04x}",
                    section[0], pid, table_id
                );
                continue;
            }
            if !self.crc.verify_section(&section) {
                warn!("discarding section on PID {:#06x} with bad CRC", pid);
                continue;
            }
            return Ok(Some(section));
        }

        Ok(None)
    }
}

#[async_trait]
impl StreamLocator for PmtStreamLocator {
    async fn locate(&self, source: &mut dyn PacketSource) -> Result<Option<u16>> {
        let Some(section) = self.read_section(source, PID_PAT, TABLE_ID_PAT).await? else {
            return Ok(None);
        };
        let pat = self.parser.parse_pat(&section)?;
        debug!("PAT lists {} entries", pat.entries.len());

        for pmt_pid in pat.program_map_pids() {
            let Some(section) = self.read_section(source, pmt_pid, TABLE_ID_PMT).await? else {
                return Ok(None);
            };
            let pmt = self.parser.parse_pmt(&section)?;
            if let Some(pid) = pmt.find_stream(self.stream_type) {
                info!(
                    "stream type {:#04x} found on PID {:#06x} (program {})",
                    self.stream_type, pid, pmt.program_number
                );
                return Ok(Some(pid));
            }
        }

        Err(TsMetaError::StreamNotFound(self.stream_type))
    }
}

/// Collects one PSI section that may span several packets.
#[derive(Debug, Default)]
struct SectionAssembler {
    buffer: Option<BytesMut>,
}

impl SectionAssembler {
    /// Feeds one packet payload; returns the section once it is complete.
    fn push(
        &mut self,
        parser: &TSPacketParser,
        unit_start: bool,
        payload: &[u8],
    ) -> Option<Bytes> {
        if unit_start {
            let pointer = *payload.first()? as usize;
            let start = payload.get(1 + pointer..)?;
            self.buffer = Some(BytesMut::from(start));
        } else if let Some(buffer) = self.buffer.as_mut() {
            buffer.extend_from_slice(payload);
        } else {
            return None;
        }

        let buffer = self.buffer.as_ref()?;
        let total = parser.section_length(buffer)?;
        if buffer.len() < total {
            return None;
        }
        let mut buffer = self.buffer.take()?;
        Some(buffer.split_to(total).freeze())
    }
}
