use super::types::*;
use crate::error::{Result, TsMetaError};

/// Length of the PSI section header up to and including `last_section_number`.
const SECTION_HEADER_SIZE: usize = 8;
const SECTION_CRC_SIZE: usize = 4;

/// Stateless parser for transport packet headers and PSI sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TSPacketParser;

impl TSPacketParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self
    }

    /// Parses the 4-byte header of a transport packet.
    pub fn parse_header(&self, data: &[u8]) -> Result<TSHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(TsMetaError::InvalidData("TS packet too short".into()));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(TsMetaError::InvalidData(format!(
                "invalid sync byte {:#04x}",
                data[0]
            )));
        }

        Ok(TSHeader {
            sync_byte: data[0],
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Returns the offset of the payload within a full packet, skipping the
    /// adaptation field when present. Its contents are not interpreted.
    pub fn payload_offset(&self, header: &TSHeader, data: &[u8]) -> Result<usize> {
        let mut offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            let length = *data
                .get(offset)
                .ok_or_else(|| TsMetaError::InvalidData("adaptation field length missing".into()))?
                as usize;
            offset += 1 + length;
            if offset > data.len() {
                return Err(TsMetaError::InvalidData(format!(
                    "adaptation field length {} exceeds packet",
                    length
                )));
            }
        }
        Ok(offset)
    }

    /// Total length of a section (table id through CRC) given at least its
    /// first three bytes.
    pub fn section_length(&self, section: &[u8]) -> Option<usize> {
        if section.len() < 3 {
            return None;
        }
        let length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
        Some(3 + length)
    }

    /// Parses a complete PAT section, starting at its table id.
    pub fn parse_pat(&self, section: &[u8]) -> Result<PAT> {
        let end = self.checked_section_end(section, TABLE_ID_PAT, "PAT")?;
        let mut pat = PAT {
            transport_stream_id: ((section[3] as u16) << 8) | section[4] as u16,
            entries: Vec::new(),
        };

        let mut pos = SECTION_HEADER_SIZE;
        while pos + 4 <= end {
            let program_number = ((section[pos] as u16) << 8) | section[pos + 1] as u16;
            let pid = (((section[pos + 2] & 0x1F) as u16) << 8) | section[pos + 3] as u16;
            pat.entries.push(PATEntry {
                program_number,
                network_pid: if program_number == 0 { pid } else { 0 },
                program_map_pid: if program_number != 0 { pid } else { 0 },
            });
            pos += 4;
        }

        Ok(pat)
    }

    /// Parses a complete PMT section, starting at its table id.
    pub fn parse_pmt(&self, section: &[u8]) -> Result<PMT> {
        let end = self.checked_section_end(section, TABLE_ID_PMT, "PMT")?;
        let mut pmt = PMT {
            program_number: ((section[3] as u16) << 8) | section[4] as u16,
            ..Default::default()
        };
        let mut pos = SECTION_HEADER_SIZE;

        if pos + 4 > end {
            return Err(TsMetaError::Parser(
                "PMT too short for PCR PID and program info length".into(),
            ));
        }

        pmt.pcr_pid = ((section[pos] as u16 & 0x1F) << 8) | section[pos + 1] as u16;
        let program_info_length =
            ((section[pos + 2] as usize & 0x0F) << 8) | section[pos + 3] as usize;
        pos += 4;

        if pos + program_info_length > end {
            return Err(TsMetaError::Parser("Program info data too short".into()));
        }
        pmt.program_descriptors =
            self.parse_descriptors(&section[pos..pos + program_info_length])?;
        pos += program_info_length;

        while pos + 5 <= end {
            let stream_type = section[pos];
            let elementary_pid = ((section[pos + 1] as u16 & 0x1F) << 8) | section[pos + 2] as u16;
            let es_info_length =
                ((section[pos + 3] as usize & 0x0F) << 8) | section[pos + 4] as usize;
            pos += 5;

            if pos + es_info_length > end {
                return Err(TsMetaError::Parser("ES info data too short".into()));
            }

            let descriptors = self.parse_descriptors(&section[pos..pos + es_info_length])?;
            pos += es_info_length;

            pmt.elementary_stream_infos.push(ElementaryStreamInfo {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(pmt)
    }

    /// Validates table id and length, returning where the CRC begins.
    fn checked_section_end(&self, section: &[u8], table_id: u8, name: &str) -> Result<usize> {
        let total = self
            .section_length(section)
            .ok_or_else(|| TsMetaError::Parser(format!("{} section too short", name)))?;
        if section[0] != table_id {
            return Err(TsMetaError::Parser(format!(
                "unexpected table id {:#04x} for {}",
                section[0], name
            )));
        }
        if total > section.len() || total < SECTION_HEADER_SIZE + SECTION_CRC_SIZE {
            return Err(TsMetaError::Parser(format!(
                "{} section length {} invalid for {} available bytes",
                name,
                total,
                section.len()
            )));
        }
        Ok(total - SECTION_CRC_SIZE)
    }

    fn parse_descriptors(&self, data: &[u8]) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut pos = 0;

        while pos + 2 <= data.len() {
            let tag = data[pos];
            let length = data[pos + 1] as usize;
            pos += 2;

            if pos + length > data.len() {
                return Err(TsMetaError::Parser("Descriptor data too short".into()));
            }

            descriptors.push(Descriptor {
                tag,
                data: data[pos..pos + length].to_vec(),
            });
            pos += length;
        }

        Ok(descriptors)
    }
}
