use super::parser::TSPacketParser;
use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::trace;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A single 188-byte transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacket {
    /// Parsed 4-byte packet header
    pub header: TSHeader,
    /// Bytes after the header and any adaptation field
    pub payload: Bytes,
}

impl TsPacket {
    /// Packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid
    }

    /// Returns the payload when this packet begins a new PES unit: the
    /// unit start indicator is set and the payload opens with `00 00 01`.
    pub fn pes_start(&self) -> Option<Bytes> {
        if self.header.payload_unit_start && self.payload.starts_with(&[0x00, 0x00, 0x01]) {
            Some(self.payload.clone())
        } else {
            None
        }
    }
}

/// The `PacketSource` trait allows for reading transport packets from a source.
#[async_trait]
pub trait PacketSource: Send {
    /// Reads the next transport packet.
    ///
    /// Returns `Ok(None)` once the input is exhausted, including when only a
    /// partial packet remains.
    async fn read_ts_packet(&mut self) -> Result<Option<TsPacket>>;
}

/// Reads transport packets from an async byte stream.
///
/// No buffering is added beyond the packet being read; wrap the reader in a
/// `tokio::io::BufReader` when reading from files or sockets.
pub struct TSPacketReader<R: AsyncRead + Unpin + Send> {
    reader: R,
    parser: TSPacketParser,
    packets_read: u64,
}

impl<R: AsyncRead + Unpin + Send> TSPacketReader<R> {
    /// Wraps `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: TSPacketParser::new(),
            packets_read: 0,
        }
    }

    /// Number of complete packets read so far.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> PacketSource for TSPacketReader<R> {
    async fn read_ts_packet(&mut self) -> Result<Option<TsPacket>> {
        let mut data = BytesMut::zeroed(TS_PACKET_SIZE);
        match self.reader.read_exact(&mut data).await {
            Ok(_) => {}
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                trace!("end of input after {} packets", self.packets_read);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.packets_read += 1;

        let data = data.freeze();
        let header = self.parser.parse_header(&data)?;
        let payload = if header.contains_payload {
            let offset = self.parser.payload_offset(&header, &data)?;
            data.slice(offset..)
        } else {
            Bytes::new()
        };

        Ok(Some(TsPacket { header, payload }))
    }
}
