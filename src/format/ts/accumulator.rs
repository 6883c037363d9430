use super::pes::PESHeader;
use super::reader::TsPacket;
use super::types::PES_FIXED_HEADER_SIZE;
use crate::error::{Result, TsMetaError};
use bytes::{Bytes, BytesMut};
use log::trace;

/// A fully reassembled PES unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESUnit {
    /// Header parsed from the first chunk
    pub header: PESHeader,
    /// Payload: trailing bytes of the first chunk followed by every later chunk
    pub payload: Bytes,
}

/// Outcome of feeding one chunk to a [`PESAccumulator`].
#[derive(Debug)]
pub enum Progress {
    /// More payload is expected; keep feeding the returned accumulator.
    Pending(PESAccumulator),
    /// The declared length has been reached exactly.
    Complete(PESUnit),
}

/// Reassembles one PES unit from successive payload chunks.
///
/// `push` consumes the accumulator: a unit that completed or failed cannot
/// be fed again. Start a fresh accumulator for the next unit.
#[derive(Debug, Default)]
pub struct PESAccumulator {
    header: Option<PESHeader>,
    expected: usize,
    data: BytesMut,
}

impl PESAccumulator {
    /// Accumulator waiting for the first chunk of a unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no chunk has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
    }

    /// Header parsed from the first chunk.
    pub fn header(&self) -> Option<&PESHeader> {
        self.header.as_ref()
    }

    /// Payload bytes the unit still needs, or `None` before the header is known.
    pub fn remaining(&self) -> Option<usize> {
        self.header.as_ref().map(|_| self.expected - self.data.len())
    }

    /// Feeds the payload of the next packet of this stream.
    ///
    /// The first packet must begin a PES unit.
    pub fn push_packet(self, packet: &TsPacket) -> Result<Progress> {
        if self.is_empty() {
            let pes = packet.pes_start().ok_or_else(|| {
                TsMetaError::MalformedHeader(format!(
                    "first packet on PID {:#06x} must contain a PES header",
                    packet.pid()
                ))
            })?;
            self.push(pes)
        } else {
            self.push(packet.payload.clone())
        }
    }

    /// Feeds one chunk. The first chunk is parsed as the PES header; later
    /// chunks are appended verbatim.
    pub fn push(mut self, chunk: Bytes) -> Result<Progress> {
        if self.header.is_some() {
            self.data.extend_from_slice(&chunk);
        } else {
            let header = PESHeader::parse(chunk)?;
            self.expected = match header.remaining_packet_size() {
                Some(expected) => expected,
                None => {
                    // the optional header alone already exceeds the declared length
                    let excess = header.data_start
                        - PES_FIXED_HEADER_SIZE
                        - header.packet_length as usize;
                    return Err(TsMetaError::Overrun {
                        expected: 0,
                        actual: excess + header.data.len(),
                    });
                }
            };
            self.data = BytesMut::with_capacity(self.expected);
            self.data.extend_from_slice(&header.data);
            self.header = Some(header);
        }

        self.check_done()
    }

    fn check_done(self) -> Result<Progress> {
        let actual = self.data.len();
        if actual > self.expected {
            return Err(TsMetaError::Overrun {
                expected: self.expected,
                actual,
            });
        }
        trace!("accumulated {} of {} PES bytes", actual, self.expected);

        match self.header {
            Some(header) if actual == self.expected => Ok(Progress::Complete(PESUnit {
                header,
                payload: self.data.freeze(),
            })),
            header => Ok(Progress::Pending(Self { header, ..self })),
        }
    }
}
