//! # MPEG Transport Stream (TS) Implementation
//!
//! The transport stream side of metadata extraction:
//!
//! - TS packet reading and header parsing
//! - Program Specific Information (PAT/PMT) parsing and stream location
//! - Packetized Elementary Stream (PES) header parsing and reassembly
//!
//! ## Example Usage
//!
//! ### Reassembling PES units of one PID
//!
//! ```rust
//! use tsmeta::format::ts::{PESAccumulator, PacketSource, Progress, TSPacketReader};
//!
//! # async fn run(data: Vec<u8>) -> tsmeta::Result<()> {
//! let mut reader = TSPacketReader::new(std::io::Cursor::new(data));
//! let mut accumulator = PESAccumulator::new();
//!
//! while let Some(packet) = reader.read_ts_packet().await? {
//!     if packet.pid() != 0x102 {
//!         continue;
//!     }
//!     accumulator = match accumulator.push_packet(&packet)? {
//!         Progress::Pending(accumulator) => accumulator,
//!         Progress::Complete(unit) => {
//!             println!("PTS {:?}: {} bytes", unit.header.pts, unit.payload.len());
//!             PESAccumulator::new()
//!         }
//!     };
//! }
//! # Ok(())
//! # }
//! ```

/// PES reassembly from transport packet payloads
pub mod accumulator;

/// Stream location through PAT/PMT
pub mod locator;

/// Low-level TS packet and PSI section parsing
pub mod parser;

/// PES header parsing
pub mod pes;

/// Transport packet reading
pub mod reader;

/// Core TS types and constants
pub mod types;


pub use accumulator::{PESAccumulator, PESUnit, Progress};
pub use locator::{PmtStreamLocator, StreamLocator};
pub use parser::TSPacketParser;
pub use pes::{extract_time, PESHeader, PtsDtsIndicator};
pub use reader::{PacketSource, TSPacketReader, TsPacket};
pub use types::{
    TSHeader,
    PID_PAT,
    PTS_HZ,
    STREAM_TYPE_METADATA,
    TS_PACKET_SIZE,
};
