//! # Utility Functions and Types
//!
//! Shared helpers used by the transport stream parsers.
//!
//! ## CRC Calculation
//!
//! PAT and PMT sections end with an MPEG-2 CRC32 that the stream locator
//! verifies before trusting a section:
//!
//! ```rust
//! use tsmeta::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::new();
//! let mut section = vec![0x00, 0xB0, 0x05, 0x00, 0x01];
//! let checksum = crc.calculate(&section);
//! section.extend_from_slice(&checksum.to_be_bytes());
//! assert!(crc.verify_section(&section));
//! ```

/// CRC calculation implementations
pub mod crc;

pub use crc::Crc32Mpeg2;
