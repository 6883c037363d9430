#![doc(html_root_url = "https://docs.rs/tsmeta/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsmeta - Timed Metadata from MPEG Transport Streams
//!
//! `tsmeta` pulls timestamped ID3 metadata out of MPEG transport streams, as
//! carried in HLS segments and broadcast captures. Each metadata PES unit
//! becomes one [`MetadataRecord`]: the unit's presentation time and its tags.
//!
//! ## Features
//!
//! - TS packet framing over any `tokio::io::AsyncRead`
//! - PAT/PMT parsing with CRC checks to locate the metadata stream
//!   (stream type `0x15`)
//! - PES header parsing and reassembly of units spanning many packets
//! - ID3v2.3 / ID3v2.4 tag decoding
//! - Run-to-completion or streaming delivery with backpressure and
//!   cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokio::fs::File;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = BufReader::new(File::open("segment.ts").await?);
//!
//!     for record in tsmeta::read_all(file).await.into_result()? {
//!         println!("{}", record);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tsmeta::{Extractor, ExtractorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::load().with_channel_capacity(16);
//!     let mut records = Extractor::new(config).read_stream(tokio::io::stdin());
//!
//!     while let Some(record) = records.next().await {
//!         let record = record?;
//!         if let Some(value) = record.get("TXXX") {
//!             println!("{:.3}s {}", record.pts_seconds(), value);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: transport stream packets, PSI tables and PES units
//! - `meta`: metadata records, value splitting and tag decoding
//! - `extract`: the extraction pipeline and its delivery modes
//! - `config`: extractor settings from defaults, file and environment
//! - `error`: error type and result alias
//! - `utils`: CRC calculation

/// Extractor settings
pub mod config;

/// Error types and utilities
pub mod error;

/// Extraction pipeline
pub mod extract;

/// Container format implementations
pub mod format;

/// Metadata records and tag decoding
pub mod meta;

/// Common utilities and helper functions
pub mod utils;

pub use config::ExtractorConfig;
pub use error::{Result, TsMetaError};
pub use extract::{read_all, read_stream, Extraction, Extractor, MetadataStream, RecordReader};
pub use meta::{split_value, Id3Decoder, MetadataRecord, MetadataValue, TagDecoder};
