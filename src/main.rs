//! tsmeta - print timed ID3 metadata found in an MPEG transport stream
//!
//! # Usage
//!
//! ```bash
//! # Read a segment file
//! tsmeta -f segment.ts
//!
//! # Read from stdin, with debug logging
//! cat segment.ts | RUST_LOG=debug tsmeta
//!
//! # Look for a different PMT stream type
//! tsmeta -f capture.ts --stream-type 0x06
//! ```

use clap::Parser;
use futures::StreamExt;
use log::error;
use std::process;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tsmeta::{Extractor, ExtractorConfig};

#[derive(Parser, Debug)]
#[command(name = "tsmeta")]
#[command(
    about = "Extract timestamped ID3 metadata from an MPEG transport stream",
    long_about = None
)]
struct Args {
    /// Transport stream file to read (stdin when omitted)
    #[arg(short, long, value_name = "FILE")]
    file: Option<String>,

    /// PMT stream type of the metadata stream, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_stream_type)]
    stream_type: Option<u8>,

    /// Number of records buffered ahead of printing
    #[arg(long)]
    capacity: Option<usize>,
}

fn parse_stream_type(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid stream type '{}': {}", value, e))
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = ExtractorConfig::load();
    if let Some(stream_type) = args.stream_type {
        config = config.with_stream_type(stream_type);
    }
    if let Some(capacity) = args.capacity {
        config = config.with_channel_capacity(capacity);
    }

    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.file {
        Some(path) => match File::open(path).await {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                error!("failed to open '{}': {}", path, e);
                process::exit(1);
            }
        },
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut records = Extractor::new(config).read_stream(input);
    while let Some(record) = records.next().await {
        match record {
            Ok(record) => println!("{}", record),
            Err(e) => {
                error!("extraction failed: {}", e);
                process::exit(1);
            }
        }
    }
}
