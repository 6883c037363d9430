use std::env;
use std::fs::File;
use std::io::Read;

use log::warn;

use crate::format::ts::types::STREAM_TYPE_METADATA;

/// Default number of records buffered between the producer task and the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

const ENV_STREAM_TYPE: &str = "TSMETA_STREAM_TYPE";
const ENV_CHANNEL_CAPACITY: &str = "TSMETA_CHANNEL_CAPACITY";
const CONFIG_PATHS: [&str; 2] = ["./tsmeta.toml", "./tsmeta_config.toml"];

/// Settings for an extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// PMT stream type identifying the metadata elementary stream.
    pub stream_type: u8,
    /// Capacity of the bounded channel used by streaming extraction.
    pub channel_capacity: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            stream_type: STREAM_TYPE_METADATA,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ExtractorConfig {
    /// Builds a configuration from defaults, then the first readable config
    /// file, then environment variables.
    pub fn load() -> Self {
        let mut config = Self::default();

        for path in &CONFIG_PATHS {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    config.apply_file(&content);
                    break;
                }
            }
        }

        config.apply_env();
        config
    }

    /// Overrides the metadata stream type.
    pub fn with_stream_type(mut self, stream_type: u8) -> Self {
        self.stream_type = stream_type;
        self
    }

    /// Overrides the channel capacity. Zero is raised to one.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var(ENV_STREAM_TYPE) {
            self.set("stream_type", &value);
        }
        if let Ok(value) = env::var(ENV_CHANNEL_CAPACITY) {
            self.set("channel_capacity", &value);
        }
    }

    /// Applies `key = value` lines; unknown keys and comments are ignored.
    fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "stream_type" => match parse_number(value).and_then(|v| u8::try_from(v).ok()) {
                Some(stream_type) => self.stream_type = stream_type,
                None => warn!("ignoring invalid stream_type {:?}", value),
            },
            "channel_capacity" => match parse_number(value).and_then(|v| usize::try_from(v).ok()) {
                Some(capacity) => self.channel_capacity = capacity.max(1),
                None => warn!("ignoring invalid channel_capacity {:?}", value),
            },
            _ => {}
        }
    }
}

/// Parses decimal or `0x`-prefixed hexadecimal numbers.
fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
