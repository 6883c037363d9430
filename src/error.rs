use thiserror::Error;

/// Errors produced while extracting metadata from a transport stream.
///
/// Running out of input is not an error: readers report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum TsMetaError {
    /// The underlying reader failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport packet framing is broken.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A PAT or PMT section could not be parsed.
    #[error("parser error: {0}")]
    Parser(String),

    /// A PES header is missing or too short to parse.
    #[error("malformed PES header: {0}")]
    MalformedHeader(String),

    /// More payload arrived than the PES header declared.
    #[error("overrun; expected {expected} got {actual}")]
    Overrun {
        /// Payload length declared by the header.
        expected: usize,
        /// Payload length accumulated so far.
        actual: usize,
    },

    /// No program carries an elementary stream of the requested type.
    #[error("no metadata stream found (stream type {0:#04x})")]
    StreamNotFound(u8),

    /// The tag decoder rejected a payload.
    #[error("tag decode error: {0}")]
    Decode(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TsMetaError>;
