//! Container formats.

/// MPEG transport stream
pub mod ts;

pub use self::ts::{PESAccumulator, PESHeader, PmtStreamLocator, TSPacketReader};
