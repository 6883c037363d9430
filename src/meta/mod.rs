//! # Timestamped Metadata Records
//!
//! Decoded form of one metadata PES unit: the unit's presentation timestamp
//! and its tags. Tag values follow a `prefix NUL value` convention (for
//! example `TXXX` description and value) which [`split_value`] separates.

/// ID3v2 tag decoding
pub mod id3;

pub use id3::Id3Decoder;

use crate::error::Result;
use crate::format::ts::types::{pts_to_seconds, pts_to_time};
use crate::format::ts::PESUnit;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Turns a metadata payload into `tag id → raw string value` pairs.
pub trait TagDecoder: Send + Sync {
    /// Decodes `data`, failing with [`crate::TsMetaError::Decode`] when it is
    /// not a valid tag structure.
    fn decode(&self, data: &[u8]) -> Result<HashMap<String, String>>;
}

/// A tag value split into its optional prefix and the value proper.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetadataValue {
    /// Text before the NUL separator, empty when there is none
    pub prefix: String,
    /// Text after the separator, or the whole raw value
    pub value: String,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.value)
    }
}

/// Splits `raw` on NUL bytes. Exactly one NUL yields a prefix and value; any
/// other count leaves the prefix empty and `raw` as the value.
///
/// ```
/// use tsmeta::meta::split_value;
///
/// let value = split_value("INTENSITY\0high");
/// assert_eq!(value.prefix, "INTENSITY");
/// assert_eq!(value.value, "high");
/// assert_eq!(split_value("a\0b\0c").value, "a\0b\0c");
/// ```
pub fn split_value(raw: &str) -> MetadataValue {
    let segments: Vec<&str> = raw.split('\0').collect();
    match segments.as_slice() {
        [prefix, value] => MetadataValue {
            prefix: (*prefix).to_string(),
            value: (*value).to_string(),
        },
        _ => MetadataValue {
            prefix: String::new(),
            value: raw.to_string(),
        },
    }
}

/// Tags of one metadata unit, keyed by tag id.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// One completed metadata unit and the time it should be presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    /// Presentation timestamp in 90 kHz ticks; 0 when the unit carried none
    pub pts: u64,
    /// Decoded tags
    pub metadata: MetadataMap,
}

impl MetadataRecord {
    /// Presentation timestamp in seconds.
    pub fn pts_seconds(&self) -> f64 {
        pts_to_seconds(self.pts)
    }

    /// Presentation timestamp as a duration.
    pub fn presentation_time(&self) -> Duration {
        pts_to_time(self.pts)
    }

    /// Value of `tag`, if present.
    pub fn get(&self, tag: &str) -> Option<&MetadataValue> {
        self.metadata.get(tag)
    }
}

impl fmt::Display for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}: {{", self.pts_seconds())?;
        for (i, (tag, value)) in self.metadata.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", tag, value)?;
        }
        write!(f, "}}")
    }
}

/// Decodes a reassembled PES unit into a record.
pub fn decode_unit(decoder: &dyn TagDecoder, unit: &PESUnit) -> Result<MetadataRecord> {
    let tags = decoder.decode(&unit.payload).inspect_err(|e| {
        debug!(
            "undecodable payload ({}): {}",
            e,
            BASE64_STANDARD.encode(&unit.payload)
        );
    })?;

    if unit.header.pts.is_none() {
        debug!("metadata unit without PTS, using 0");
    }

    Ok(MetadataRecord {
        pts: unit.header.pts.unwrap_or(0),
        metadata: tags
            .iter()
            .map(|(tag, raw)| (tag.clone(), split_value(raw)))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TsMetaError;
    use crate::format::ts::PESHeader;
    use crate::format::ts::tests::metadata_pes;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    struct FixedDecoder(Option<Vec<(&'static str, &'static str)>>);

    impl TagDecoder for FixedDecoder {
        fn decode(&self, _data: &[u8]) -> Result<HashMap<String, String>> {
            match &self.0 {
                Some(tags) => Ok(tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()),
                None => Err(TsMetaError::Decode("not a tag".into())),
            }
        }
    }

    fn unit(pts: u64) -> PESUnit {
        let header = PESHeader::parse(Bytes::from(metadata_pes(pts, b""))).unwrap();
        PESUnit {
            header,
            payload: Bytes::from_static(b"payload"),
        }
    }

    #[test]
    fn test_split_value() {
        assert_eq!(
            split_value("INTENSITY\0high"),
            MetadataValue {
                prefix: "INTENSITY".into(),
                value: "high".into()
            }
        );
        assert_eq!(
            split_value("high"),
            MetadataValue {
                prefix: String::new(),
                value: "high".into()
            }
        );
        assert_eq!(
            split_value("a\0b\0c"),
            MetadataValue {
                prefix: String::new(),
                value: "a\0b\0c".into()
            }
        );
        assert_eq!(split_value("\0"), MetadataValue::default());
        assert_eq!(split_value("").value, "");
    }

    #[test]
    fn test_decode_unit() {
        let decoder = FixedDecoder(Some(vec![("TXXX", "PFX\0payload"), ("TIT2", "title")]));
        let record = decode_unit(&decoder, &unit(90_000)).unwrap();

        assert_eq!(record.pts, 90_000);
        assert_eq!(record.pts_seconds(), 1.0);
        assert_eq!(record.presentation_time(), Duration::from_secs(1));
        assert_eq!(
            record.get("TXXX"),
            Some(&MetadataValue {
                prefix: "PFX".into(),
                value: "payload".into()
            })
        );
        assert_eq!(record.get("TIT2").unwrap().prefix, "");
    }

    #[test]
    fn test_decode_unit_failure() {
        let decoder = FixedDecoder(None);
        assert!(matches!(
            decode_unit(&decoder, &unit(0)),
            Err(TsMetaError::Decode(_))
        ));
    }

    #[test]
    fn test_record_display() {
        let decoder = FixedDecoder(Some(vec![("TXXX", "PFX\0payload"), ("TIT2", "title")]));
        let record = decode_unit(&decoder, &unit(135_000)).unwrap();
        assert_eq!(record.to_string(), "1.5: {TIT2: /title, TXXX: PFX/payload}");
        assert_eq!(MetadataRecord::default().to_string(), "0.0: {}");
    }
}
