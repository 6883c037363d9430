use super::types::PES_FIXED_HEADER_SIZE;
use crate::error::{Result, TsMetaError};
use bytes::Bytes;
use std::fmt;

/// program_stream_map
pub const STREAM_ID_PROGRAM_STREAM_MAP: u8 = 0xBC;
/// private_stream_1
pub const STREAM_ID_PRIVATE_STREAM_1: u8 = 0xBD;
/// padding_stream
pub const STREAM_ID_PADDING_STREAM: u8 = 0xBE;
/// private_stream_2
pub const STREAM_ID_PRIVATE_STREAM_2: u8 = 0xBF;
/// ECM_stream
pub const STREAM_ID_ECM_STREAM: u8 = 0xF0;
/// EMM_stream
pub const STREAM_ID_EMM_STREAM: u8 = 0xF1;
/// DSMCC_stream
pub const STREAM_ID_DSM_CC_STREAM: u8 = 0xF2;
/// ITU-T Rec. H.222.1 type E stream
pub const STREAM_ID_ITU_T_H222_1_TYPE_E: u8 = 0xF8;
/// metadata_stream
pub const STREAM_ID_METADATA_STREAM: u8 = 0xFC;
/// program_stream_directory
pub const STREAM_ID_PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;

/// Offset of the first timestamp when optional fields are present.
const PTS_OFFSET: usize = 9;
const DTS_OFFSET: usize = 14;
const TIMESTAMP_SIZE: usize = 5;

/// Value of the two-bit `PTS_DTS_flags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtsDtsIndicator {
    /// No timestamps.
    #[default]
    None,
    /// Forbidden value `01`.
    Reserved,
    /// Only a PTS follows.
    PtsOnly,
    /// PTS followed by DTS.
    Both,
}

impl From<u8> for PtsDtsIndicator {
    fn from(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => PtsDtsIndicator::None,
            0b01 => PtsDtsIndicator::Reserved,
            0b10 => PtsDtsIndicator::PtsOnly,
            _ => PtsDtsIndicator::Both,
        }
    }
}

/// Packetized Elementary Stream (PES) header structure
///
/// Parsed once from the first payload chunk of a PES unit. Besides the header
/// fields it keeps the payload bytes that followed the header in that chunk.
///
/// ```text
///  packet_start_code_prefix      24   0x000001
///  stream_id                      8
///  PES_packet_length             16   bytes following this field
///  '10' scrambling priority
///  data_alignment copyright
///  original                       8
///  PTS_DTS_flags ESCR ES_rate
///  trick_mode copy_info CRC ext   8
///  PES_header_data_length         8
///  PTS (5 bytes, if flagged)
///  DTS (5 bytes, if flagged)
///  remaining optional fields / stuffing
///  data
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Start code prefix, 0x000001 for well-formed packets
    pub start_code_prefix: u32,
    /// Stream identifier indicating content type
    pub stream_id: u8,
    /// Number of bytes following the packet length field
    pub packet_length: u16,
    /// Data alignment indicator
    pub data_alignment: bool,
    /// Which timestamps the optional header carries
    pub pts_dts_indicator: PtsDtsIndicator,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
    /// Offset within the parsed buffer where payload data begins
    pub data_start: usize,
    /// Payload bytes following the header in the parsed buffer
    pub data: Bytes,
}

/// Extracts a 33-bit PTS/DTS value from its 5-byte marker-interleaved form.
///
/// ```
/// use tsmeta::format::ts::pes::extract_time;
///
/// // 90000 ticks with '0010' PTS-only marker bits.
/// assert_eq!(extract_time(&[0x21, 0x00, 0x05, 0xBF, 0x21]), 90_000);
/// ```
pub fn extract_time(bytes: &[u8; 5]) -> u64 {
    let a = ((bytes[0] >> 1) & 0x07) as u64;
    let b = bytes[1] as u64;
    let c = ((bytes[2] >> 1) & 0x7F) as u64;
    let d = bytes[3] as u64;
    let e = ((bytes[4] >> 1) & 0x7F) as u64;
    (a << 30) | (b << 22) | (c << 15) | (d << 7) | e
}

/// Returns `false` for stream ids whose PES packets never carry the
/// optional header (ISO/IEC 13818-1 Table 2-21).
pub fn optional_fields_exist(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        STREAM_ID_PADDING_STREAM
            | STREAM_ID_PRIVATE_STREAM_2
            | STREAM_ID_ECM_STREAM
            | STREAM_ID_EMM_STREAM
            | STREAM_ID_DSM_CC_STREAM
            | STREAM_ID_ITU_T_H222_1_TYPE_E
            | STREAM_ID_PROGRAM_STREAM_DIRECTORY
    )
}

fn timestamp_at(data: &[u8], offset: usize) -> Option<u64> {
    let field: &[u8; TIMESTAMP_SIZE] = data.get(offset..offset + TIMESTAMP_SIZE)?.try_into().ok()?;
    Some(extract_time(field))
}

impl PESHeader {
    /// Parses a PES header from a buffer starting at the PES start code.
    ///
    /// Only the six fixed bytes are mandatory; optional fields that do not
    /// fit in `pes` are left unset.
    pub fn parse(pes: Bytes) -> Result<Self> {
        if pes.len() < PES_FIXED_HEADER_SIZE {
            return Err(TsMetaError::MalformedHeader(format!(
                "invalid length for PES header: {} too short to parse",
                pes.len()
            )));
        }

        let start_code_prefix = (pes[0] as u32) << 16 | (pes[1] as u32) << 8 | pes[2] as u32;
        let stream_id = pes[3];
        let packet_length = (pes[4] as u16) << 8 | pes[5] as u16;

        let mut header = PESHeader {
            start_code_prefix,
            stream_id,
            packet_length,
            data_alignment: false,
            pts_dts_indicator: PtsDtsIndicator::None,
            pts: None,
            dts: None,
            data_start: PES_FIXED_HEADER_SIZE,
            data: Bytes::new(),
        };

        if optional_fields_exist(stream_id) && pes.len() >= 9 {
            header.data_alignment = pes[6] & 0x04 != 0;
            header.pts_dts_indicator = PtsDtsIndicator::from((pes[7] & 0xC0) >> 6);
            header.data_start = 9 + pes[8] as usize;

            if matches!(
                header.pts_dts_indicator,
                PtsDtsIndicator::PtsOnly | PtsDtsIndicator::Both
            ) {
                header.pts = timestamp_at(&pes, PTS_OFFSET);
                if header.pts.is_some() && header.pts_dts_indicator == PtsDtsIndicator::Both {
                    header.dts = timestamp_at(&pes, DTS_OFFSET);
                }
            }
        }

        if pes.len() > header.data_start {
            header.data = pes.slice(header.data_start..);
        }

        Ok(header)
    }

    /// Whether this stream id carries the optional header fields.
    pub fn optional_fields_exist(&self) -> bool {
        optional_fields_exist(self.stream_id)
    }

    /// Whether the flags announce a PTS.
    pub fn has_pts(&self) -> bool {
        matches!(
            self.pts_dts_indicator,
            PtsDtsIndicator::PtsOnly | PtsDtsIndicator::Both
        )
    }

    /// Whether the flags announce a DTS.
    pub fn has_dts(&self) -> bool {
        self.pts_dts_indicator == PtsDtsIndicator::Both
    }

    /// Payload bytes still expected for the whole unit, counted from the
    /// first data byte. `None` when the optional header is longer than the
    /// declared packet length.
    pub fn remaining_packet_size(&self) -> Option<usize> {
        (self.packet_length as usize).checked_sub(self.data_start - PES_FIXED_HEADER_SIZE)
    }
}

impl fmt::Display for PESHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PES")?;
        writeln!(f, "---")?;
        writeln!(f, "Packet Start Code Prefix: {:X}", self.start_code_prefix)?;
        writeln!(f, "Stream Id: {:X}", self.stream_id)?;
        writeln!(f, "PES Packet Length: {}", self.packet_length)?;
        if self.optional_fields_exist() {
            writeln!(f, "PTS DTS Indicator: {:?}", self.pts_dts_indicator)?;
            if let Some(pts) = self.pts {
                writeln!(f, "PTS: {}", pts)?;
            }
            if let Some(dts) = self.dts {
                writeln!(f, "DTS: {}", dts)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    /// Encodes a 33-bit timestamp with the given 4-bit marker prefix.
    fn encode_time(marker: u8, ts: u64) -> [u8; 5] {
        [
            (marker << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 0x01,
            (ts >> 22) as u8,
            (((ts >> 15) & 0x7F) as u8) << 1 | 0x01,
            (ts >> 7) as u8,
            ((ts & 0x7F) as u8) << 1 | 0x01,
        ]
    }

    fn metadata_pes(packet_length: u16, flags: u8, optional: &[u8], data: &[u8]) -> Bytes {
        let mut pes = vec![0x00, 0x00, 0x01, STREAM_ID_METADATA_STREAM];
        pes.extend_from_slice(&packet_length.to_be_bytes());
        pes.push(0x84);
        pes.push(flags);
        pes.push(optional.len() as u8);
        pes.extend_from_slice(optional);
        pes.extend_from_slice(data);
        Bytes::from(pes)
    }

    #[test]
    fn test_extract_time_known_vector() {
        // a=0b101, b=0xA5, c=0x5A, d=0x3C, e=0x7E
        let field = [0x3B, 0xA5, 0xB5, 0x3C, 0xFD];
        let expected = (0b101u64 << 30) | (0xA5 << 22) | (0x5A << 15) | (0x3C << 7) | 0x7E;
        assert_eq!(extract_time(&field), expected);
        assert_eq!(expected, 0x1_696D_1E7E);
    }

    #[test]
    fn test_extract_time_uses_all_33_bits() {
        assert_eq!(
            extract_time(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
            0x1_FFFF_FFFF
        );
        assert_eq!(extract_time(&[0x21, 0x00, 0x05, 0xBF, 0x21]), 90_000);
    }

    #[quickcheck]
    fn prop_extract_time_recovers_encoded_value(ts: u64) -> bool {
        let ts = ts & 0x1_FFFF_FFFF;
        extract_time(&encode_time(0x3, ts)) == ts
    }

    #[test]
    fn test_parse_pts_and_dts() {
        let mut optional = encode_time(0x3, 180_000).to_vec();
        optional.extend_from_slice(&encode_time(0x1, 171_000));
        let pes = metadata_pes(13 + 4, 0xC0, &optional, b"ID3!");

        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.start_code_prefix, 0x000001);
        assert_eq!(header.stream_id, STREAM_ID_METADATA_STREAM);
        assert!(header.data_alignment);
        assert_eq!(header.pts_dts_indicator, PtsDtsIndicator::Both);
        assert!(header.has_pts());
        assert!(header.has_dts());
        assert_eq!(header.pts, Some(180_000));
        assert_eq!(header.dts, Some(171_000));
        assert_eq!(header.data_start, 19);
        assert_eq!(header.data, Bytes::from_static(b"ID3!"));
        assert_eq!(header.remaining_packet_size(), Some(4));
    }

    #[test]
    fn test_parse_pts_only() {
        let pes = metadata_pes(100, 0x80, &encode_time(0x2, 90_000), &[1, 2, 3]);
        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.pts_dts_indicator, PtsDtsIndicator::PtsOnly);
        assert_eq!(header.pts, Some(90_000));
        assert_eq!(header.dts, None);
        assert!(!header.has_dts());
        assert_eq!(header.data_start, 14);
        assert_eq!(header.remaining_packet_size(), Some(92));
        assert_eq!(header.data.len(), 3);
    }

    #[test]
    fn test_reserved_indicator_has_no_pts() {
        let pes = metadata_pes(8, 0x40, &encode_time(0x2, 90_000), &[]);
        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.pts_dts_indicator, PtsDtsIndicator::Reserved);
        assert_eq!(header.pts, None);
        assert!(!header.has_pts());
    }

    #[test]
    fn test_pts_skipped_when_buffer_too_short() {
        let pes = metadata_pes(20, 0x80, &[0x21, 0x00], &[]);
        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.pts, None);
        assert_eq!(header.data_start, 11);
        assert!(header.data.is_empty());
    }

    #[test]
    fn test_no_optional_field_streams_start_at_six() {
        for stream_id in [
            STREAM_ID_PADDING_STREAM,
            STREAM_ID_PRIVATE_STREAM_2,
            STREAM_ID_ECM_STREAM,
            STREAM_ID_EMM_STREAM,
            STREAM_ID_DSM_CC_STREAM,
            STREAM_ID_ITU_T_H222_1_TYPE_E,
            STREAM_ID_PROGRAM_STREAM_DIRECTORY,
        ] {
            let pes = Bytes::from(vec![
                0x00, 0x00, 0x01, stream_id, 0x00, 0x05, 0xFF, 0xC0, 0x20, 0xAA, 0xBB,
            ]);
            let header = PESHeader::parse(pes).unwrap();
            assert_eq!(header.data_start, 6, "stream id {:#04x}", stream_id);
            assert_eq!(header.pts_dts_indicator, PtsDtsIndicator::None);
            assert!(!header.data_alignment);
            assert_eq!(header.data.len(), 5);
            assert_eq!(header.remaining_packet_size(), Some(5));
        }
    }

    #[test]
    fn test_program_stream_map_has_optional_fields() {
        assert!(optional_fields_exist(STREAM_ID_PROGRAM_STREAM_MAP));
        assert!(optional_fields_exist(STREAM_ID_PRIVATE_STREAM_1));
        assert!(!optional_fields_exist(STREAM_ID_PADDING_STREAM));
    }

    #[test]
    fn test_short_buffers() {
        assert!(matches!(
            PESHeader::parse(Bytes::from_static(&[0x00, 0x00, 0x01, 0xFC, 0x00])),
            Err(TsMetaError::MalformedHeader(_))
        ));

        // Optional fields need nine bytes; with fewer the data start stays at six.
        let pes = Bytes::from_static(&[0x00, 0x00, 0x01, 0xFC, 0x00, 0x02, 0x84, 0x80]);
        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.data_start, 6);
        assert_eq!(header.pts_dts_indicator, PtsDtsIndicator::None);
        assert_eq!(header.data, Bytes::from_static(&[0x84, 0x80]));
    }

    #[test]
    fn test_remaining_size_none_when_header_exceeds_length() {
        let pes = metadata_pes(3, 0x80, &encode_time(0x2, 0), &[]);
        let header = PESHeader::parse(pes).unwrap();
        assert_eq!(header.remaining_packet_size(), None);
    }

    #[test]
    fn test_display() {
        let pes = metadata_pes(8, 0x80, &encode_time(0x2, 42), &[]);
        let text = PESHeader::parse(pes).unwrap().to_string();
        assert!(text.contains("Stream Id: FC"));
        assert!(text.contains("PTS: 42"));
    }
}
