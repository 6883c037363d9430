use super::TagDecoder;
use crate::error::{Result, TsMetaError};
use log::trace;
use std::collections::HashMap;

const HEADER_SIZE: usize = 10;
const FRAME_HEADER_SIZE: usize = 10;

const FLAG_UNSYNCHRONISATION: u8 = 0x80;
const FLAG_EXTENDED_HEADER: u8 = 0x40;

// v2.4 frame format flags
const FRAME_FLAG_UNSYNCHRONISATION: u8 = 0x02;
const FRAME_FLAG_DATA_LENGTH: u8 = 0x01;

const ENCODING_LATIN1: u8 = 0;
const ENCODING_UTF16_BOM: u8 = 1;
const ENCODING_UTF16_BE: u8 = 2;

/// Decoder for ID3v2.3 and ID3v2.4 tags, the payload format of timed
/// metadata streams.
///
/// Every frame is returned as `frame id → text`. Frames with a description
/// (`TXXX`, `WXXX`, `COMM`, `USLT`) keep the `description NUL value` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Decoder;

impl Id3Decoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }
}

impl TagDecoder for Id3Decoder {
    fn decode(&self, data: &[u8]) -> Result<HashMap<String, String>> {
        if data.len() < HEADER_SIZE || &data[0..3] != b"ID3" {
            return Err(decode_error("missing ID3 header"));
        }

        let version = data[3];
        if version != 3 && version != 4 {
            return Err(decode_error(format!("unsupported ID3v2.{} tag", version)));
        }
        let flags = data[5];
        let size = syncsafe(&data[6..10]);

        let end = HEADER_SIZE + size;
        if data.len() < end {
            return Err(decode_error(format!(
                "tag declares {} bytes, {} available",
                size,
                data.len() - HEADER_SIZE
            )));
        }

        let body = if version == 3 && flags & FLAG_UNSYNCHRONISATION != 0 {
            resynchronise(&data[HEADER_SIZE..end])
        } else {
            data[HEADER_SIZE..end].to_vec()
        };

        let mut pos = 0;
        if flags & FLAG_EXTENDED_HEADER != 0 {
            if body.len() < 4 {
                return Err(decode_error("truncated extended header"));
            }
            pos = match version {
                3 => 4 + u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize,
                _ => syncsafe(&body[0..4]),
            };
        }

        let mut frames = HashMap::new();
        while pos + FRAME_HEADER_SIZE <= body.len() {
            let header = &body[pos..pos + FRAME_HEADER_SIZE];
            if header[0] == 0 {
                break;
            }

            let id = std::str::from_utf8(&header[0..4])
                .ok()
                .filter(|id| id.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()))
                .ok_or_else(|| decode_error(format!("invalid frame id at offset {}", pos)))?
                .to_string();
            let frame_size = match version {
                3 => u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize,
                _ => syncsafe(&header[4..8]),
            };
            let format_flags = header[9];

            let start = pos + FRAME_HEADER_SIZE;
            let frame_end = start + frame_size;
            if frame_end > body.len() {
                return Err(decode_error(format!(
                    "frame {} overruns tag ({} bytes past end)",
                    id,
                    frame_end - body.len()
                )));
            }

            let mut content = body[start..frame_end].to_vec();
            if version == 4 {
                if format_flags & FRAME_FLAG_DATA_LENGTH != 0 && content.len() >= 4 {
                    content.drain(..4);
                }
                if format_flags & FRAME_FLAG_UNSYNCHRONISATION != 0
                    || flags & FLAG_UNSYNCHRONISATION != 0
                {
                    content = resynchronise(&content);
                }
            }

            let text = frame_text(&id, &content);
            trace!("ID3 frame {} ({} bytes)", id, frame_size);
            frames.insert(id, text);
            pos = frame_end;
        }

        Ok(frames)
    }
}

fn decode_error(msg: impl Into<String>) -> TsMetaError {
    TsMetaError::Decode(msg.into())
}

fn syncsafe(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take(4)
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize)
}

/// Undoes unsynchronisation: every `FF 00` becomes `FF`.
fn resynchronise(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = 0u8;
    for &b in data {
        if !(prev == 0xFF && b == 0x00) {
            out.push(b);
        }
        prev = b;
    }
    out
}

fn frame_text(id: &str, content: &[u8]) -> String {
    let text = match id {
        "COMM" | "USLT" => match content.split_first() {
            Some((&encoding, rest)) if rest.len() >= 3 => decode_text(encoding, &rest[3..]),
            _ => String::new(),
        },
        _ if id.starts_with('T') || id == "WXXX" => match content.split_first() {
            Some((&encoding, rest)) => decode_text(encoding, rest),
            None => String::new(),
        },
        _ if id.starts_with('W') => latin1(content),
        _ => String::from_utf8_lossy(content).into_owned(),
    };
    text.trim_end_matches('\0').to_string()
}

fn decode_text(encoding: u8, data: &[u8]) -> String {
    match encoding {
        ENCODING_LATIN1 => latin1(data),
        ENCODING_UTF16_BOM => utf16(data, false),
        ENCODING_UTF16_BE => utf16(data, true),
        // UTF-8, and anything unknown
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

fn latin1(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// Decodes UTF-16 text. A byte order mark may open every NUL-separated
/// segment and switches the byte order for what follows it.
fn utf16(data: &[u8], mut big_endian: bool) -> String {
    let mut units = Vec::with_capacity(data.len() / 2);
    for pair in data.chunks_exact(2) {
        let unit = if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        };
        match unit {
            0xFEFF => {}
            0xFFFE => big_endian = !big_endian,
            _ => units.push(unit),
        }
    }
    String::from_utf16_lossy(&units)
}
