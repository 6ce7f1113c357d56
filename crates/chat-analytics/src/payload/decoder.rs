// crates/chat-analytics/src/payload/decoder.rs

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Read;
use tracing::debug;

use crate::metrics;
use crate::record::FieldValue;

/// Little-endian u32 read of the first four bytes of a zstd frame.
pub const ZSTD_MAGIC: u32 = 0xFD2F_B528;

/// Strings at or below this length are never treated as encoded.
const MIN_ENCODED_LEN: usize = 16;
const MAX_REPLACEMENT_RATIO: f64 = 0.2;
/// Decompressed payloads larger than this are treated as undecodable.
pub const MAX_DECOMPRESSED_LEN: u64 = 8 * 1024 * 1024;

lazy_static! {
    static ref HEX_BODY: Regex = Regex::new(r"^[0-9a-fA-F]+$").unwrap();
    static ref BASE64_BODY: Regex = Regex::new(r"^[A-Za-z0-9+/=]+$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Hex,
    Base64,
    Plain,
}

struct DetectionRule {
    encoding: TextEncoding,
    length_ok: fn(usize) -> bool,
    body: &'static Regex,
}

fn even_length(len: usize) -> bool {
    len > MIN_ENCODED_LEN && len % 2 == 0
}

fn quad_length(len: usize) -> bool {
    len > MIN_ENCODED_LEN && len % 4 == 0
}

lazy_static! {
    /// Checked in order; the first matching rule decides the encoding.
    static ref RULES: [DetectionRule; 2] = [
        DetectionRule {
            encoding: TextEncoding::Hex,
            length_ok: even_length,
            body: &HEX_BODY,
        },
        DetectionRule {
            encoding: TextEncoding::Base64,
            length_ok: quad_length,
            body: &BASE64_BODY,
        },
    ];
}

/// Guesses how a stored payload was encoded and turns it back into text.
///
/// Never fails: anything that cannot be decoded comes back as the raw string or as an empty
/// string, depending on which stage rejected it.
pub struct PayloadDecoder;

impl PayloadDecoder {
    /// Compressed column first; the plain column when that yields nothing.
    pub fn decode(compressed: Option<&FieldValue>, plain: Option<&FieldValue>) -> String {
        if let Some(value) = compressed {
            let text = Self::decode_value(value);
            if !text.is_empty() {
                return text;
            }
        }
        plain.map(Self::decode_value).unwrap_or_default()
    }

    pub fn decode_value(value: &FieldValue) -> String {
        match value {
            FieldValue::Text(s) => Self::decode_text(s),
            FieldValue::Bytes(b) => Self::decode_bytes(b),
            _ => String::new(),
        }
    }

    pub fn detect(raw: &str) -> TextEncoding {
        RULES
            .iter()
            .find(|rule| (rule.length_ok)(raw.len()) && rule.body.is_match(raw))
            .map(|rule| rule.encoding)
            .unwrap_or(TextEncoding::Plain)
    }

    pub fn decode_text(raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        match Self::detect(raw) {
            TextEncoding::Hex => match hex::decode(raw) {
                Ok(bytes) => {
                    metrics::inc_payload_decode("hex");
                    Self::decode_bytes(&bytes)
                }
                Err(e) => {
                    debug!("Hex payload rejected: {}", e);
                    raw.to_string()
                }
            },
            TextEncoding::Base64 => match STANDARD.decode(raw) {
                Ok(bytes) => {
                    metrics::inc_payload_decode("base64");
                    Self::decode_bytes(&bytes)
                }
                Err(_) => raw.to_string(),
            },
            TextEncoding::Plain => raw.to_string(),
        }
    }

    /// Binary payloads: zstd frame, then UTF-8, then Latin-1.
    pub fn decode_bytes(data: &[u8]) -> String {
        if data.is_empty() {
            return String::new();
        }
        if has_zstd_magic(data) {
            return match decompress_bounded(data, MAX_DECOMPRESSED_LEN) {
                Ok(Some(bytes)) => {
                    metrics::inc_payload_decode("zstd");
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                Ok(None) => {
                    debug!(
                        "zstd frame ({} bytes) expands past {} bytes, dropped",
                        data.len(),
                        MAX_DECOMPRESSED_LEN
                    );
                    String::new()
                }
                Err(e) => {
                    debug!("Corrupt zstd frame ({} bytes): {}", data.len(), e);
                    String::new()
                }
            };
        }

        let decoded = String::from_utf8_lossy(data);
        let total = decoded.chars().count();
        let replacements = decoded
            .chars()
            .filter(|c| *c == char::REPLACEMENT_CHARACTER)
            .count();
        if (replacements as f64) < total as f64 * MAX_REPLACEMENT_RATIO {
            metrics::inc_payload_decode("utf8");
            decoded.replace(char::REPLACEMENT_CHARACTER, "")
        } else {
            metrics::inc_payload_decode("latin1");
            data.iter().map(|&b| b as char).collect()
        }
    }
}

/// `Ok(None)` when the frame decompresses to more than `limit` bytes.
fn decompress_bounded(data: &[u8], limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let decoder = zstd::stream::read::Decoder::new(data)?;
    let mut out = Vec::new();
    decoder.take(limit + 1).read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(out))
}

fn has_zstd_magic(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == ZSTD_MAGIC
}
