//! Payload decoding for stored message content

pub mod decoder;

pub use decoder::{PayloadDecoder, TextEncoding, ZSTD_MAGIC};
