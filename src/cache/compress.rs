//! Transparent deflate compression for large cache values.
//!
//! Stored layout: one tag byte followed by the payload.

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};

const TAG_RAW: u8 = 0;
const TAG_DEFLATE: u8 = 1;

/// Wrap a value for storage, compressing it when it is at least `threshold`
/// bytes and compression actually shrinks it. A threshold of 0 disables
/// compression.
pub fn pack(value: &[u8], threshold: usize) -> Vec<u8> {
    if threshold > 0 && value.len() >= threshold {
        if let Some(compressed) = deflate(value) {
            if compressed.len() < value.len() {
                let mut out = Vec::with_capacity(compressed.len() + 1);
                out.push(TAG_DEFLATE);
                out.extend_from_slice(&compressed);
                return out;
            }
        }
    }

    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(TAG_RAW);
    out.extend_from_slice(value);
    out
}

/// Reverse of [`pack`]. `None` for corrupt or foreign entries.
pub fn unpack(stored: &[u8]) -> Option<Vec<u8>> {
    let (&tag, payload) = stored.split_first()?;
    match tag {
        TAG_RAW => Some(payload.to_vec()),
        TAG_DEFLATE => {
            let mut out = Vec::new();
            DeflateDecoder::new(payload).read_to_end(&mut out).ok()?;
            Some(out)
        }
        _ => None,
    }
}

fn deflate(value: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(value).ok()?;
    encoder.finish().ok()
}
