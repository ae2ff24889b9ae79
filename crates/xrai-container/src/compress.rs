// SPDX-License-Identifier: Apache-2.0
//! Per-section deflate compression: the benefit gate on encode, algorithm
//! dispatch and the decompression-bomb guard on decode.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Below this raw payload size, compression is never attempted.
pub const DEFAULT_BENEFIT_THRESHOLD: usize = 1024;

/// Default ceiling on inflated section size — guards against decompression
/// bombs when decoding untrusted files.
pub const DEFAULT_MAX_INFLATED_SIZE: u64 = 256 * 1024 * 1024;

/// Compression algorithm id carried in a section's flags bits 8-15.
const ALGORITHM_DEFLATE: u16 = 1;
/// Tolerated as an alias for deflate under the decoder's lenient policy.
const ALGORITHM_DEFLATE_ALIAS: u16 = 0;

/// Flags bit 0: section payload is compressed.
pub const FLAG_COMPRESSED: u32 = 1;

/// Deflate `raw` at the given level (1..=9).
pub fn deflate(raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Inflate `compressed`, refusing to produce more than `max_inflated_size`
/// bytes. Returns [`Error::DecompressionFailed`] on a corrupt stream or a
/// size that exceeds the cap.
pub fn inflate(type_id: u32, compressed: &[u8], max_inflated_size: u64) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    // Read one byte past the cap so an oversized stream is detected without
    // buffering the whole thing.
    let mut out = Vec::new();
    let mut limited = (&mut decoder).take(max_inflated_size + 1);
    limited
        .read_to_end(&mut out)
        .map_err(|e| Error::DecompressionFailed {
            type_id,
            reason: e.to_string(),
        })?;
    if out.len() as u64 > max_inflated_size {
        return Err(Error::DecompressionFailed {
            type_id,
            reason: format!(
                "inflated size exceeds cap of {max_inflated_size} bytes"
            ),
        });
    }
    Ok(out)
}

/// The outcome of attempting the encoder's benefit gate on a payload.
pub struct GateResult {
    /// The bytes to actually write (raw or compressed, whichever won).
    pub bytes: Vec<u8>,
    /// The section flags to record (0, or [`FLAG_COMPRESSED`] with the
    /// algorithm id in bits 8-15).
    pub flags: u32,
}

/// Apply the benefit gate: compress `raw` only if it's above
/// `threshold` bytes and the compressed form is strictly smaller.
/// Otherwise the payload is kept raw with flags 0.
pub fn gate_compress(raw: &[u8], compress: bool, level: u32, threshold: usize) -> Result<GateResult> {
    if !compress || raw.len() < threshold {
        return Ok(GateResult {
            bytes: raw.to_vec(),
            flags: 0,
        });
    }
    let compressed = deflate(raw, level)?;
    if compressed.len() < raw.len() {
        Ok(GateResult {
            bytes: compressed,
            flags: FLAG_COMPRESSED | (u32::from(ALGORITHM_DEFLATE) << 8),
        })
    } else {
        Ok(GateResult {
            bytes: raw.to_vec(),
            flags: 0,
        })
    }
}

/// Decode-side algorithm dispatch for a section's `flags`.
///
/// Returns `Ok(None)` when the payload is raw (flag bit 0 clear). Returns
/// `Err` for an algorithm id this decoder doesn't recognize; callers in
/// lenient mode downgrade that to a warning and keep the bytes opaque.
pub fn algorithm_for(type_id: u32, flags: u32) -> Result<Option<()>> {
    if flags & FLAG_COMPRESSED == 0 {
        return Ok(None);
    }
    #[allow(clippy::cast_possible_truncation)]
    let algorithm = ((flags >> 8) & 0xff) as u16;
    match algorithm {
        ALGORITHM_DEFLATE | ALGORITHM_DEFLATE_ALIAS => Ok(Some(())),
        other => Err(Error::UnknownCompressionAlgorithm {
            type_id,
            algorithm: other,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let raw = b"hello hello hello hello hello hello hello hello".repeat(50);
        let compressed = deflate(&raw, 6).unwrap();
        assert!(compressed.len() < raw.len());
        let back = inflate(1, &compressed, DEFAULT_MAX_INFLATED_SIZE).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn gate_rejects_small_payload() {
        let raw = vec![0u8; 512];
        let gated = gate_compress(&raw, true, 6, DEFAULT_BENEFIT_THRESHOLD).unwrap();
        assert_eq!(gated.flags, 0);
        assert_eq!(gated.bytes, raw);
    }

    #[test]
    fn gate_keeps_compression_when_it_shrinks() {
        let raw = vec![0u8; 20_000];
        let gated = gate_compress(&raw, true, 6, DEFAULT_BENEFIT_THRESHOLD).unwrap();
        assert_ne!(gated.flags, 0);
        assert!(gated.bytes.len() < raw.len());
    }

    #[test]
    fn gate_falls_back_when_compression_does_not_shrink() {
        // Pseudo-random bytes above the threshold that deflate can't shrink.
        let mut raw = vec![0u8; 2048];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(173).wrapping_add(91);
        }
        let gated = gate_compress(&raw, true, 9, DEFAULT_BENEFIT_THRESHOLD).unwrap();
        if gated.flags == 0 {
            assert_eq!(gated.bytes, raw);
        }
    }

    #[test]
    fn inflate_rejects_oversized_output() {
        let raw = vec![7u8; 1_000_000];
        let compressed = deflate(&raw, 6).unwrap();
        let result = inflate(1, &compressed, 1000);
        assert!(result.is_err());
    }

    #[test]
    fn algorithm_dispatch() {
        assert!(algorithm_for(1, 0).unwrap().is_none());
        assert!(algorithm_for(1, FLAG_COMPRESSED | (1 << 8)).unwrap().is_some());
        assert!(algorithm_for(1, FLAG_COMPRESSED).unwrap().is_some());
        assert!(algorithm_for(1, FLAG_COMPRESSED | (9 << 8)).is_err());
    }
}
