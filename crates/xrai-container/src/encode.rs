// SPDX-License-Identifier: Apache-2.0
//! The encoder: assembles a [`Document`] into header + TOC + aligned section
//! bodies, in a buffered all-at-once mode and a chunked streaming mode.

use std::io::Write;

use crate::byteio::{align4, write_bytes, write_u16_le, write_u32_le, write_u64_le, write_zero_pad};
use crate::compress::{self, DEFAULT_BENEFIT_THRESHOLD};
use crate::document::{Document, Payload};
use crate::error::{Error, Result, MAGIC};
use crate::layout::{DEFAULT_MAX_SECTION_COUNT, FORMAT_MAJOR, FORMAT_MINOR, HEADER_SIZE, TOC_ENTRY_SIZE, TOC_HEADER_SIZE};
use crate::registry;

/// The generator string injected into freshly-synthesized metadata.
const GENERATOR: &str = concat!("xrai-container/", env!("CARGO_PKG_VERSION"));

/// Options controlling how [`Encoder`] assembles a container.
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Attempt per-section deflate compression, subject to the benefit gate.
    pub compress: bool,
    /// Deflate level, 1 (fastest) to 9 (smallest).
    pub compression_level: u32,
    /// Pad section bodies to 4-byte alignment. Recommended; decoders accept
    /// unaligned files regardless.
    pub align_sections: bool,
    /// Chunk size used by [`Encoder::encode_stream`] when writing section
    /// bodies. Ignored by the buffered [`Encoder::encode`].
    pub chunk_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: 6,
            align_sections: true,
            chunk_size: 64 * 1024,
        }
    }
}

/// One section's final bytes and flags, after serialization and the
/// compression benefit gate.
struct Planned {
    type_id: u32,
    flags: u32,
    bytes: Vec<u8>,
}

/// Assembles documents into bytes. Stateless — holds no buffers or caches of
/// its own, so one instance is as good as a fresh one per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct Encoder;

impl Encoder {
    /// Construct an encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encode `doc` into an in-memory buffer.
    pub fn encode(&self, doc: &Document, opts: &EncodeOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_stream(doc, opts, &mut out)?;
        Ok(out)
    }

    /// Encode `doc`, writing header, TOC, and section bodies to `sink` in a
    /// single forward pass with precomputed offsets. Section bodies are
    /// written in `opts.chunk_size`-sized pieces.
    pub fn encode_stream<W: Write>(&self, doc: &Document, opts: &EncodeOptions, sink: &mut W) -> Result<()> {
        if opts.chunk_size == 0 {
            return Err(Error::EncoderInputInvalid {
                reason: "chunk_size must be non-zero".to_string(),
            });
        }

        let planned = plan_sections(doc, opts)?;
        let count = planned.len();
        if count > DEFAULT_MAX_SECTION_COUNT as usize {
            return Err(Error::TooManySections {
                count: count as u32,
                max: DEFAULT_MAX_SECTION_COUNT,
            });
        }

        let toc_offset = HEADER_SIZE;
        let toc_size = TOC_HEADER_SIZE + TOC_ENTRY_SIZE * count as u64;
        let body_start = toc_offset + toc_size;

        // Compute offsets for every section before writing anything, so the
        // TOC we write is correct in the same forward pass.
        let mut offsets = Vec::with_capacity(count);
        let mut pos = body_start;
        for section in &planned {
            let padded = if opts.align_sections { align4(pos) } else { pos };
            offsets.push(padded);
            pos = padded + section.bytes.len() as u64;
        }

        write_bytes(sink, &MAGIC)?;
        sink.write_all(&[FORMAT_MAJOR, FORMAT_MINOR])?;
        write_u16_le(sink, 0)?; // file flags, reserved
        write_u64_le(sink, toc_offset)?;

        write_u32_le(sink, count as u32)?;
        for (section, offset) in planned.iter().zip(&offsets) {
            write_u32_le(sink, section.type_id)?;
            write_u64_le(sink, *offset)?;
            write_u64_le(sink, section.bytes.len() as u64)?;
            write_u32_le(sink, section.flags)?;
        }

        let mut pos = body_start;
        for (section, offset) in planned.iter().zip(&offsets) {
            let padding = offset - pos;
            if padding > 0 {
                write_zero_pad(sink, padding)?;
            }
            for chunk in section.bytes.chunks(opts.chunk_size) {
                write_bytes(sink, chunk)?;
            }
            pos = offset + section.bytes.len() as u64;
        }

        Ok(())
    }
}

/// Ensure `doc.metadata.asset.version` is present, injecting the default
/// generator/copyright/version triple into a *copy* of the metadata JSON
/// when it's missing. Never mutates `doc`.
fn prepare_metadata(doc: &Document) -> Result<serde_json::Value> {
    let mut metadata = match doc.get("metadata") {
        Some(Payload::Json(v)) => v.clone(),
        Some(Payload::Opaque(_)) => {
            return Err(Error::EncoderInputInvalid {
                reason: "metadata section must be JSON, not opaque bytes".to_string(),
            })
        }
        None => serde_json::json!({}),
    };

    let obj = metadata.as_object_mut().ok_or_else(|| Error::EncoderInputInvalid {
        reason: "metadata section root must be a JSON object".to_string(),
    })?;

    let has_version = obj
        .get("asset")
        .and_then(|a| a.get("version"))
        .is_some();
    if !has_version {
        let asset = obj
            .entry("asset")
            .or_insert_with(|| serde_json::json!({}));
        let asset_obj = asset.as_object_mut().ok_or_else(|| Error::EncoderInputInvalid {
            reason: "metadata.asset must be a JSON object".to_string(),
        })?;
        asset_obj
            .entry("version")
            .or_insert_with(|| serde_json::Value::String("1.0".to_string()));
        asset_obj
            .entry("generator")
            .or_insert_with(|| serde_json::Value::String(GENERATOR.to_string()));
        asset_obj
            .entry("copyright")
            .or_insert_with(|| serde_json::Value::String(String::new()));
    }

    Ok(metadata)
}

fn serialize_payload(payload: &Payload) -> Result<Vec<u8>> {
    match payload {
        Payload::Opaque(bytes) => Ok(bytes.clone()),
        Payload::Json(value) => {
            serde_json::to_vec(value).map_err(|e| Error::EncoderInputInvalid { reason: e.to_string() })
        }
    }
}

/// Parse a `unknown_<id>` section name back into its numeric type id.
fn unknown_type_id(name: &str) -> Option<u32> {
    name.strip_prefix("unknown_").and_then(|s| s.parse().ok())
}

fn plan_sections(doc: &Document, opts: &EncodeOptions) -> Result<Vec<Planned>> {
    let mut planned = Vec::new();

    let metadata_json = prepare_metadata(doc)?;
    let metadata_bytes = serde_json::to_vec(&metadata_json)
        .map_err(|e| Error::EncoderInputInvalid { reason: e.to_string() })?;
    let gate = compress::gate_compress(&metadata_bytes, opts.compress, opts.compression_level, DEFAULT_BENEFIT_THRESHOLD)?;
    planned.push(Planned {
        type_id: registry::METADATA_TYPE_ID,
        flags: gate.flags,
        bytes: gate.bytes,
    });

    for type_id in registry::ordered_type_ids() {
        if type_id == registry::METADATA_TYPE_ID {
            continue;
        }
        let name = registry::name_of(type_id).ok_or_else(|| Error::EncoderInputInvalid {
            reason: format!("registry inconsistency for type id {type_id}"),
        })?;
        let Some(payload) = doc.get(name) else {
            continue;
        };
        if payload.is_absent() {
            continue;
        }
        let raw = serialize_payload(payload)?;
        let gate = compress::gate_compress(&raw, opts.compress, opts.compression_level, DEFAULT_BENEFIT_THRESHOLD)?;
        planned.push(Planned {
            type_id,
            flags: gate.flags,
            bytes: gate.bytes,
        });
    }

    let mut unknowns: Vec<(u32, &Payload)> = doc
        .iter()
        .filter_map(|(name, payload)| unknown_type_id(name).map(|id| (id, payload)))
        .filter(|(_, payload)| !payload.is_absent())
        .collect();
    unknowns.sort_by_key(|(id, _)| *id);
    for (type_id, payload) in unknowns {
        let raw = serialize_payload(payload)?;
        let gate = compress::gate_compress(&raw, opts.compress, opts.compression_level, DEFAULT_BENEFIT_THRESHOLD)?;
        planned.push(Planned {
            type_id,
            flags: gate.flags,
            bytes: gate.bytes,
        });
    }

    Ok(planned)
}
