// SPDX-License-Identifier: Apache-2.0
//! The decoder: header/TOC parsing, bounds validation, per-section
//! decompression and interpretation, and the streaming variant.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Seek};

use crate::byteio::ByteReader;
use crate::compress::{self, DEFAULT_MAX_INFLATED_SIZE};
use crate::document::{Document, FormatInfo, Payload};
use crate::error::{Error, Result, MAGIC};
use crate::layout::{DEFAULT_MAX_SECTION_COUNT, FORMAT_MAJOR, HEADER_SIZE, TOC_ENTRY_SIZE, TOC_HEADER_SIZE};
use crate::registry::{self, Interpretation};

/// Options controlling how [`Decoder`] parses and validates a container.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    /// Cache parsed documents by file identity. See [`Decoder::clear_cache`].
    pub use_cache: bool,
    /// Run a full structural validation pass before parsing section bodies.
    /// When `false`, structural errors still abort the decode, just
    /// discovered inline rather than up front.
    pub validate_on_load: bool,
    /// Reject files declaring more sections than this.
    pub max_section_count: u32,
    /// Reject any single section whose inflated size would exceed this.
    pub max_inflated_size: u64,
    /// Treat unregistered section type ids as recoverable (`unknown_<id>`)
    /// rather than fatal.
    pub lenient_unknown_sections: bool,
    /// Treat a JSON-typed section that fails to parse as recoverable
    /// (opaque bytes + warning) rather than fatal.
    pub lenient_json: bool,
    /// Chunk size used by [`Decoder::decode_stream`] when reading section
    /// bodies. Ignored by the buffered [`Decoder::decode`].
    pub chunk_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            validate_on_load: true,
            max_section_count: DEFAULT_MAX_SECTION_COUNT,
            max_inflated_size: DEFAULT_MAX_INFLATED_SIZE,
            lenient_unknown_sections: true,
            lenient_json: true,
            chunk_size: 64 * 1024,
        }
    }
}

/// Outcome of [`Decoder::validate`]: either the file is structurally sound,
/// or here are all the problems found with it.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// No structural problems found.
    Valid,
    /// One or more structural problems, in the order they were discovered.
    Invalid(Vec<Error>),
}

impl ValidationResult {
    /// Whether this result represents a structurally sound file.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The collected errors, empty if [`ValidationResult::Valid`].
    pub fn errors(&self) -> &[Error] {
        match self {
            Self::Valid => &[],
            Self::Invalid(errors) => errors,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Header {
    pub(crate) major: u8,
    pub(crate) minor: u8,
    pub(crate) file_flags: u16,
    pub(crate) toc_offset: u64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TocEntry {
    pub(crate) type_id: u32,
    pub(crate) offset: u64,
    pub(crate) size: u64,
    pub(crate) flags: u32,
}

pub(crate) fn parse_header(buf: &[u8]) -> Result<Header> {
    let reader = ByteReader::new(buf);
    let magic = reader.read_ascii4("header magic", 0)?;
    if magic != MAGIC {
        return Err(Error::InvalidMagic { observed: magic });
    }
    let major = reader.read_u8("header major version", 4)?;
    let minor = reader.read_u8("header minor version", 5)?;
    if major > FORMAT_MAJOR {
        return Err(Error::UnsupportedVersion { major, minor });
    }
    let file_flags = reader.read_u16_le("header file flags", 6)?;
    let toc_offset = reader.read_u64_le("header toc offset", 8)?;
    Ok(Header {
        major,
        minor,
        file_flags,
        toc_offset,
    })
}

pub(crate) fn parse_toc_entries(buf: &[u8], count: u32, file_len: u64) -> Result<Vec<TocEntry>> {
    let reader = ByteReader::new(buf);
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let base = u64::from(i) * TOC_ENTRY_SIZE;
        let type_id = reader.read_u32_le("toc entry type id", base)?;
        let offset = reader.read_u64_le("toc entry offset", base + 4)?;
        let size = reader.read_u64_le("toc entry size", base + 12)?;
        let flags = reader.read_u32_le("toc entry flags", base + 20)?;
        let end = offset.checked_add(size).ok_or(Error::InvalidOffset {
            context: "section",
            offset,
            size,
            file_len,
        })?;
        if end > file_len {
            return Err(Error::InvalidOffset {
                context: "section",
                offset,
                size,
                file_len,
            });
        }
        entries.push(TocEntry {
            type_id,
            offset,
            size,
            flags,
        });
    }
    Ok(entries)
}

/// Parse and bounds-check header + TOC, returning the header and entries.
/// Shared by `validate`, `decode`, and the prefix stage of `decode_stream`.
fn parse_prefix(bytes: &[u8], max_section_count: u32) -> Result<(Header, Vec<TocEntry>)> {
    let file_len = bytes.len() as u64;
    if file_len < HEADER_SIZE {
        return Err(Error::Truncated {
            context: "header",
            at: 0,
            needed: HEADER_SIZE,
            available: file_len,
        });
    }
    let header = parse_header(&bytes[..HEADER_SIZE as usize])?;

    if header
        .toc_offset
        .checked_add(TOC_HEADER_SIZE)
        .is_none_or(|end| end > file_len)
    {
        return Err(Error::InvalidOffset {
            context: "toc header",
            offset: header.toc_offset,
            size: TOC_HEADER_SIZE,
            file_len,
        });
    }
    let reader = ByteReader::new(bytes);
    let count = reader.read_u32_le("toc section count", header.toc_offset)?;
    if count > max_section_count {
        return Err(Error::TooManySections {
            count,
            max: max_section_count,
        });
    }

    let entries_start = header.toc_offset + TOC_HEADER_SIZE;
    let entries_len = TOC_ENTRY_SIZE * u64::from(count);
    if entries_start
        .checked_add(entries_len)
        .is_none_or(|end| end > file_len)
    {
        return Err(Error::Truncated {
            context: "toc entries",
            at: entries_start,
            needed: entries_len,
            available: file_len.saturating_sub(entries_start),
        });
    }
    let entries = parse_toc_entries(&bytes[entries_start as usize..], count, file_len)?;

    if !entries.iter().any(|e| e.type_id == registry::METADATA_TYPE_ID) {
        return Err(Error::MissingRequiredSection);
    }

    Ok((header, entries))
}

/// Collect every structural problem in `bytes` rather than stopping at the
/// first one — this is what backs [`Decoder::validate`].
fn validate_all(bytes: &[u8], max_section_count: u32) -> Vec<Error> {
    let file_len = bytes.len() as u64;
    if file_len < HEADER_SIZE {
        return vec![Error::Truncated {
            context: "header",
            at: 0,
            needed: HEADER_SIZE,
            available: file_len,
        }];
    }

    let mut errors = Vec::new();
    let header = match parse_header(&bytes[..HEADER_SIZE as usize]) {
        Ok(h) => h,
        Err(e) => return vec![e],
    };

    if header
        .toc_offset
        .checked_add(TOC_HEADER_SIZE)
        .is_none_or(|end| end > file_len)
    {
        errors.push(Error::InvalidOffset {
            context: "toc header",
            offset: header.toc_offset,
            size: TOC_HEADER_SIZE,
            file_len,
        });
        return errors;
    }

    let reader = ByteReader::new(bytes);
    let count = match reader.read_u32_le("toc section count", header.toc_offset) {
        Ok(c) => c,
        Err(e) => {
            errors.push(e);
            return errors;
        }
    };
    if count > max_section_count {
        errors.push(Error::TooManySections {
            count,
            max: max_section_count,
        });
        return errors;
    }

    let entries_start = header.toc_offset + TOC_HEADER_SIZE;
    let entries_len = TOC_ENTRY_SIZE * u64::from(count);
    if entries_start
        .checked_add(entries_len)
        .is_none_or(|end| end > file_len)
    {
        errors.push(Error::Truncated {
            context: "toc entries",
            at: entries_start,
            needed: entries_len,
            available: file_len.saturating_sub(entries_start),
        });
        return errors;
    }

    let toc_bytes = &bytes[entries_start as usize..];
    let reader = ByteReader::new(toc_bytes);
    let mut saw_metadata = false;
    for i in 0..count {
        let base = u64::from(i) * TOC_ENTRY_SIZE;
        let type_id = match reader.read_u32_le("toc entry type id", base) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let offset = match reader.read_u64_le("toc entry offset", base + 4) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let size = match reader.read_u64_le("toc entry size", base + 12) {
            Ok(v) => v,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        if type_id == registry::METADATA_TYPE_ID {
            saw_metadata = true;
        }
        match offset.checked_add(size) {
            Some(end) if end <= file_len => {}
            _ => errors.push(Error::InvalidOffset {
                context: "section",
                offset,
                size,
                file_len,
            }),
        }
    }
    if !saw_metadata {
        errors.push(Error::MissingRequiredSection);
    }

    errors
}

/// Decompress (if flagged) and interpret one section's raw bytes, attaching
/// the result to `doc`. Recoverable conditions become warnings; only an
/// unknown section type id in strict mode is fatal here.
fn process_section(
    doc: &mut Document,
    type_id: u32,
    flags: u32,
    raw: Vec<u8>,
    opts: &DecodeOptions,
) -> Result<()> {
    let bytes = match compress::algorithm_for(type_id, flags) {
        Ok(None) => raw,
        Ok(Some(())) => match compress::inflate(type_id, &raw, opts.max_inflated_size) {
            Ok(inflated) => inflated,
            Err(e) => {
                tracing::warn!(type_id, %e, "section decompression failed; keeping opaque");
                doc.push_warning(type_id, e.to_string());
                attach(doc, type_id, Payload::Opaque(raw));
                return Ok(());
            }
        },
        Err(e) => {
            tracing::warn!(type_id, %e, "unknown compression algorithm; keeping opaque");
            doc.push_warning(type_id, e.to_string());
            attach(doc, type_id, Payload::Opaque(raw));
            return Ok(());
        }
    };

    match registry::name_of(type_id) {
        Some(name) => match registry::interpretation(type_id) {
            Some(Interpretation::Opaque) | None => doc.insert(name, Payload::Opaque(bytes)),
            Some(Interpretation::Json) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => doc.insert(name, Payload::Json(value)),
                Err(e) => {
                    if type_id == registry::METADATA_TYPE_ID {
                        if opts.lenient_json {
                            doc.push_warning(type_id, format!("metadata JSON parse failed: {e}"));
                            doc.insert(name, Payload::Opaque(bytes));
                        } else {
                            return Err(Error::InvalidMetadata {
                                reason: e.to_string(),
                            });
                        }
                    } else if opts.lenient_json {
                        tracing::warn!(type_id, %e, "JSON section failed to parse; keeping opaque");
                        doc.push_warning(type_id, e.to_string());
                        doc.insert(name, Payload::Opaque(bytes));
                    } else {
                        return Err(Error::InvalidJsonPayload {
                            type_id,
                            reason: e.to_string(),
                        });
                    }
                }
            },
        },
        None => {
            if !opts.lenient_unknown_sections {
                return Err(Error::UnknownSectionType { type_id });
            }
            if registry::is_reserved(type_id) {
                doc.push_warning(
                    type_id,
                    format!("section type {type_id} is in the range reserved for future section types"),
                );
            } else if registry::is_invalid(type_id) {
                doc.push_warning(
                    type_id,
                    format!("section type {type_id} is outside the valid section-type range"),
                );
            }
            attach(doc, type_id, Payload::Opaque(bytes));
        }
    }
    Ok(())
}

fn attach(doc: &mut Document, type_id: u32, payload: Payload) {
    let name = registry::name_of(type_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("unknown_{type_id}"));
    doc.insert(name, payload);
}

/// Merge the metadata section's top-level JSON keys into the document root,
/// shadowing same-named sections — this is how implementations in this
/// ecosystem treat `metadata` as the scene-document root.
fn merge_metadata_into_root(doc: &mut Document) {
    let Some(serde_json::Value::Object(map)) = doc.metadata().cloned() else {
        return;
    };
    for (key, value) in map {
        doc.insert(key, Payload::Json(value));
    }
}

type CacheKey = (u64, [u8; 16]);

fn cache_key(bytes: &[u8]) -> CacheKey {
    let mut prefix = [0u8; 16];
    let n = bytes.len().min(16);
    prefix[..n].copy_from_slice(&bytes[..n]);
    (bytes.len() as u64, prefix)
}

/// Parses, validates, and decompresses containers. Holds an optional
/// per-instance result cache; caches are never shared across `Decoder`s.
#[derive(Debug, Default)]
pub struct Decoder {
    cache: RefCell<HashMap<CacheKey, Document>>,
}

impl Decoder {
    /// Construct a decoder with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform all structural checks (magic, version, TOC bounds, section
    /// bounds, required-section presence) without decompressing payloads or
    /// parsing any JSON beyond what's needed to do those checks. Pure: does
    /// not mutate `bytes`, and returns the same result on repeat calls.
    pub fn validate(&self, bytes: &[u8]) -> ValidationResult {
        let errors = validate_all(bytes, DEFAULT_MAX_SECTION_COUNT);
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    /// Fully parse `bytes` into a [`Document`].
    ///
    /// When `opts.use_cache` is set, the result is keyed on `(byte length,
    /// first 16 bytes)` — intentionally cheap, not a content hash. Two
    /// different files that happen to share both are a cache collision: the
    /// second call returns the first file's document. The cache is a
    /// best-effort speedup, not a correctness boundary.
    pub fn decode(&self, bytes: &[u8], opts: &DecodeOptions) -> Result<Document> {
        if opts.use_cache {
            let key = cache_key(bytes);
            if let Some(doc) = self.cache.borrow().get(&key) {
                return Ok(doc.clone());
            }
        }

        if opts.validate_on_load {
            let errors = validate_all(bytes, opts.max_section_count);
            if let Some(first) = errors.into_iter().next() {
                return Err(first);
            }
        }

        let (header, entries) = parse_prefix(bytes, opts.max_section_count)?;

        let mut doc = Document::new();
        for entry in &entries {
            let raw = ByteReader::new(bytes)
                .slice("section body", entry.offset, entry.size)?
                .to_vec();
            process_section(&mut doc, entry.type_id, entry.flags, raw, opts)?;
        }
        doc.format = Some(FormatInfo {
            major: header.major,
            minor: header.minor,
            flags: header.file_flags,
        });
        merge_metadata_into_root(&mut doc);

        if opts.use_cache {
            self.cache.borrow_mut().insert(cache_key(bytes), doc.clone());
        }
        Ok(doc)
    }

    /// Parse a container from a seekable, sequential source: header and TOC
    /// are read first (a bounded prefix), then section bodies are streamed
    /// in `opts.chunk_size` pieces. Produces the same [`Document`] `decode`
    /// would for the same bytes.
    pub fn decode_stream<R: Read + Seek>(&self, source: &mut R, opts: &DecodeOptions) -> Result<Document> {
        let mut stream = crate::stream::SectionStream::open(source, opts.max_section_count, opts.chunk_size)?;
        let header = stream.header();

        let mut doc = Document::new();
        let mut current: Option<(u32, u32, Vec<u8>)> = None;
        while let Some(event) = stream.next_event()? {
            match event {
                crate::stream::SectionEvent::Toc { .. } => {}
                crate::stream::SectionEvent::SectionStart(meta) => {
                    current = Some((meta.type_id, meta.flags, Vec::with_capacity(meta.size as usize)));
                }
                crate::stream::SectionEvent::SectionChunk(chunk) => {
                    if let Some((_, _, buf)) = current.as_mut() {
                        buf.extend_from_slice(&chunk);
                    }
                }
                crate::stream::SectionEvent::SectionEnd => {
                    if let Some((type_id, flags, raw)) = current.take() {
                        process_section(&mut doc, type_id, flags, raw, opts)?;
                    }
                }
            }
        }
        doc.format = Some(FormatInfo {
            major: header.major,
            minor: header.minor,
            flags: header.file_flags,
        });
        merge_metadata_into_root(&mut doc);
        Ok(doc)
    }

    /// Discard all cached results.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encode::{EncodeOptions, Encoder};
    use std::io::Cursor;

    fn minimal_doc() -> Document {
        let mut doc = Document::new();
        doc.insert(
            "metadata",
            Payload::Json(serde_json::json!({ "asset": { "version": "1.0" }, "title": "T" })),
        );
        doc
    }

    #[test]
    fn decodes_minimal_file() {
        let bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        let doc = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(doc.metadata().unwrap()["title"], "T");
        assert_eq!(doc.format.unwrap().version_string(), "1.0");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        bytes[0] = b'Y';
        let err = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let mut bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        bytes[4] = 2;
        let err = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { major: 2, .. }));
    }

    #[test]
    fn rejects_truncated_toc() {
        let bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        let toc_offset = 16usize;
        let truncated = &bytes[..toc_offset + 10];
        let err = Decoder::new().decode(truncated, &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
        let v = Decoder::new().validate(truncated);
        assert!(!v.is_valid());
    }

    #[test]
    fn rejects_too_many_sections() {
        // A file whose TOC count exceeds the configured maximum, regardless
        // of whether the entries themselves are well-formed.
        let mut buf = Vec::new();
        buf.extend_from_slice(b"XRAI");
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&16u64.to_le_bytes());
        buf.extend_from_slice(&200u32.to_le_bytes());
        let errors = validate_all(&buf, DEFAULT_MAX_SECTION_COUNT);
        assert!(matches!(errors.as_slice(), [Error::TooManySections { count: 200, .. }]));
    }

    #[test]
    fn preserves_unknown_sections_in_lenient_mode() {
        // Hand-build a two-section file: metadata (type 1) + type 42.
        let metadata = br#"{"asset":{"version":"1.0"}}"#;
        let unknown_payload = [0xDEu8, 0xAD, 0xBE, 0xEF];
        let header_size = 16u64;
        let toc_count = 2u32;
        let toc_size = 4 + 24 * u64::from(toc_count);
        let body_start = header_size + toc_size;
        let meta_offset = body_start;
        let unknown_offset = meta_offset + metadata.len() as u64;

        let mut buf = Vec::new();
        buf.extend_from_slice(b"XRAI");
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&16u64.to_le_bytes());
        buf.extend_from_slice(&toc_count.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&meta_offset.to_le_bytes());
        buf.extend_from_slice(&(metadata.len() as u64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&unknown_offset.to_le_bytes());
        buf.extend_from_slice(&(unknown_payload.len() as u64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(metadata);
        buf.extend_from_slice(&unknown_payload);

        let doc = Decoder::new().decode(&buf, &DecodeOptions::default()).unwrap();
        assert_eq!(
            doc.get("unknown_42").and_then(Payload::as_opaque),
            Some(&unknown_payload[..])
        );
    }

    #[test]
    fn reserved_range_unknown_section_gets_a_warning() {
        let mut doc = minimal_doc();
        doc.insert("unknown_42", Payload::Opaque(vec![1, 2, 3]));
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
        let decoded = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
        assert!(decoded.warnings.iter().any(|w| w.type_id == 42 && w.message.contains("reserved")));
    }

    #[test]
    fn out_of_range_unknown_section_gets_a_warning() {
        let mut doc = minimal_doc();
        doc.insert("unknown_500", Payload::Opaque(vec![1, 2, 3]));
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
        let decoded = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
        assert!(decoded.warnings.iter().any(|w| w.type_id == 500 && w.message.contains("outside the valid")));
    }

    #[test]
    fn rejects_unknown_sections_when_strict() {
        let mut opts = DecodeOptions::default();
        opts.lenient_unknown_sections = false;
        let metadata = br#"{"asset":{"version":"1.0"}}"#;
        let header_size = 16u64;
        let toc_count = 2u32;
        let toc_size = 4 + 24 * u64::from(toc_count);
        let body_start = header_size + toc_size;
        let meta_offset = body_start;
        let unknown_offset = meta_offset + metadata.len() as u64;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"XRAI");
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&16u64.to_le_bytes());
        buf.extend_from_slice(&toc_count.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&meta_offset.to_le_bytes());
        buf.extend_from_slice(&(metadata.len() as u64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&unknown_offset.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(metadata);
        let err = Decoder::new().decode(&buf, &opts).unwrap_err();
        assert!(matches!(err, Error::UnknownSectionType { type_id: 42 }));
    }

    #[test]
    fn streaming_equals_full() {
        let mut doc = minimal_doc();
        doc.insert("geometry", Payload::Json(serde_json::json!({"v": "x".repeat(3000)})));
        doc.insert("audio", Payload::Opaque(vec![7u8; 2000]));
        let opts = EncodeOptions {
            compress: true,
            ..EncodeOptions::default()
        };
        let bytes = Encoder::new().encode(&doc, &opts).unwrap();

        let full = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
        let mut cursor = Cursor::new(&bytes);
        let streamed = Decoder::new()
            .decode_stream(&mut cursor, &DecodeOptions::default())
            .unwrap();
        assert_eq!(full, streamed);
    }

    #[test]
    fn validate_is_idempotent() {
        let bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        let decoder = Decoder::new();
        let a = decoder.validate(&bytes);
        let b = decoder.validate(&bytes);
        assert_eq!(a.is_valid(), b.is_valid());
        assert!(a.is_valid() && b.is_valid());
    }

    #[test]
    fn cache_returns_same_document() {
        let bytes = Encoder::new().encode(&minimal_doc(), &EncodeOptions::default()).unwrap();
        let decoder = Decoder::new();
        let opts = DecodeOptions {
            use_cache: true,
            ..DecodeOptions::default()
        };
        let a = decoder.decode(&bytes, &opts).unwrap();
        let b = decoder.decode(&bytes, &opts).unwrap();
        assert_eq!(a, b);
        decoder.clear_cache();
    }

    #[test]
    fn metadata_merges_into_root_and_shadows() {
        let mut doc = Document::new();
        doc.insert(
            "metadata",
            Payload::Json(serde_json::json!({
                "asset": { "version": "1.0" },
                "scene": "shadowed-value"
            })),
        );
        doc.insert("scene", Payload::Json(serde_json::json!({"real": true})));
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
        let decoded = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.get("scene"), Some(&Payload::Json(serde_json::json!("shadowed-value"))));
    }

    #[test]
    fn accepts_toc_placed_at_end_of_file() {
        // TOC need not immediately follow the header — only `toc_offset` in
        // the header matters. Here the single metadata section's body sits
        // right after the header, and the TOC trails it.
        let metadata = br#"{"asset":{"version":"1.0"}}"#;
        let header_size = 16u64;
        let meta_offset = header_size;
        let toc_offset = meta_offset + metadata.len() as u64;

        let mut buf = Vec::new();
        buf.extend_from_slice(b"XRAI");
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&toc_offset.to_le_bytes());
        buf.extend_from_slice(metadata);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&meta_offset.to_le_bytes());
        buf.extend_from_slice(&(metadata.len() as u64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());

        let doc = Decoder::new().decode(&buf, &DecodeOptions::default()).unwrap();
        assert_eq!(doc.metadata().unwrap()["asset"]["version"], "1.0");
    }

    #[test]
    fn section_count_at_max_is_accepted_above_max_is_rejected() {
        let mut doc = minimal_doc();
        for i in 0..99 {
            doc.insert(format!("unknown_{}", 1000 + i), Payload::Opaque(vec![1]));
        }
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
        assert!(Decoder::new().decode(&bytes, &DecodeOptions::default()).is_ok());

        doc.insert("unknown_2000", Payload::Opaque(vec![1]));
        let err = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TooManySections { count: 101, max: 100 }));
    }

    #[test]
    fn never_panics_on_arbitrary_short_input() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1234_5678);
        for len in 0..64 {
            let buf: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let _ = Decoder::new().decode(&buf, &DecodeOptions::default());
        }
    }
}
