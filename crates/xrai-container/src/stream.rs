// SPDX-License-Identifier: Apache-2.0
//! Pull-based streaming events over a section body.
//!
//! The decoder doesn't hand callers a callback to drive; it hands back a
//! [`SectionStream`] they pull [`SectionEvent`]s from, one at a time. The
//! header and TOC are read first (genuinely random access — a container
//! can't be interpreted without them), then section bodies are yielded in
//! bounded chunks so a caller never has to hold more than one section's
//! remaining bytes in flight.

use std::io::{Read, Seek, SeekFrom};

use crate::decode::{self, Header, TocEntry};
use crate::error::{Error, Result};
use crate::layout::{HEADER_SIZE, TOC_ENTRY_SIZE, TOC_HEADER_SIZE};
use crate::registry;

/// One step of a [`SectionStream`]'s pull protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionEvent {
    /// The TOC has been read; here is every section's header-level metadata
    /// in TOC order, before any body bytes are read.
    Toc {
        /// The sections about to be streamed, in order.
        sections: Vec<SectionMeta>,
    },
    /// A new section's body is about to be streamed.
    SectionStart(SectionMeta),
    /// Up to `chunk_size` raw (possibly still compressed) bytes of the
    /// current section's body.
    SectionChunk(Vec<u8>),
    /// The current section's body is fully delivered.
    SectionEnd,
}

/// A TOC entry's header-level fields, without its body bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionMeta {
    /// The section's type id.
    pub type_id: u32,
    /// Byte length of the section's (possibly compressed) body.
    pub size: u64,
    /// The section's flags.
    pub flags: u32,
}

impl From<&TocEntry> for SectionMeta {
    fn from(e: &TocEntry) -> Self {
        Self {
            type_id: e.type_id,
            size: e.size,
            flags: e.flags,
        }
    }
}

#[derive(Debug)]
enum State {
    Start,
    InSection { index: usize, remaining: u64 },
    BetweenSections { index: usize },
    Done,
}

/// Drives a sequential walk over one container's header, TOC, and section
/// bodies, yielding [`SectionEvent`]s without ever buffering more than one
/// chunk plus the TOC itself.
pub struct SectionStream<'a, R> {
    source: &'a mut R,
    header: Header,
    entries: Vec<TocEntry>,
    chunk_size: usize,
    state: State,
}

impl<'a, R: Read + Seek> SectionStream<'a, R> {
    /// Read and bounds-check the header and TOC from `source`, positioning
    /// it to begin streaming the first section's body.
    pub fn open(source: &'a mut R, max_section_count: u32, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::EncoderInputInvalid {
                reason: "chunk_size must be non-zero".to_string(),
            });
        }

        let file_len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        let mut header_buf = vec![0u8; HEADER_SIZE as usize];
        read_exact_bounded(source, &mut header_buf, "header", 0, file_len)?;
        let header = decode::parse_header(&header_buf)?;

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
        source.seek(SeekFrom::Start(header.toc_offset))?;
        let mut count_buf = [0u8; 4];
        read_exact_bounded(source, &mut count_buf, "toc section count", header.toc_offset, file_len)?;
        let count = u32::from_le_bytes(count_buf);
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
        let mut toc_buf = vec![0u8; entries_len as usize];
        read_exact_bounded(source, &mut toc_buf, "toc entries", entries_start, file_len)?;
        let entries = decode::parse_toc_entries(&toc_buf, count, file_len)?;

        if !entries.iter().any(|e| e.type_id == registry::METADATA_TYPE_ID) {
            return Err(Error::MissingRequiredSection);
        }

        Ok(Self {
            source,
            header,
            entries,
            chunk_size,
            state: State::Start,
        })
    }

    /// The decoded header, available as soon as the stream is open.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Pull the next event. Returns `None` once every section has been
    /// fully streamed.
    pub fn next_event(&mut self) -> Result<Option<SectionEvent>> {
        match self.state {
            State::Start => {
                let sections = self.entries.iter().map(SectionMeta::from).collect();
                self.state = if self.entries.is_empty() {
                    State::Done
                } else {
                    State::BetweenSections { index: 0 }
                };
                Ok(Some(SectionEvent::Toc { sections }))
            }
            State::BetweenSections { index } => {
                let entry = self.entries[index];
                self.source.seek(SeekFrom::Start(entry.offset))?;
                self.state = State::InSection {
                    index,
                    remaining: entry.size,
                };
                Ok(Some(SectionEvent::SectionStart(SectionMeta::from(&entry))))
            }
            State::InSection { index, remaining } => {
                if remaining == 0 {
                    self.state = if index + 1 < self.entries.len() {
                        State::BetweenSections { index: index + 1 }
                    } else {
                        State::Done
                    };
                    return Ok(Some(SectionEvent::SectionEnd));
                }
                let want = self.chunk_size.min(remaining as usize);
                let mut buf = vec![0u8; want];
                self.source.read_exact(&mut buf)?;
                self.state = State::InSection {
                    index,
                    remaining: remaining - want as u64,
                };
                Ok(Some(SectionEvent::SectionChunk(buf)))
            }
            State::Done => Ok(None),
        }
    }
}

fn read_exact_bounded<R: Read>(source: &mut R, buf: &mut [u8], context: &'static str, at: u64, file_len: u64) -> Result<()> {
    source.read_exact(buf).map_err(|_| Error::Truncated {
        context,
        at,
        needed: buf.len() as u64,
        available: file_len.saturating_sub(at),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::decode::DecodeOptions;
    use crate::document::{Document, Payload};
    use crate::encode::{EncodeOptions, Encoder};
    use crate::decode::Decoder;
    use std::io::Cursor;

    #[test]
    fn yields_toc_then_chunks_then_end() {
        let mut doc = Document::new();
        doc.insert("metadata", Payload::Json(serde_json::json!({"asset": {"version": "1.0"}})));
        doc.insert("geometry", Payload::Json(serde_json::json!({"v": "z".repeat(100)})));
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
        let mut cursor = Cursor::new(&bytes);
        let mut stream = SectionStream::open(&mut cursor, 100, 32).unwrap();

        let first = stream.next_event().unwrap().unwrap();
        let sections = match first {
            SectionEvent::Toc { sections } => sections,
            other => panic!("expected Toc, got {other:?}"),
        };
        assert_eq!(sections.len(), 2);

        let mut reassembled: Vec<u8> = Vec::new();
        let mut saw_start = false;
        let mut saw_end = false;
        loop {
            match stream.next_event().unwrap() {
                Some(SectionEvent::SectionStart(_)) => saw_start = true,
                Some(SectionEvent::SectionChunk(chunk)) => reassembled.extend(chunk),
                Some(SectionEvent::SectionEnd) => saw_end = true,
                Some(SectionEvent::Toc { .. }) => panic!("Toc only yielded once"),
                None => break,
            }
        }
        assert!(saw_start);
        assert!(saw_end);
        assert!(!reassembled.is_empty());
    }

    #[test]
    fn full_walk_matches_decoded_document() {
        let mut doc = Document::new();
        doc.insert("metadata", Payload::Json(serde_json::json!({"asset": {"version": "1.0"}})));
        doc.insert("audio", Payload::Opaque(vec![9u8; 50]));
        let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();

        let expected = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();

        let mut cursor = Cursor::new(&bytes);
        let streamed = Decoder::new()
            .decode_stream(&mut cursor, &DecodeOptions::default())
            .unwrap();
        assert_eq!(expected, streamed);
    }
}
