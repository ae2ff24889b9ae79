// SPDX-License-Identifier: Apache-2.0
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]
//! Binary container codec for XRAI scene files.
//!
//! A container is a fixed 16-byte header, a table of contents, and a run of
//! typed, 4-byte-aligned sections (metadata, geometry, materials,
//! animations, audio, aiComponents, vfx, buffers, images, scene,
//! extensions). [`encode::Encoder`] assembles a [`document::Document`] into
//! bytes; [`decode::Decoder`] parses bytes back into one, tolerating
//! recoverable per-section problems in its default lenient mode.
//!
//! ```
//! use xrai_container::{Document, Encoder, EncodeOptions, Decoder, DecodeOptions, Payload};
//!
//! let mut doc = Document::new();
//! doc.insert("metadata", Payload::Json(serde_json::json!({ "asset": { "version": "1.0" } })));
//!
//! let bytes = Encoder::new().encode(&doc, &EncodeOptions::default()).unwrap();
//! let decoded = Decoder::new().decode(&bytes, &DecodeOptions::default()).unwrap();
//! assert_eq!(decoded.metadata(), doc.metadata());
//! ```

mod byteio;
mod compress;
mod decode;
mod document;
mod encode;
mod error;
mod layout;
mod registry;
mod stream;

pub use decode::{DecodeOptions, Decoder, ValidationResult};
pub use document::{Document, FormatInfo, Payload, Warning};
pub use encode::{EncodeOptions, Encoder};
pub use error::{Error, Result, MAGIC};
pub use registry::{interpretation, name_of, type_id_of, Interpretation};
pub use stream::{SectionEvent, SectionMeta, SectionStream};
