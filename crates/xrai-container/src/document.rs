// SPDX-License-Identifier: Apache-2.0
//! The decoded tree: [`Document`], [`Payload`], and the bits attached after
//! a successful decode ([`FormatInfo`], [`Warning`]).

use indexmap::IndexMap;

/// A section's payload, tagged by how the codec interprets its bytes.
///
/// Field-level schema validation is out of scope — geometry, materials,
/// animations and the rest are opaque JSON trees as far as this crate is
/// concerned. Strongly-typed views belong to external collaborators that
/// layer on top of `Payload::Json`.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A parsed JSON payload (section types: metadata, geometry, materials,
    /// animations, aiComponents, vfx, scene, extensions).
    Json(serde_json::Value),
    /// Raw bytes, passed through untouched (section types: audio, buffers,
    /// images; also any unknown type id in lenient mode).
    Opaque(Vec<u8>),
}

impl Payload {
    /// Borrow the JSON value, if this is a [`Payload::Json`].
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Opaque(_) => None,
        }
    }

    /// Borrow the raw bytes, if this is a [`Payload::Opaque`].
    pub fn as_opaque(&self) -> Option<&[u8]> {
        match self {
            Self::Opaque(b) => Some(b),
            Self::Json(_) => None,
        }
    }

    /// Whether the payload is empty (no bytes to write, or `null`/empty-ish
    /// JSON is still considered present — only a literally-absent section
    /// is skipped by the encoder).
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Opaque(b) => b.is_empty(),
            Self::Json(v) => v.is_null(),
        }
    }
}

/// Format version and reserved flags, attached to a decoded [`Document`]
/// under the `_format` key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// Header major version.
    pub major: u8,
    /// Header minor version.
    pub minor: u8,
    /// Header file flags (currently always 0; decoders ignore unknown bits).
    pub flags: u16,
}

impl FormatInfo {
    /// Render as `"major.minor"`.
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

/// A recoverable, per-section condition surfaced alongside a decoded
/// [`Document`] rather than aborting the decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    /// The section's type id.
    pub type_id: u32,
    /// Human-readable description of what was downgraded and why.
    pub message: String,
}

/// The decoded tree: an ordered map from section name to payload, plus
/// format metadata and any recoverable warnings collected during decode.
///
/// Section order reflects TOC order on decode (ascending file offset for
/// canonically encoded files) and registry type-id order on encode; callers
/// that care about iteration order get one for free since `Document` is
/// backed by an order-preserving map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    sections: IndexMap<String, Payload>,
    /// Format version/flags. `None` until a decode (or explicit encode
    /// round-trip) has populated it.
    pub format: Option<FormatInfo>,
    /// Recoverable per-section warnings collected while decoding.
    pub warnings: Vec<Warning>,
}

impl Document {
    /// An empty document with no sections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a section's payload, preserving existing key order
    /// or appending if the key is new.
    pub fn insert(&mut self, name: impl Into<String>, payload: Payload) {
        self.sections.insert(name.into(), payload);
    }

    /// Borrow a section's payload by name.
    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.sections.get(name)
    }

    /// Borrow a section's payload by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Payload> {
        self.sections.get_mut(name)
    }

    /// Remove a section by name, returning its payload if present.
    pub fn remove(&mut self, name: &str) -> Option<Payload> {
        self.sections.shift_remove(name)
    }

    /// Iterate sections in their current order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of sections present (excluding `_format`, which lives outside
    /// the section map).
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether there are no sections at all.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Borrow the `metadata` section's JSON value, if present and JSON.
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.get("metadata").and_then(Payload::as_json)
    }

    /// Record a recoverable warning.
    pub fn push_warning(&mut self, type_id: u32, message: impl Into<String>) {
        self.warnings.push(Warning {
            type_id,
            message: message.into(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut doc = Document::new();
        doc.insert("scene", Payload::Json(serde_json::json!({})));
        doc.insert("metadata", Payload::Json(serde_json::json!({})));
        let names: Vec<&str> = doc.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["scene", "metadata"]);
    }

    #[test]
    fn absence_semantics() {
        assert!(Payload::Opaque(Vec::new()).is_absent());
        assert!(!Payload::Opaque(vec![0]).is_absent());
        assert!(Payload::Json(serde_json::Value::Null).is_absent());
        assert!(!Payload::Json(serde_json::json!({})).is_absent());
    }

    #[test]
    fn format_info_version_string() {
        let fmt = FormatInfo {
            major: 1,
            minor: 0,
            flags: 0,
        };
        assert_eq!(fmt.version_string(), "1.0");
    }
}
