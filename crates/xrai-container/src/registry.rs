// SPDX-License-Identifier: Apache-2.0
//! The closed section registry.
//!
//! Maps numeric section type ids to logical names and tells the codec
//! whether a section's payload is JSON or opaque bytes. Adding a section
//! type is a code change, not a runtime registration — there is no dynamic
//! dispatch here, just a fixed table.

/// How a section's payload bytes should be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpretation {
    /// Payload is UTF-8 JSON.
    Json,
    /// Payload is opaque bytes, passed through untouched.
    Opaque,
}

/// One entry in the closed section registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    type_id: u32,
    name: &'static str,
    interpretation: Interpretation,
}

/// Registered sections in ascending type-id order. This is also the
/// canonical order the encoder writes sections in, which is what keeps its
/// output byte-identical across runs.
const ENTRIES: &[Entry] = &[
    Entry {
        type_id: 1,
        name: "metadata",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 2,
        name: "geometry",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 3,
        name: "materials",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 4,
        name: "animations",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 5,
        name: "audio",
        interpretation: Interpretation::Opaque,
    },
    Entry {
        type_id: 6,
        name: "aiComponents",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 7,
        name: "vfx",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 8,
        name: "buffers",
        interpretation: Interpretation::Opaque,
    },
    Entry {
        type_id: 9,
        name: "images",
        interpretation: Interpretation::Opaque,
    },
    Entry {
        type_id: 10,
        name: "scene",
        interpretation: Interpretation::Json,
    },
    Entry {
        type_id: 11,
        name: "extensions",
        interpretation: Interpretation::Json,
    },
];

/// Type id of the required metadata section.
pub const METADATA_TYPE_ID: u32 = 1;

/// Smallest type id reserved for future use (not assignable, not yet defined).
const RESERVED_LOW: u32 = 12;
/// Smallest type id that is structurally invalid (out of the reserved range).
const INVALID_FLOOR: u32 = 101;

/// Look up the logical section name for a type id, if registered.
pub fn name_of(type_id: u32) -> Option<&'static str> {
    ENTRIES
        .iter()
        .find(|e| e.type_id == type_id)
        .map(|e| e.name)
}

/// Look up the type id for a logical section name, if registered.
pub fn type_id_of(name: &str) -> Option<u32> {
    ENTRIES.iter().find(|e| e.name == name).map(|e| e.type_id)
}

/// How a registered type id's payload should be interpreted.
///
/// Returns `None` for unregistered ids (including the reserved range);
/// callers treat those as opaque under a synthetic `unknown_<id>` name.
pub fn interpretation(type_id: u32) -> Option<Interpretation> {
    ENTRIES
        .iter()
        .find(|e| e.type_id == type_id)
        .map(|e| e.interpretation)
}

/// Whether `type_id` falls in the reserved-for-future-use range (12..=100).
pub fn is_reserved(type_id: u32) -> bool {
    (RESERVED_LOW..INVALID_FLOOR).contains(&type_id)
}

/// Whether `type_id` is structurally invalid (> 100, and not 0).
pub fn is_invalid(type_id: u32) -> bool {
    type_id >= INVALID_FLOOR
}

/// All registered type ids in ascending order — the encoder's canonical
/// section-write order.
pub fn ordered_type_ids() -> impl Iterator<Item = u32> {
    ENTRIES.iter().map(|e| e.type_id)
}
