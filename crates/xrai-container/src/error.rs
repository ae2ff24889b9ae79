// SPDX-License-Identifier: Apache-2.0
//! Structured errors for the container codec.
//!
//! Every fatal condition in [`crate::decode`] and [`crate::encode`] is one of
//! these variants. They carry enough context to build an actionable message
//! without re-parsing the file, following the `[CODE]`-prefixed convention
//! this codebase already uses for content-addressed storage errors.

/// The four magic bytes every container must open with.
pub const MAGIC: [u8; 4] = *b"XRAI";

/// Errors produced by encoding, decoding, or validating a container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The first four bytes were not `"XRAI"`.
    #[error("[INVALID_MAGIC] expected {MAGIC:?}, got {observed:?}")]
    InvalidMagic {
        /// The four bytes actually found at offset 0.
        observed: [u8; 4],
    },

    /// The major version exceeds what this decoder understands.
    #[error("[UNSUPPORTED_VERSION] major.minor {major}.{minor} is not supported (max major 1)")]
    UnsupportedVersion {
        /// Observed major version.
        major: u8,
        /// Observed minor version.
        minor: u8,
    },

    /// A read ran past the end of the available bytes.
    #[error("[TRUNCATED] {context}: need {needed} bytes at offset {at}, have {available}")]
    Truncated {
        /// What was being read (header, TOC, section N, ...).
        context: &'static str,
        /// Offset the read started at.
        at: u64,
        /// Bytes required to satisfy the read.
        needed: u64,
        /// Bytes actually available from `at`.
        available: u64,
    },

    /// A computed offset/size either overflowed or pointed outside the file.
    #[error("[INVALID_OFFSET] {context}: offset {offset} size {size} exceeds file length {file_len}")]
    InvalidOffset {
        /// What this offset belongs to (a section, the TOC, ...).
        context: &'static str,
        /// The offset in question.
        offset: u64,
        /// The size in question.
        size: u64,
        /// Total length of the file being decoded.
        file_len: u64,
    },

    /// The TOC declares more sections than `max_section_count` allows.
    #[error("[TOO_MANY_SECTIONS] {count} exceeds configured maximum {max}")]
    TooManySections {
        /// Section count read from the TOC.
        count: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// No `metadata` (type id 1) section was present.
    #[error("[MISSING_REQUIRED_SECTION] metadata section (type id 1) is required")]
    MissingRequiredSection,

    /// The metadata section was not UTF-8 JSON, or lacked `asset.version`.
    #[error("[INVALID_METADATA] {reason}")]
    InvalidMetadata {
        /// Human-readable reason the metadata section was rejected.
        reason: String,
    },

    /// Inflating a section's bytes failed, or exceeded `max_inflated_size`.
    #[error("[DECOMPRESSION_FAILED] section type {type_id}: {reason}")]
    DecompressionFailed {
        /// The section's type id.
        type_id: u32,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Flags named a compression algorithm this decoder doesn't implement.
    #[error("[UNKNOWN_COMPRESSION_ALGORITHM] section type {type_id}: algorithm id {algorithm}")]
    UnknownCompressionAlgorithm {
        /// The section's type id.
        type_id: u32,
        /// The unrecognized algorithm id (flags bits 8-15).
        algorithm: u16,
    },

    /// A JSON-typed section failed to parse (strict mode only; lenient mode
    /// downgrades this to a [`crate::document::Warning`]).
    #[error("[INVALID_JSON_PAYLOAD] section type {type_id}: {reason}")]
    InvalidJsonPayload {
        /// The section's type id.
        type_id: u32,
        /// The `serde_json` error message.
        reason: String,
    },

    /// The caller's `Document` cannot be encoded as given.
    #[error("[ENCODER_INPUT_INVALID] {reason}")]
    EncoderInputInvalid {
        /// Human-readable reason the input was rejected.
        reason: String,
    },

    /// An unregistered section type id was encountered with
    /// `lenient_unknown_sections` disabled.
    #[error("[UNKNOWN_SECTION_TYPE] section type {type_id} is not registered")]
    UnknownSectionType {
        /// The unrecognized section type id.
        type_id: u32,
    },

    /// The underlying byte source or sink failed.
    #[error("[IO] {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results returning [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
