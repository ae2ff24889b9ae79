// SPDX-License-Identifier: Apache-2.0
//! Wire-layout constants shared by the encoder and decoder, kept in one
//! place so encode and decode can't drift apart on them.

/// Fixed header size: magic(4) + major(1) + minor(1) + file flags(2) + TOC offset(8).
pub const HEADER_SIZE: u64 = 16;

/// Size of the TOC's leading section-count field.
pub const TOC_HEADER_SIZE: u64 = 4;

/// Size of one TOC entry: type id(4) + offset(8) + size(8) + flags(4).
pub const TOC_ENTRY_SIZE: u64 = 24;

/// Default ceiling on the number of sections a file may declare.
pub const DEFAULT_MAX_SECTION_COUNT: u32 = 100;

/// The container's header major version. Decoders reject any greater major.
pub const FORMAT_MAJOR: u8 = 1;

/// The container's header minor version this encoder writes.
pub const FORMAT_MINOR: u8 = 0;
