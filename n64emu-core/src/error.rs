//! Core error types.
//!
//! Peripheral operations never fail: malformed register traffic is absorbed
//! with hardware semantics. The only fatal paths are construction-time — a
//! ROM image the loader cannot make sense of, or failing to allocate the
//! RDRAM image — and both abort session startup.

use std::collections::TryReserveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The image is shorter than the 64-byte cartridge header.
    #[error("ROM image is {len} bytes, shorter than the 64-byte cartridge header")]
    RomTooShort { len: usize },

    /// The magic word matches none of the three dump byte orders.
    #[error("unrecognized ROM magic {magic:#010x} (expected a .z64, .v64 or .n64 dump)")]
    UnknownRomFormat { magic: u32 },

    /// RDRAM image allocation failed at session construction.
    #[error("failed to allocate {size} byte RDRAM image")]
    RdramAlloc {
        size: usize,
        #[source]
        source: TryReserveError,
    },
}
