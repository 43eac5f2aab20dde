//! Per-brick/per-sector dirty and require-update bitsets.
//!
//! The 16 bits are intentionally nameless, fixed per project at build time.
//! This crate fixes `RESERVED0` as the default flag `Sector::set_block` ORs
//! in when the caller doesn't specify one explicitly; downstream consumers
//! are free to claim the remaining 15 bits for their own change classes
//! (mesh-rebuild-needed, physics-AABB-stale, lighting-dirty, ...).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u16 {
        const RESERVED0  = 1 << 0;
        const RESERVED1  = 1 << 1;
        const RESERVED2  = 1 << 2;
        const RESERVED3  = 1 << 3;
        const RESERVED4  = 1 << 4;
        const RESERVED5  = 1 << 5;
        const RESERVED6  = 1 << 6;
        const RESERVED7  = 1 << 7;
        const RESERVED8  = 1 << 8;
        const RESERVED9  = 1 << 9;
        const RESERVED10 = 1 << 10;
        const RESERVED11 = 1 << 11;
        const RESERVED12 = 1 << 12;
        const RESERVED13 = 1 << 13;
        const RESERVED14 = 1 << 14;
        const RESERVED15 = 1 << 15;
    }
}

impl DirtyFlags {
    /// The default flag `Sector::set_block` applies when the caller passes
    /// no explicit `DirtyFlags`.
    pub const BLOCK_MODIFIED: DirtyFlags = DirtyFlags::RESERVED0;
}
