//! Byte-level encode/decode for bricks and sectors.
//!
//! Split into two layers: a small bit/byte-packing layer ([`rle`]) for a
//! single brick's 512 blocks, underneath a whole-structure layer
//! ([`sector_codec`]) that wires per-brick RLE together with a sector's
//! header and dirty-state arrays. No vanilla-format compatibility
//! constraint here, so plain run-length encoding is enough.

pub mod rle;
pub mod sector_codec;
