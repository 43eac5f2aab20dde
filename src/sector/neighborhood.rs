//! Transparent cross-sector block/brick-flag access.
//!
//! Stateless aside from the center sector and the resolved neighbor
//! references -- the caller (here, [`crate::entity::VoxelEntity`]) is
//! responsible for resolving its `NeighborHandles` table into borrowed
//! `&Sector`s before constructing a reader, so this module doesn't need to
//! know how neighbor ownership/lifetime is modeled. The floor-division
//! translation from a block/brick coordinate that may fall outside the
//! center sector into a (direction, local coordinate) pair is the same
//! trick as chunk/local splitting in a flat world, applied against an
//! explicit 26-entry neighbor table instead.

use super::direction::{self, DIRECTION_COUNT};
use super::{Sector, SECTOR_SIZE_IN_BLOCKS, SIZE_IN_BRICKS};
use crate::block::Block;
use crate::dirty_flags::DirtyFlags;
use crate::math::floor_mod;

pub struct NeighborhoodReader<'a> {
    center: &'a Sector,
    neighbors: [Option<&'a Sector>; DIRECTION_COUNT],
}

impl<'a> NeighborhoodReader<'a> {
    pub fn new(center: &'a Sector, neighbors: [Option<&'a Sector>; DIRECTION_COUNT]) -> Self {
        Self { center, neighbors }
    }

    pub fn has_neighbor(&self, direction: usize) -> bool {
        self.neighbors[direction].is_some()
    }

    /// Read a block at coordinates that may fall outside `[0,128)` on any
    /// axis by up to one sector-width; resolves to the appropriate neighbor
    /// (or [`Block::EMPTY`] if that neighbor is absent).
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Block {
        let size = SECTOR_SIZE_IN_BLOCKS as i32;
        let (sx, lx) = axis_translate(x, size);
        let (sy, ly) = axis_translate(y, size);
        let (sz, lz) = axis_translate(z, size);

        if sx == 0 && sy == 0 && sz == 0 {
            return self.center.get_block(lx as usize, ly as usize, lz as usize);
        }

        match direction::index_of(sx, sy, sz) {
            Some(i) => match self.neighbors[i] {
                Some(sector) => sector.get_block(lx as usize, ly as usize, lz as usize),
                None => Block::EMPTY,
            },
            None => Block::EMPTY,
        }
    }

    /// Same translation rules as [`get_block`](Self::get_block), but at
    /// brick-grid scale (`[0,16)` per axis instead of `[0,128)`).
    pub fn get_brick_dirty_flags(&self, bx: i32, by: i32, bz: i32) -> DirtyFlags {
        let size = SIZE_IN_BRICKS as i32;
        let (sx, lbx) = axis_translate(bx, size);
        let (sy, lby) = axis_translate(by, size);
        let (sz, lbz) = axis_translate(bz, size);

        let slot = Sector::to_brick_idx(lbx as usize, lby as usize, lbz as usize);

        if sx == 0 && sy == 0 && sz == 0 {
            return self.center.brick_dirty_flags(slot);
        }

        match direction::index_of(sx, sy, sz) {
            Some(i) => match self.neighbors[i] {
                Some(sector) => sector.brick_dirty_flags(slot),
                None => DirtyFlags::empty(),
            },
            None => DirtyFlags::empty(),
        }
    }

    /// Same translation rules again, reading `brick_dirty_direction_mask`
    /// instead -- used by [`crate::propagation`] to check whether a
    /// neighbor brick's mask actually points back at the puller.
    pub fn get_brick_dirty_direction_mask(&self, bx: i32, by: i32, bz: i32) -> u32 {
        let size = SIZE_IN_BRICKS as i32;
        let (sx, lbx) = axis_translate(bx, size);
        let (sy, lby) = axis_translate(by, size);
        let (sz, lbz) = axis_translate(bz, size);

        let slot = Sector::to_brick_idx(lbx as usize, lby as usize, lbz as usize);

        if sx == 0 && sy == 0 && sz == 0 {
            return self.center.brick_dirty_direction_mask(slot);
        }

        match direction::index_of(sx, sy, sz) {
            Some(i) => match self.neighbors[i] {
                Some(sector) => sector.brick_dirty_direction_mask(slot),
                None => 0,
            },
            None => 0,
        }
    }
}

/// Splits a coordinate into `(sign, local)`: `sign` is which sector-width
/// cell it falls in, clamped to `{-1,0,1}` (coordinates more than one
/// sector-width away from the center have no neighbor to resolve to, so
/// they're treated the same as the nearest clamped direction); `local` is
/// always the mathematical (non-negative) modulo.
fn axis_translate(v: i32, size: i32) -> (i32, i32) {
    let sign = v.div_euclid(size).clamp(-1, 1);
    let local = floor_mod(v, size);
    (sign, local)
}
