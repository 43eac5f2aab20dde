//! Sparse 16^3 brick grid over a 128^3 block volume.
//!
//! Storage layout is load-bearing: `voxels` is a single flat `Vec<Block>`
//! indexed by `compact_idx * 512 + local_block_idx`. Keep this layout as-is
//! -- the RLE codec and any downstream GPU uploader assume it bit-for-bit.
//! Two-level sparse scheme: a fixed `brick_idx` table maps every one of the
//! 4096 brick slots in a sector to either `BRICKID_EMPTY` or a compact index
//! into `voxels`, so a sector that's mostly air never allocates storage for
//! the bricks it doesn't have.

pub mod direction;
pub mod neighborhood;

use crate::block::Block;
use crate::dirty_flags::DirtyFlags;
use crate::math::IVec3;
use std::collections::VecDeque;

/// Brick edge length in blocks.
pub const SIZE_IN_BLOCKS: usize = 8;
/// Sector edge length in bricks.
pub const SIZE_IN_BRICKS: usize = 16;
/// Blocks per brick (8^3).
pub const BLOCKS_IN_BRICK: usize = 512;
/// Bricks per sector (16^3).
pub const BRICKS_IN_SECTOR: usize = 4096;
/// Sector edge length in blocks (16 * 8).
pub const SECTOR_SIZE_IN_BLOCKS: usize = 128;

/// Sentinel stored in `brick_idx` for an unallocated brick slot.
pub const BRICKID_EMPTY: i16 = -1;

/// Sparse container for one 128^3 block volume.
#[derive(Clone)]
pub struct Sector {
    brick_idx: [i16; BRICKS_IN_SECTOR],
    voxels: Vec<Block>,
    non_empty_brick_list: Vec<u16>,
    brick_dirty_flags: [DirtyFlags; BRICKS_IN_SECTOR],
    brick_dirty_direction_mask: [u32; BRICKS_IN_SECTOR],
    brick_require_update_flags: [DirtyFlags; BRICKS_IN_SECTOR],
    sector_dirty_flags: DirtyFlags,
    sector_require_update_flags: DirtyFlags,
    sector_neighbors_to_create: u32,
    update_record: VecDeque<u16>,
}

impl Default for Sector {
    fn default() -> Self {
        Self::new()
    }
}

impl Sector {
    pub fn new() -> Self {
        Self {
            brick_idx: [BRICKID_EMPTY; BRICKS_IN_SECTOR],
            voxels: Vec::new(),
            non_empty_brick_list: Vec::new(),
            brick_dirty_flags: [DirtyFlags::empty(); BRICKS_IN_SECTOR],
            brick_dirty_direction_mask: [0; BRICKS_IN_SECTOR],
            brick_require_update_flags: [DirtyFlags::empty(); BRICKS_IN_SECTOR],
            sector_dirty_flags: DirtyFlags::empty(),
            sector_require_update_flags: DirtyFlags::empty(),
            sector_neighbors_to_create: 0,
            update_record: VecDeque::new(),
        }
    }

    // ── Indexing ─────────────────────────────────────────────────────────

    /// Absolute brick slot for brick-grid coordinates `(x, y, z) ∈ [0,16)^3`.
    #[inline]
    pub const fn to_brick_idx(x: usize, y: usize, z: usize) -> usize {
        x + SIZE_IN_BRICKS * y + SIZE_IN_BRICKS * SIZE_IN_BRICKS * z
    }

    /// Inverse of [`to_brick_idx`](Self::to_brick_idx).
    #[inline]
    pub const fn brick_pos_from_slot(slot: usize) -> IVec3 {
        let x = (slot % SIZE_IN_BRICKS) as i32;
        let y = ((slot / SIZE_IN_BRICKS) % SIZE_IN_BRICKS) as i32;
        let z = (slot / (SIZE_IN_BRICKS * SIZE_IN_BRICKS)) as i32;
        IVec3::new(x, y, z)
    }

    /// Within-brick block index for local coordinates `(x, y, z) ∈ [0,8)^3`.
    #[inline]
    const fn to_block_idx(x: usize, y: usize, z: usize) -> usize {
        x + SIZE_IN_BLOCKS * y + SIZE_IN_BLOCKS * SIZE_IN_BLOCKS * z
    }

    #[inline]
    const fn block_pos_from_local(local: usize) -> (u8, u8, u8) {
        let x = (local % SIZE_IN_BLOCKS) as u8;
        let y = ((local / SIZE_IN_BLOCKS) % SIZE_IN_BLOCKS) as u8;
        let z = (local / (SIZE_IN_BLOCKS * SIZE_IN_BLOCKS)) as u8;
        (x, y, z)
    }

    #[inline]
    fn decompose(x: usize, y: usize, z: usize) -> (usize, usize, usize, usize) {
        debug_assert!(x < SECTOR_SIZE_IN_BLOCKS && y < SECTOR_SIZE_IN_BLOCKS && z < SECTOR_SIZE_IN_BLOCKS);
        let slot = Self::to_brick_idx(x / SIZE_IN_BLOCKS, y / SIZE_IN_BLOCKS, z / SIZE_IN_BLOCKS);
        let local = Self::to_block_idx(x % SIZE_IN_BLOCKS, y % SIZE_IN_BLOCKS, z % SIZE_IN_BLOCKS);
        (slot, local, x % SIZE_IN_BLOCKS, y % SIZE_IN_BLOCKS)
    }

    // ── Block access ─────────────────────────────────────────────────────

    /// Read the block at sector-local coordinates. Never allocates.
    pub fn get_block(&self, x: usize, y: usize, z: usize) -> Block {
        let (slot, local, ..) = Self::decompose(x, y, z);
        let compact = self.brick_idx[slot];
        if compact == BRICKID_EMPTY {
            return Block::EMPTY;
        }
        self.voxels[compact as usize * BLOCKS_IN_BRICK + local]
    }

    /// Write `block` at sector-local coordinates, ORing `flags` (or
    /// [`DirtyFlags::BLOCK_MODIFIED`] if `None`) into the brick/sector dirty
    /// state and recomputing the brick's direction mask.
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: Block, flags: Option<DirtyFlags>) {
        debug_assert!(x < SECTOR_SIZE_IN_BLOCKS && y < SECTOR_SIZE_IN_BLOCKS && z < SECTOR_SIZE_IN_BLOCKS);
        let slot = Self::to_brick_idx(x / SIZE_IN_BLOCKS, y / SIZE_IN_BLOCKS, z / SIZE_IN_BLOCKS);
        let (lx, ly, lz) = (x % SIZE_IN_BLOCKS, y % SIZE_IN_BLOCKS, z % SIZE_IN_BLOCKS);
        let local = Self::to_block_idx(lx, ly, lz);

        if self.brick_idx[slot] == BRICKID_EMPTY {
            if block.is_empty() {
                // Writing empty into an unallocated brick never allocates.
                return;
            }
            self.allocate_brick(slot);
        }

        let compact = self.brick_idx[slot] as usize;
        self.voxels[compact * BLOCKS_IN_BRICK + local] = block;

        self.update_record.push_back(slot as u16);

        let dir_mask = direction::block_direction_mask(lx as u8, ly as u8, lz as u8);
        self.brick_dirty_direction_mask[slot] |= dir_mask;

        let flags = flags.unwrap_or(DirtyFlags::BLOCK_MODIFIED);
        self.brick_dirty_flags[slot] |= flags;
        self.sector_dirty_flags |= flags;
    }

    fn allocate_brick(&mut self, slot: usize) {
        let compact = self.voxels.len() / BLOCKS_IN_BRICK;
        self.voxels.resize(self.voxels.len() + BLOCKS_IN_BRICK, Block::EMPTY);
        self.brick_idx[slot] = compact as i16;
        self.non_empty_brick_list.push(slot as u16);
    }

    /// Explicit dirty-marking form: OR `flags`/`direction_mask` into a
    /// brick's state without touching any block data.
    pub fn mark_brick_dirty(&mut self, slot: usize, flags: DirtyFlags, direction_mask: u32) {
        debug_assert!(slot < BRICKS_IN_SECTOR);
        self.brick_dirty_flags[slot] |= flags;
        self.brick_dirty_direction_mask[slot] |= direction_mask;
        self.sector_dirty_flags |= flags;
        self.update_record.push_back(slot as u16);
    }

    /// Rebuild `non_empty_brick_list` from `brick_idx` (used after bulk
    /// load, when bricks were allocated directly by the codec rather than
    /// via [`set_block`](Self::set_block)).
    pub fn update_non_empty_bricks(&mut self) {
        let count = self.voxels.len() / BLOCKS_IN_BRICK;
        let mut list = vec![0u16; count];
        for (slot, &compact) in self.brick_idx.iter().enumerate() {
            if compact != BRICKID_EMPTY {
                list[compact as usize] = slot as u16;
            }
        }
        self.non_empty_brick_list = list;
    }

    // ── Iteration ────────────────────────────────────────────────────────

    /// Iterate every non-empty block in the sector as `(position, block)`.
    pub fn iterate_non_empty_blocks(&self) -> impl Iterator<Item = (IVec3, Block)> + '_ {
        self.non_empty_brick_list.iter().enumerate().flat_map(move |(compact, &slot)| {
            let brick_pos = Self::brick_pos_from_slot(slot as usize);
            (0..BLOCKS_IN_BRICK).filter_map(move |local| {
                let block = self.voxels[compact * BLOCKS_IN_BRICK + local];
                if block.is_empty() {
                    return None;
                }
                let (lx, ly, lz) = Self::block_pos_from_local(local);
                Some((
                    IVec3::new(
                        brick_pos.x * SIZE_IN_BLOCKS as i32 + lx as i32,
                        brick_pos.y * SIZE_IN_BLOCKS as i32 + ly as i32,
                        brick_pos.z * SIZE_IN_BLOCKS as i32 + lz as i32,
                    ),
                    block,
                ))
            })
        })
    }

    /// Iterate bricks whose `require_update_flags & mask != 0`, optionally
    /// clearing exactly the matched bits as they're yielded -- never a full
    /// clear of the word, only the bits in `mask`.
    pub fn iterate_require_update_bricks(&mut self, mask: DirtyFlags, clear: bool) -> RequireUpdateIter<'_> {
        RequireUpdateIter { sector: self, mask, clear, cursor: 0 }
    }

    /// Clears transient per-tick state: `update_record`, dirty flags, and
    /// dirty direction masks. Does NOT clear `require_update_flags` --
    /// consumers clear those themselves via
    /// [`iterate_require_update_bricks`](Self::iterate_require_update_bricks).
    pub fn end_tick(&mut self) {
        self.update_record.clear();
        self.brick_dirty_flags = [DirtyFlags::empty(); BRICKS_IN_SECTOR];
        self.brick_dirty_direction_mask = [0; BRICKS_IN_SECTOR];
        self.sector_dirty_flags = DirtyFlags::empty();
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn non_empty_brick_count(&self) -> usize {
        self.voxels.len() / BLOCKS_IN_BRICK
    }

    pub fn non_empty_brick_list(&self) -> &[u16] {
        &self.non_empty_brick_list
    }

    pub fn brick_idx(&self, slot: usize) -> i16 {
        self.brick_idx[slot]
    }

    pub fn brick_dirty_flags(&self, slot: usize) -> DirtyFlags {
        self.brick_dirty_flags[slot]
    }

    pub fn brick_dirty_direction_mask(&self, slot: usize) -> u32 {
        self.brick_dirty_direction_mask[slot]
    }

    pub fn brick_require_update_flags(&self, slot: usize) -> DirtyFlags {
        self.brick_require_update_flags[slot]
    }

    /// Used only by [`crate::propagation`] to write propagation results.
    pub(crate) fn set_brick_require_update_flags(&mut self, slot: usize, flags: DirtyFlags) {
        self.brick_require_update_flags[slot] |= flags;
        self.sector_require_update_flags |= flags;
    }

    pub fn sector_dirty_flags(&self) -> DirtyFlags {
        self.sector_dirty_flags
    }

    pub fn sector_require_update_flags(&self) -> DirtyFlags {
        self.sector_require_update_flags
    }

    pub fn sector_neighbors_to_create(&self) -> u32 {
        self.sector_neighbors_to_create
    }

    pub fn set_sector_neighbors_to_create(&mut self, mask: u32) {
        self.sector_neighbors_to_create = mask;
    }

    pub fn update_record(&self) -> &VecDeque<u16> {
        &self.update_record
    }

    pub(crate) fn voxels(&self) -> &[Block] {
        &self.voxels
    }

    /// Directly allocate a brick at `slot` with the given 512 blocks,
    /// bypassing dirty bookkeeping. Used only by the sector codec when
    /// decompressing into a freshly-allocated sector.
    pub(crate) fn load_brick(&mut self, slot: usize, blocks: &[Block; BLOCKS_IN_BRICK]) {
        debug_assert_eq!(self.brick_idx[slot], BRICKID_EMPTY, "double-allocation of brick slot {slot}");
        let compact = self.voxels.len() / BLOCKS_IN_BRICK;
        self.voxels.extend_from_slice(blocks);
        self.brick_idx[slot] = compact as i16;
    }

    pub(crate) fn set_sector_dirty_flags_raw(&mut self, flags: DirtyFlags) {
        self.sector_dirty_flags = flags;
    }

    pub(crate) fn set_brick_dirty_flags_raw(&mut self, slot: usize, flags: DirtyFlags) {
        self.brick_dirty_flags[slot] = flags;
    }

    pub(crate) fn set_brick_dirty_direction_mask_raw(&mut self, slot: usize, mask: u32) {
        self.brick_dirty_direction_mask[slot] = mask;
    }
}

/// Iterator returned by [`Sector::iterate_require_update_bricks`].
pub struct RequireUpdateIter<'a> {
    sector: &'a mut Sector,
    mask: DirtyFlags,
    clear: bool,
    cursor: usize,
}

impl<'a> Iterator for RequireUpdateIter<'a> {
    type Item = (usize, IVec3);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < BRICKS_IN_SECTOR {
            let slot = self.cursor;
            self.cursor += 1;
            let flags = self.sector.brick_require_update_flags[slot];
            if flags.intersects(self.mask) {
                if self.clear {
                    self.sector.brick_require_update_flags[slot] = flags - self.mask;
                }
                return Some((slot, Sector::brick_pos_from_slot(slot)));
            }
        }
        None
    }
}

impl<'a> Drop for RequireUpdateIter<'a> {
    fn drop(&mut self) {
        if self.clear {
            self.sector.sector_require_update_flags = self
                .sector
                .brick_require_update_flags
                .iter()
                .fold(DirtyFlags::empty(), |acc, &f| acc | f);
        }
    }
}
