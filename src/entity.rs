//! Sparse sector map + sector-neighborhood index; the primary block
//! read/write API.
//!
//! A sparse map from spatial key to owned sector, with `get_block`/
//! `set_block` routing through integer division into sector key + local
//! position. All sector-map and neighbor-handle mutation happens on a
//! single owning thread, so a plain `HashMap` is enough -- no need for
//! concurrent-map machinery. Each sector carries a `NeighborHandles` table
//! of weak, non-owning references to its up-to-26 neighbors, kept
//! symmetric on add/remove, built around `slotmap::SlotMap`'s
//! generation-checked keys so a stale handle just resolves to `None`
//! instead of dangling.

use slotmap::{SlotMap, new_key_type};
use std::collections::{HashMap, HashSet};

use crate::block::Block;
use crate::dirty_flags::DirtyFlags;
use crate::math::{IVec3, floor_div, floor_mod};
use crate::sector::direction::{self, DIRECTION_COUNT, DIRECTIONS};
use crate::sector::{SECTOR_SIZE_IN_BLOCKS, Sector};

new_key_type! {
    /// Generation-checked handle into an entity's sector pool. Doubles as
    /// the "weak, non-owning reference" the design notes (§9) ask for: once
    /// a `SectorId`'s sector is removed from the pool, the key's generation
    /// no longer matches and every further `pool.get(id)` resolves to
    /// `None`, with no explicit invalidation pass required.
    pub struct SectorId;
}

/// Sector-grid coordinates (one unit = one 128^3 sector).
pub type SectorKey = IVec3;

/// Per-sector table of the 26 neighbor slots, each either empty or a weak
/// reference to the neighbor sector one step away in that direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborHandles([Option<SectorId>; DIRECTION_COUNT]);

impl NeighborHandles {
    pub fn get(&self, direction: usize) -> Option<SectorId> {
        self.0[direction]
    }

    fn set(&mut self, direction: usize, id: Option<SectorId>) {
        self.0[direction] = id;
    }
}

/// Rigid transform: position + unit quaternion orientation (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self { position: [0.0; 3], orientation: [0.0, 0.0, 0.0, 1.0] }
    }
}

/// Stable 128-bit entity identifier (persistence key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityGuid(pub u128);

/// Sparse sector map, neighbor index, and rigid transform for one entity.
pub struct VoxelEntity {
    guid: EntityGuid,
    transform: Transform,
    /// Cached copy synced to/from `transform` via
    /// [`sync_transform_to_data`](Self::sync_transform_to_data) /
    /// [`sync_transform_from_data`](Self::sync_transform_from_data) -- a
    /// bridge between the authoritative live transform and whatever
    /// snapshot an external (de)serialized "data" struct holds.
    transform_data: Transform,
    entity_dirty_flags: u16,
    pool: SlotMap<SectorId, Sector>,
    sectors: HashMap<SectorKey, SectorId>,
    neighbor_handles: HashMap<SectorKey, NeighborHandles>,
    dirty_sectors: HashSet<SectorKey>,
}

impl VoxelEntity {
    pub fn new(guid: EntityGuid) -> Self {
        Self {
            guid,
            transform: Transform::default(),
            transform_data: Transform::default(),
            entity_dirty_flags: 0,
            pool: SlotMap::with_key(),
            sectors: HashMap::new(),
            neighbor_handles: HashMap::new(),
            dirty_sectors: HashSet::new(),
        }
    }

    pub fn guid(&self) -> EntityGuid {
        self.guid
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn sync_transform_to_data(&mut self) {
        self.transform_data = self.transform;
    }

    pub fn sync_transform_from_data(&mut self) {
        self.transform = self.transform_data;
    }

    pub fn entity_dirty_flags(&self) -> u16 {
        self.entity_dirty_flags
    }

    pub fn set_entity_dirty_flags(&mut self, flags: u16) {
        self.entity_dirty_flags = flags;
    }

    // ── Sector ownership ─────────────────────────────────────────────────

    /// Sector-grid key owning the absolute block position `pos`.
    pub fn key_for(pos: IVec3) -> SectorKey {
        let size = SECTOR_SIZE_IN_BLOCKS as i32;
        IVec3::new(floor_div(pos.x, size), floor_div(pos.y, size), floor_div(pos.z, size))
    }

    fn local_pos(pos: IVec3) -> IVec3 {
        let size = SECTOR_SIZE_IN_BLOCKS as i32;
        IVec3::new(floor_mod(pos.x, size), floor_mod(pos.y, size), floor_mod(pos.z, size))
    }

    pub fn sector(&self, key: SectorKey) -> Option<&Sector> {
        self.sectors.get(&key).and_then(|&id| self.pool.get(id))
    }

    pub fn sector_mut(&mut self, key: SectorKey) -> Option<&mut Sector> {
        let id = *self.sectors.get(&key)?;
        self.pool.get_mut(id)
    }

    pub fn has_sector(&self, key: SectorKey) -> bool {
        self.sectors.contains_key(&key)
    }

    pub fn sectors(&self) -> impl Iterator<Item = (SectorKey, &Sector)> {
        self.sectors
            .iter()
            .filter_map(move |(&key, &id)| self.pool.get(id).map(|s| (key, s)))
    }

    pub fn sector_keys(&self) -> impl Iterator<Item = SectorKey> + '_ {
        self.sectors.keys().copied()
    }

    /// Every owned sector, in pool order, independent of spatial key --
    /// for passes like end-of-tick that touch all of them uniformly.
    pub fn sectors_mut(&mut self) -> impl Iterator<Item = &mut Sector> {
        self.pool.values_mut()
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Resolve a sector's 26 neighbor references into borrowed sectors, for
    /// building a [`crate::sector::neighborhood::NeighborhoodReader`].
    pub fn resolve_neighbors(&self, key: SectorKey) -> [Option<&Sector>; DIRECTION_COUNT] {
        let mut out: [Option<&Sector>; DIRECTION_COUNT] = [None; DIRECTION_COUNT];
        if let Some(handles) = self.neighbor_handles.get(&key) {
            for d in 0..DIRECTION_COUNT {
                if let Some(id) = handles.get(d) {
                    out[d] = self.pool.get(id);
                }
            }
        }
        out
    }

    pub fn neighbor_handles(&self, key: SectorKey) -> NeighborHandles {
        self.neighbor_handles.get(&key).copied().unwrap_or_default()
    }

    /// Insert an owned sector at `key`, wiring up symmetric neighbor links
    /// with every already-present sector one step away: if `a`'s slot `d`
    /// refers to `b`, `b`'s slot `opposite(d)` refers to `a`.
    pub fn add_sector_at(&mut self, key: SectorKey, sector: Sector) -> SectorId {
        let id = self.pool.insert(sector);
        self.sectors.insert(key, id);
        self.neighbor_handles.entry(key).or_default();

        for d in 0..DIRECTION_COUNT {
            let (dx, dy, dz) = DIRECTIONS[d];
            let neighbor_key = key.add(IVec3::new(dx as i32, dy as i32, dz as i32));
            if let Some(&neighbor_id) = self.sectors.get(&neighbor_key) {
                self.neighbor_handles.entry(key).or_default().set(d, Some(neighbor_id));
                let opp = direction::opposite(d);
                self.neighbor_handles.entry(neighbor_key).or_default().set(opp, Some(id));
            }
        }

        id
    }

    /// Remove and drop the sector at `key`, clearing every neighbor's
    /// reference back to it first.
    pub fn remove_sector_at(&mut self, key: SectorKey) -> Option<Sector> {
        let id = self.sectors.remove(&key)?;
        self.dirty_sectors.remove(&key);

        if let Some(handles) = self.neighbor_handles.remove(&key) {
            for d in 0..DIRECTION_COUNT {
                if handles.get(d).is_some() {
                    let (dx, dy, dz) = DIRECTIONS[d];
                    let neighbor_key = key.add(IVec3::new(dx as i32, dy as i32, dz as i32));
                    if let Some(nh) = self.neighbor_handles.get_mut(&neighbor_key) {
                        nh.set(direction::opposite(d), None);
                    }
                }
            }
        }

        self.pool.remove(id)
    }

    // ── Block access ─────────────────────────────────────────────────────

    pub fn get_block(&self, pos: IVec3) -> Block {
        let key = Self::key_for(pos);
        match self.sector(key) {
            Some(sector) => {
                let local = Self::local_pos(pos);
                sector.get_block(local.x as usize, local.y as usize, local.z as usize)
            }
            None => Block::EMPTY,
        }
    }

    /// Write a block at an absolute position, creating the owning sector
    /// (and wiring its neighbor links) if it doesn't exist yet and the
    /// write is non-empty.
    pub fn set_block(&mut self, pos: IVec3, block: Block, flags: Option<DirtyFlags>) {
        let key = Self::key_for(pos);
        if !self.has_sector(key) {
            if block.is_empty() {
                return;
            }
            self.add_sector_at(key, Sector::new());
        }

        let local = Self::local_pos(pos);
        let became_dirty = {
            let sector = match self.sector_mut(key) {
                Some(s) => s,
                None => return,
            };
            let was_dirty = !sector.sector_dirty_flags().is_empty();
            sector.set_block(local.x as usize, local.y as usize, local.z as usize, block, flags);
            !was_dirty && !sector.sector_dirty_flags().is_empty()
        };
        if became_dirty {
            self.dirty_sectors.insert(key);
        }
    }

    // ── Incremental-save bookkeeping ─────────────────────────────────────

    /// Drain the set of sectors that became dirty since the last drain, so
    /// an incremental save can skip everything untouched.
    pub fn take_dirty_sectors(&mut self) -> Vec<SectorKey> {
        self.dirty_sectors.drain().collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_sectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip_across_sector_boundary() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        let pos = IVec3::new(200, -5, 300);
        let b = Block::from_id_meta(7, 0);
        e.set_block(pos, b, None);
        assert_eq!(e.get_block(pos), b);
        assert!(e.sector_count() >= 1);
    }

    #[test]
    fn empty_write_to_absent_sector_creates_nothing() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_block(IVec3::new(0, 0, 0), Block::EMPTY, None);
        assert_eq!(e.sector_count(), 0);
    }

    #[test]
    fn neighbor_links_are_symmetric() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.add_sector_at(IVec3::new(0, 0, 0), Sector::new());
        e.add_sector_at(IVec3::new(1, 0, 0), Sector::new());

        let plus_x = direction::index_of(1, 0, 0).unwrap();
        let minus_x = direction::index_of(-1, 0, 0).unwrap();

        let h0 = e.neighbor_handles(IVec3::new(0, 0, 0));
        let h1 = e.neighbor_handles(IVec3::new(1, 0, 0));
        assert!(h0.get(plus_x).is_some());
        assert!(h1.get(minus_x).is_some());
        assert_eq!(h0.get(plus_x), e.sectors.get(&IVec3::new(1, 0, 0)).copied());
    }

    #[test]
    fn removing_a_sector_clears_neighbor_back_references() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.add_sector_at(IVec3::new(0, 0, 0), Sector::new());
        e.add_sector_at(IVec3::new(1, 0, 0), Sector::new());
        e.remove_sector_at(IVec3::new(1, 0, 0));

        let minus_x_from_0 = direction::index_of(1, 0, 0).unwrap();
        let h0 = e.neighbor_handles(IVec3::new(0, 0, 0));
        assert!(h0.get(minus_x_from_0).is_none());
    }

    #[test]
    fn dirty_tracking_matches_incremental_save_pattern() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_block(IVec3::new(0, 0, 0), Block::from_id_meta(1, 0), None);
        e.set_block(IVec3::new(200, 0, 0), Block::from_id_meta(2, 0), None);
        assert_eq!(e.dirty_count(), 2);

        let drained = e.take_dirty_sectors();
        assert_eq!(drained.len(), 2);
        assert_eq!(e.dirty_count(), 0);

        // A second write to an already-dirty sector this "tick" doesn't
        // double count (it's a set, not a counter) -- but a write after a
        // drain dirties it again.
        e.set_block(IVec3::new(0, 0, 0), Block::from_id_meta(3, 0), None);
        assert_eq!(e.dirty_count(), 1);
    }

    #[test]
    fn transform_sync_bridges_authoritative_and_cached() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_transform(Transform { position: [1.0, 2.0, 3.0], orientation: [0.0, 0.0, 0.0, 1.0] });
        e.sync_transform_to_data();
        e.set_transform(Transform::default());
        e.sync_transform_from_data();
        assert_eq!(e.transform().position, [1.0, 2.0, 3.0]);
    }
}
