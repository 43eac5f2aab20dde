//! Cross-sector dirty-flag propagation.
//!
//! Snapshot-scatter-gather, in two phases: a `rayon` parallel phase computes
//! each sector's result from read-only borrows of itself and its neighbors,
//! then a sequential phase writes the results back. The read phase never
//! needs two threads to hold a live `&mut` into the same backing store at
//! once, so there's no aliasing to reason about -- the parallel closures
//! only ever take shared references into the sector pool.

use rayon::prelude::*;

use crate::dirty_flags::DirtyFlags;
use crate::entity::{SectorKey, VoxelEntity};
use crate::math::IVec3;
use crate::sector::direction::{self, DIRECTION_COUNT, DIRECTIONS};
use crate::sector::neighborhood::NeighborhoodReader;
use crate::sector::{BRICKS_IN_SECTOR, Sector};

/// Propagate dirty flags matching `mask` from every sector in `keys` (and
/// their neighbors) into `require_update_flags`, one step of reach.
///
/// Per sector:
/// 1. Early-exit if neither the sector itself nor any present neighbor has
///    any bit of `mask` set in `sector_dirty_flags` -- nothing to compute.
/// 2. For each brick, accumulate its own masked dirty flags plus, for every
///    one of the 26 neighbor bricks, that neighbor's masked dirty flags --
///    but only if the neighbor brick's `brick_dirty_direction_mask` has the
///    bit pointing back at this brick set (i.e. the change that dirtied the
///    neighbor brick actually touched the shared face/edge/corner).
/// 3. OR the accumulated flags into `brick_require_update_flags`.
pub fn propagate(entity: &mut VoxelEntity, keys: &[SectorKey], mask: DirtyFlags) {
    // Phase 1: parallel, read-only.
    let results: Vec<(SectorKey, Vec<(usize, DirtyFlags)>)> = keys
        .par_iter()
        .filter_map(|&key| compute_sector_deltas(entity, key, mask).map(|deltas| (key, deltas)))
        .collect();

    // Phase 2: sequential write-back.
    for (key, deltas) in results {
        if deltas.is_empty() {
            continue;
        }
        if let Some(sector) = entity.sector_mut(key) {
            for (slot, flags) in deltas {
                sector.set_brick_require_update_flags(slot, flags);
            }
        }
    }
}

fn compute_sector_deltas(
    entity: &VoxelEntity,
    key: SectorKey,
    mask: DirtyFlags,
) -> Option<Vec<(usize, DirtyFlags)>> {
    let center = entity.sector(key)?;
    let neighbors = entity.resolve_neighbors(key);

    let any_neighbor_dirty = neighbors
        .iter()
        .flatten()
        .any(|s| s.sector_dirty_flags().intersects(mask));
    if !center.sector_dirty_flags().intersects(mask) && !any_neighbor_dirty {
        return Some(Vec::new());
    }

    let reader = NeighborhoodReader::new(center, neighbors);
    let mut deltas = Vec::new();

    for slot in 0..BRICKS_IN_SECTOR {
        let mut acc = center.brick_dirty_flags(slot) & mask;
        let brick_pos = Sector::brick_pos_from_slot(slot);

        for d in 0..DIRECTION_COUNT {
            let (dx, dy, dz) = DIRECTIONS[d];
            let npos = brick_pos.add(IVec3::new(dx as i32, dy as i32, dz as i32));

            let neighbor_flags = reader.get_brick_dirty_flags(npos.x, npos.y, npos.z) & mask;
            if neighbor_flags.is_empty() {
                continue;
            }
            let neighbor_mask = reader.get_brick_dirty_direction_mask(npos.x, npos.y, npos.z);
            let back_bit = 1u32 << direction::opposite(d);
            if neighbor_mask & back_bit != 0 {
                acc |= neighbor_flags;
            }
        }

        if !acc.is_empty() {
            deltas.push((slot, acc));
        }
    }

    Some(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::entity::EntityGuid;

    #[test]
    fn isolated_sector_propagates_only_its_own_dirty_bricks() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_block(IVec3::new(5, 5, 5), Block::from_id_meta(1, 0), None);
        let key = VoxelEntity::key_for(IVec3::new(5, 5, 5));

        propagate(&mut e, &[key], DirtyFlags::BLOCK_MODIFIED);

        let sector = e.sector(key).unwrap();
        let slot = Sector::to_brick_idx(0, 0, 0);
        assert!(sector.brick_require_update_flags(slot).contains(DirtyFlags::BLOCK_MODIFIED));
    }

    #[test]
    fn boundary_write_propagates_into_neighbor_sector() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        // x=127 is the last block of sector (0,0,0), touching +X face.
        e.set_block(IVec3::new(127, 5, 5), Block::from_id_meta(9, 0), None);
        e.add_sector_at(IVec3::new(1, 0, 0), crate::sector::Sector::new());

        let keys = [IVec3::new(0, 0, 0), IVec3::new(1, 0, 0)];
        propagate(&mut e, &keys, DirtyFlags::BLOCK_MODIFIED);

        let neighbor = e.sector(IVec3::new(1, 0, 0)).unwrap();
        let slot = Sector::to_brick_idx(0, 0, 0);
        assert!(neighbor.brick_require_update_flags(slot).contains(DirtyFlags::BLOCK_MODIFIED));
    }

    #[test]
    fn non_adjacent_brick_is_untouched() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_block(IVec3::new(5, 5, 5), Block::from_id_meta(1, 0), None);
        let key = VoxelEntity::key_for(IVec3::new(5, 5, 5));

        propagate(&mut e, &[key], DirtyFlags::BLOCK_MODIFIED);

        let sector = e.sector(key).unwrap();
        let far_slot = Sector::to_brick_idx(15, 15, 15);
        assert!(sector.brick_require_update_flags(far_slot).is_empty());
    }

    #[test]
    fn mask_filters_unrelated_flags() {
        let mut e = VoxelEntity::new(EntityGuid(1));
        e.set_block(IVec3::new(5, 5, 5), Block::from_id_meta(1, 0), Some(DirtyFlags::RESERVED1));
        let key = VoxelEntity::key_for(IVec3::new(5, 5, 5));

        propagate(&mut e, &[key], DirtyFlags::RESERVED2);

        let sector = e.sector(key).unwrap();
        let slot = Sector::to_brick_idx(0, 0, 0);
        assert!(sector.brick_require_update_flags(slot).is_empty());
    }
}
