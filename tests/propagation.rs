//! Cross-sector dirty-flag propagation across a real multi-sector chain.

use voxel_core::entity::{EntityGuid, VoxelEntity};
use voxel_core::propagation::propagate;
use voxel_core::sector::Sector;
use voxel_core::{Block, DirtyFlags, IVec3};

#[test]
fn write_at_shared_face_reaches_both_neighbors_but_not_the_far_sector() {
    let mut entity = VoxelEntity::new(EntityGuid(1));
    // Three sectors in a row along X: -1, 0, 1.
    entity.add_sector_at(IVec3::new(-1, 0, 0), Sector::new());
    entity.add_sector_at(IVec3::new(0, 0, 0), Sector::new());
    entity.add_sector_at(IVec3::new(1, 0, 0), Sector::new());

    // Write at x=0 (local), the face shared with sector (-1,0,0).
    entity.set_block(IVec3::new(0, 10, 10), Block::from_id_meta(1, 0), None);

    let keys: Vec<_> = entity.sector_keys().collect();
    propagate(&mut entity, &keys, DirtyFlags::BLOCK_MODIFIED);

    let center = entity.sector(IVec3::new(0, 0, 0)).unwrap();
    let origin_slot = Sector::to_brick_idx(0, 1, 1);
    assert!(center.brick_require_update_flags(origin_slot).contains(DirtyFlags::BLOCK_MODIFIED));

    let left = entity.sector(IVec3::new(-1, 0, 0)).unwrap();
    let left_slot = Sector::to_brick_idx(15, 1, 1);
    assert!(left.brick_require_update_flags(left_slot).contains(DirtyFlags::BLOCK_MODIFIED));

    // Sector (1,0,0) never bordered the dirty brick -- must stay untouched.
    let right = entity.sector(IVec3::new(1, 0, 0)).unwrap();
    for slot in 0..voxel_core::sector::BRICKS_IN_SECTOR {
        assert!(right.brick_require_update_flags(slot).is_empty());
    }
}

#[test]
fn interior_write_does_not_propagate_across_sector_boundary() {
    let mut entity = VoxelEntity::new(EntityGuid(2));
    entity.add_sector_at(IVec3::new(0, 0, 0), Sector::new());
    entity.add_sector_at(IVec3::new(1, 0, 0), Sector::new());

    // Deep interior of sector (0,0,0), far from any face.
    entity.set_block(IVec3::new(64, 64, 64), Block::from_id_meta(1, 0), None);

    let keys: Vec<_> = entity.sector_keys().collect();
    propagate(&mut entity, &keys, DirtyFlags::BLOCK_MODIFIED);

    let neighbor = entity.sector(IVec3::new(1, 0, 0)).unwrap();
    for slot in 0..voxel_core::sector::BRICKS_IN_SECTOR {
        assert!(neighbor.brick_require_update_flags(slot).is_empty());
    }
}

#[test]
fn propagation_is_a_no_op_when_nothing_is_dirty() {
    let mut entity = VoxelEntity::new(EntityGuid(3));
    entity.add_sector_at(IVec3::new(0, 0, 0), Sector::new());
    let keys: Vec<_> = entity.sector_keys().collect();
    propagate(&mut entity, &keys, DirtyFlags::BLOCK_MODIFIED);

    let sector = entity.sector(IVec3::new(0, 0, 0)).unwrap();
    assert!(sector.sector_require_update_flags().is_empty());
}
