//! Sparse-voxel world storage core: sectors of bricks of blocks, cross-
//! sector dirty-flag propagation, a per-tick hook pipeline, and on-disk
//! persistence.
//!
//! Layered bottom-up:
//! - [`block`] / [`sector`] / [`entity`] -- storage.
//! - [`propagation`] -- cross-sector dirty-flag propagation.
//! - [`pipeline`] -- the per-tick hook schedule.
//! - [`codec`] / [`store`] -- on-disk encoding and the region/entity
//!   stores.

pub mod block;
pub mod codec;
pub mod dirty_flags;
pub mod entity;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod propagation;
pub mod sector;
pub mod store;

pub use block::Block;
pub use dirty_flags::DirtyFlags;
pub use entity::{EntityGuid, NeighborHandles, SectorId, SectorKey, Transform, VoxelEntity};
pub use error::{VoxelError, VoxelResult};
pub use math::IVec3;
pub use sector::Sector;
pub use sector::direction::DIRECTION_COUNT;
