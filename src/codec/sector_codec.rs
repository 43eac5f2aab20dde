//! Whole-[`Sector`] encode/decode: header + raw dirty-state arrays +
//! RLE-compressed non-empty bricks.
//!
//! Builds a compact on-disk form of one storage unit: skip/zero-fill what's
//! empty, round-trip exactly for everything else. Checks the buffer has
//! enough remaining bytes before every fixed-size read and before every
//! brick's RLE payload, rather than only bounds-checking at the very end --
//! a truncated file fails at the first missing byte with a precise
//! `Truncated { needed, available }`, not a panic or a garbage read past
//! the end of a shorter-than-expected buffer.
//!
//! Header layout (20 bytes): `int3 position` (the sector's own spatial
//! key, 12 bytes), `u16 non_empty_brick_count`, `u16 sector_dirty_flags`,
//! `u32 sector_neighbors_to_create`. No magic/version here -- those belong
//! to the region file that contains this payload, one level up.

use crate::block::Block;
use crate::codec::rle::{decode_brick, encode_brick};
use crate::dirty_flags::DirtyFlags;
use crate::error::{VoxelError, VoxelResult};
use crate::math::IVec3;
use crate::sector::{BLOCKS_IN_BRICK, BRICKS_IN_SECTOR, Sector};

pub fn encode_sector(position: IVec3, sector: &Sector) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&position.x.to_le_bytes());
    out.extend_from_slice(&position.y.to_le_bytes());
    out.extend_from_slice(&position.z.to_le_bytes());
    out.extend_from_slice(&(sector.non_empty_brick_count() as u16).to_le_bytes());
    out.extend_from_slice(&sector.sector_dirty_flags().bits().to_le_bytes());
    out.extend_from_slice(&sector.sector_neighbors_to_create().to_le_bytes());

    for slot in 0..BRICKS_IN_SECTOR {
        out.extend_from_slice(&sector.brick_dirty_flags(slot).bits().to_le_bytes());
    }
    for slot in 0..BRICKS_IN_SECTOR {
        out.extend_from_slice(&sector.brick_dirty_direction_mask(slot).to_le_bytes());
    }

    for &slot in sector.non_empty_brick_list() {
        out.extend_from_slice(&slot.to_le_bytes());
        let compact = sector.brick_idx(slot as usize);
        debug_assert!(compact >= 0, "non_empty_brick_list entry {slot} has no allocated brick");
        let voxels = sector.voxels();
        let start = compact as usize * BLOCKS_IN_BRICK;
        let brick: &[Block; BLOCKS_IN_BRICK] =
            voxels[start..start + BLOCKS_IN_BRICK].try_into().unwrap();
        out.extend_from_slice(&encode_brick(brick));
    }

    out
}

pub fn decode_sector(buf: &[u8]) -> VoxelResult<(IVec3, Sector)> {
    let mut r = Reader { buf, pos: 0 };

    let x = r.read_i32()?;
    let y = r.read_i32()?;
    let z = r.read_i32()?;
    let position = IVec3::new(x, y, z);

    let non_empty_brick_count = r.read_u16()? as usize;
    let sector_dirty_flags = DirtyFlags::from_bits_truncate(r.read_u16()?);
    let sector_neighbors_to_create = r.read_u32()?;

    let mut brick_dirty_flags = [DirtyFlags::empty(); BRICKS_IN_SECTOR];
    for slot in brick_dirty_flags.iter_mut() {
        *slot = DirtyFlags::from_bits_truncate(r.read_u16()?);
    }
    let mut brick_dirty_direction_mask = [0u32; BRICKS_IN_SECTOR];
    for slot in brick_dirty_direction_mask.iter_mut() {
        *slot = r.read_u32()?;
    }

    let mut sector = Sector::new();
    for _ in 0..non_empty_brick_count {
        let slot = r.read_u16()? as usize;
        if slot >= BRICKS_IN_SECTOR {
            return Err(VoxelError::DecoderInconsistency(format!(
                "brick slot {slot} out of range (sector has {BRICKS_IN_SECTOR} slots)"
            )));
        }
        let (blocks, consumed) = decode_brick(r.rest())?;
        r.advance(consumed);
        sector.load_brick(slot, &blocks);
    }

    sector.update_non_empty_bricks();
    sector.set_sector_dirty_flags_raw(sector_dirty_flags);
    sector.set_sector_neighbors_to_create(sector_neighbors_to_create);
    for (slot, &flags) in brick_dirty_flags.iter().enumerate() {
        sector.set_brick_dirty_flags_raw(slot, flags);
    }
    for (slot, &mask) in brick_dirty_direction_mask.iter().enumerate() {
        sector.set_brick_dirty_direction_mask_raw(slot, mask);
    }

    Ok((position, sector))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> VoxelResult<()> {
        let available = self.buf.len().saturating_sub(self.pos);
        if available < n {
            return Err(VoxelError::Truncated { needed: n, available });
        }
        Ok(())
    }

    fn read_i32(&mut self) -> VoxelResult<i32> {
        self.need(4)?;
        let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn read_u16(&mut self) -> VoxelResult<u16> {
        self.need(2)?;
        let v = u16::from_le_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    fn read_u32(&mut self) -> VoxelResult<u32> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}
