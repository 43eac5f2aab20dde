//! Entity store: a `.vxe` file listing every entity in a save, with its
//! transform, flags, and the sectors it owns.
//!
//! Same header-plus-index shape as [`crate::store::region`], scaled down
//! per-entity instead of per-sector, with the same "info with counts and
//! elapsed time" completion logging. `EntityFlags` gates which optional
//! blocks a record carries (physics, infinite-loader), the same way a
//! sector's RLE codec only writes the runs it needs -- a record only pays
//! for the optional data it actually has. The trailing sector-key list is
//! what lets [`EntityStore::load`] tell a caller which sectors to pull back
//! out of the region store for this entity; without it an infinite-world
//! region file (grouped by spatial cube, not by entity) gives no way to
//! tell which of its sectors belong to which entity.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use bitflags::bitflags;

use crate::entity::{EntityGuid, Transform};
use crate::error::{VoxelError, VoxelResult};
use crate::math::IVec3;
use crate::store::crc;

const MAGIC: u32 = 0x4E45_5856; // "VXEN" little-endian
const VERSION: u16 = 1;
const HEADER_LEN: usize = 64;
const INDEX_ENTRY_LEN: usize = 32;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityFlags: u8 {
        const HAS_PHYSICS = 1 << 0;
        const IS_INFINITE = 1 << 1;
        const IS_STATIC   = 1 << 2;
    }
}

/// One entity's persisted flags, transform, dirty flags, optional metadata
/// blocks, and the sector keys it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub guid: EntityGuid,
    pub flags: EntityFlags,
    pub transform: Transform,
    pub entity_dirty_flags: u16,
    /// Present iff `flags` has [`EntityFlags::HAS_PHYSICS`] set. Opaque to
    /// this store -- physics state shape is a consumer concern.
    pub physics: Option<Vec<u8>>,
    /// Present iff `flags` has [`EntityFlags::IS_INFINITE`] set.
    pub infinite_loader: Option<Vec<u8>>,
    pub sectors: Vec<IVec3>,
}

/// In-memory view of a `.vxe` file's entity listing.
pub struct EntityStore {
    entries: HashMap<EntityGuid, EntityRecord>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// # Panics
    /// Panics if `flags`' optional-block bits disagree with which of
    /// `physics`/`infinite_loader` are actually present.
    pub fn upsert(&mut self, record: EntityRecord) {
        assert_eq!(
            record.flags.contains(EntityFlags::HAS_PHYSICS),
            record.physics.is_some(),
            "HAS_PHYSICS flag must agree with physics block presence"
        );
        assert_eq!(
            record.flags.contains(EntityFlags::IS_INFINITE),
            record.infinite_loader.is_some(),
            "IS_INFINITE flag must agree with infinite-loader block presence"
        );
        self.entries.insert(record.guid, record);
    }

    pub fn get(&self, guid: EntityGuid) -> Option<&EntityRecord> {
        self.entries.get(&guid)
    }

    pub fn remove(&mut self, guid: EntityGuid) -> Option<EntityRecord> {
        self.entries.remove(&guid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entries.values()
    }

    pub fn save(&self, path: &Path) -> VoxelResult<()> {
        let start = Instant::now();
        let mut guids: Vec<EntityGuid> = self.entries.keys().copied().collect();
        guids.sort_by_key(|g| g.0);

        let mut index = Vec::with_capacity(guids.len());
        let mut data = Vec::new();
        for guid in &guids {
            let record = &self.entries[guid];
            let bytes = encode_record(record);
            let crc = crc::checksum(&bytes);
            index.push((*guid, data.len() as u64, bytes.len() as u32, crc));
            data.extend_from_slice(&bytes);
        }

        let mut out = Vec::with_capacity(HEADER_LEN + index.len() * INDEX_ENTRY_LEN + data.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // padding
        out.extend_from_slice(&(index.len() as u32).to_le_bytes());
        out.resize(HEADER_LEN, 0); // zero-filled reserved tail

        for (guid, offset, len, crc) in &index {
            out.extend_from_slice(&guid.0.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
        }
        out.extend_from_slice(&data);

        std::fs::write(path, out)?;
        tracing::info!(
            path = %path.display(),
            entities = index.len(),
            elapsed = ?start.elapsed(),
            "entity store: saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> VoxelResult<Self> {
        let start = Instant::now();
        let bytes = std::fs::read(path)?;
        let mut r = Reader { buf: &bytes, pos: 0 };

        let magic = r.read_u32()?;
        if magic != MAGIC {
            return Err(VoxelError::BadMagic { expected: MAGIC, found: magic });
        }
        let version = r.read_u16()?;
        if version > VERSION {
            return Err(VoxelError::UnsupportedVersion { found: version, max_supported: VERSION });
        }
        let _padding = r.read_u16()?;
        let entry_count = r.read_u32()? as usize;

        let mut entries = HashMap::with_capacity(entry_count);
        let mut ir = Reader { buf: &bytes, pos: HEADER_LEN };
        for _ in 0..entry_count {
            let guid = EntityGuid(ir.read_u128()?);
            let offset = ir.read_u64()? as usize;
            let length = ir.read_u32()? as usize;
            let expected_crc = ir.read_u32()?;

            let end = offset.checked_add(length).ok_or(VoxelError::DecoderInconsistency(
                "entity index entry offset+length overflows".into(),
            ))?;
            if end > bytes.len() {
                return Err(VoxelError::Truncated { needed: end, available: bytes.len() });
            }
            let payload = &bytes[offset..end];
            let computed_crc = crc::checksum(payload);
            if computed_crc != expected_crc {
                return Err(VoxelError::ChecksumMismatch { expected: expected_crc, computed: computed_crc });
            }
            let record = decode_record(payload)?;
            debug_assert_eq!(record.guid, guid, "entity record guid disagrees with its index entry");
            entries.insert(guid, record);
        }

        tracing::info!(
            path = %path.display(),
            entities = entries.len(),
            elapsed = ?start.elapsed(),
            "entity store: loaded"
        );
        Ok(Self { entries })
    }
}

fn encode_record(record: &EntityRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&record.guid.0.to_le_bytes());
    out.push(record.flags.bits());
    for v in record.transform.position {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for v in record.transform.orientation {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&record.entity_dirty_flags.to_le_bytes());

    if record.flags.contains(EntityFlags::HAS_PHYSICS) {
        let data = record.physics.as_deref().unwrap_or(&[]);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    if record.flags.contains(EntityFlags::IS_INFINITE) {
        let data = record.infinite_loader.as_deref().unwrap_or(&[]);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    out.extend_from_slice(&(record.sectors.len() as u32).to_le_bytes());
    for s in &record.sectors {
        out.extend_from_slice(&s.x.to_le_bytes());
        out.extend_from_slice(&s.y.to_le_bytes());
        out.extend_from_slice(&s.z.to_le_bytes());
    }
    out
}

fn decode_record(buf: &[u8]) -> VoxelResult<EntityRecord> {
    let mut r = Reader { buf, pos: 0 };

    let guid = EntityGuid(r.read_u128()?);
    let flags = EntityFlags::from_bits_truncate(r.read_u8()?);

    let mut position = [0.0f32; 3];
    for v in position.iter_mut() {
        *v = r.read_f32()?;
    }
    let mut orientation = [0.0f32; 4];
    for v in orientation.iter_mut() {
        *v = r.read_f32()?;
    }
    let entity_dirty_flags = r.read_u16()?;

    let physics = if flags.contains(EntityFlags::HAS_PHYSICS) {
        let len = r.read_u32()? as usize;
        Some(r.read_bytes(len)?.to_vec())
    } else {
        None
    };
    let infinite_loader = if flags.contains(EntityFlags::IS_INFINITE) {
        let len = r.read_u32()? as usize;
        Some(r.read_bytes(len)?.to_vec())
    } else {
        None
    };

    let sector_count = r.read_u32()? as usize;
    let mut sectors = Vec::with_capacity(sector_count);
    for _ in 0..sector_count {
        let x = r.read_i32()?;
        let y = r.read_i32()?;
        let z = r.read_i32()?;
        sectors.push(IVec3::new(x, y, z));
    }

    Ok(EntityRecord {
        guid,
        flags,
        transform: Transform { position, orientation },
        entity_dirty_flags,
        physics,
        infinite_loader,
        sectors,
    })
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

    fn read_bytes(&mut self, n: usize) -> VoxelResult<&'a [u8]> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }

    fn read_u8(&mut self) -> VoxelResult<u8> {
        let b = self.read_bytes(1)?;
        Ok(b[0])
    }

    fn read_u16(&mut self) -> VoxelResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> VoxelResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_i32(&mut self) -> VoxelResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> VoxelResult<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_u128(&mut self) -> VoxelResult<u128> {
        let b = self.read_bytes(16)?;
        Ok(u128::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_f32(&mut self) -> VoxelResult<f32> {
        let b = self.read_bytes(4)?;
        Ok(f32::from_le_bytes(b.try_into().unwrap()))
    }
}
