//! Region store: a `.vxr` file holding one region's worth of encoded
//! sector payloads.
//!
//! Builds the whole file's bytes in memory and `fs::write`s it once: open,
//! mutate an in-memory table, flush. 56-byte header (magic, version,
//! region type, flags, region size, sector count, reserved), then
//! `sector_count` 28-byte index entries, then the concatenated payloads.
//!
//! Finite (bounded) worlds key a region purely by entity guid
//! ([`RegionKey::Finite`]) -- one file holds every sector the entity owns,
//! no spatial grouping needed. Infinite (unbounded) worlds still need
//! *some* file-size bound, so sectors are grouped into `region_size`-wide
//! cubes on the sector grid ([`RegionKey::Infinite`]).

use std::collections::HashMap;
use std::path::Path;

use crate::entity::SectorKey;
use crate::error::{VoxelError, VoxelResult};
use crate::math::{IVec3, floor_div};
use crate::store::crc;

const MAGIC: u32 = 0x4752_5856; // "VXRG" little-endian
const VERSION: u16 = 1;
const HEADER_LEN: usize = 56;
const INDEX_ENTRY_LEN: usize = 28;
const RESERVED_LEN: usize = 32;

/// Which `.vxr` file a sector's payload belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKey {
    /// One region file per `region_size`-wide cube of the sector grid.
    Infinite { x: i32, y: i32, z: i32 },
    /// One region file per entity, holding all of its sectors.
    Finite(u128),
}

impl RegionKey {
    pub fn file_name(&self) -> String {
        match self {
            RegionKey::Infinite { x, y, z } => format!("region_{x}_{y}_{z}.vxr"),
            RegionKey::Finite(guid) => format!("entity_{guid:032x}.vxr"),
        }
    }

    /// The header's `region_type` byte for a file keyed this way.
    pub fn region_type(&self) -> u8 {
        match self {
            RegionKey::Infinite { .. } => 0,
            RegionKey::Finite(_) => 1,
        }
    }
}

/// Sectors-per-axis grouping for [`RegionKey::Infinite`] path derivation.
#[derive(Debug, Clone, Copy)]
pub struct RegionStoreConfig {
    pub region_size: i32,
}

impl Default for RegionStoreConfig {
    fn default() -> Self {
        Self { region_size: 16 }
    }
}

impl RegionStoreConfig {
    pub fn region_key_for(&self, sector_key: SectorKey) -> RegionKey {
        RegionKey::Infinite {
            x: floor_div(sector_key.x, self.region_size),
            y: floor_div(sector_key.y, self.region_size),
            z: floor_div(sector_key.z, self.region_size),
        }
    }
}

struct SectorRecord {
    bytes: Vec<u8>,
    crc: u32,
}

/// Statistics returned by [`RegionStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactStats {
    pub sectors_kept: usize,
    pub bytes_reclaimed: usize,
}

/// In-memory view of one `.vxr` file's sector payloads.
pub struct RegionStore {
    entries: HashMap<SectorKey, SectorRecord>,
    region_type: u8,
    region_size: IVec3,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::new(0, IVec3::new(16, 16, 16))
    }
}

impl RegionStore {
    /// `region_type` is the header's 0=infinite/1=finite byte (see
    /// [`RegionKey::region_type`]); `region_size` is the sectors-per-axis
    /// cube size this file was grouped by (meaningless, but still written,
    /// for a finite/per-entity file).
    pub fn new(region_type: u8, region_size: IVec3) -> Self {
        Self { entries: HashMap::new(), region_type, region_size }
    }

    pub fn region_type(&self) -> u8 {
        self.region_type
    }

    pub fn region_size(&self) -> IVec3 {
        self.region_size
    }

    pub fn sector_count(&self) -> usize {
        self.entries.len()
    }

    /// Store (or overwrite) a sector's already-encoded payload.
    pub fn write_sector(&mut self, key: SectorKey, payload: Vec<u8>) {
        let crc = crc::checksum(&payload);
        tracing::info!(x = key.x, y = key.y, z = key.z, bytes = payload.len(), "region: wrote sector");
        self.entries.insert(key, SectorRecord { bytes: payload, crc });
    }

    /// Read a sector's payload, verifying its checksum. A checksum mismatch
    /// is logged and downgraded to `Ok(None)` (§4.7/§7: corrupt data reads
    /// as "not found", not as a fatal error).
    pub fn read_sector(&self, key: SectorKey) -> VoxelResult<Option<&[u8]>> {
        let Some(record) = self.entries.get(&key) else {
            return Ok(None);
        };
        let computed = crc::checksum(&record.bytes);
        if computed != record.crc {
            tracing::warn!(
                x = key.x, y = key.y, z = key.z,
                expected = record.crc, computed,
                "region: checksum mismatch, treating sector as missing"
            );
            return Ok(None);
        }
        Ok(Some(&record.bytes))
    }

    pub fn remove_sector(&mut self, key: SectorKey) -> Option<Vec<u8>> {
        self.entries.remove(&key).map(|r| r.bytes)
    }

    /// No-op by construction: the in-memory table never holds stale bytes
    /// from an overwritten sector (unlike an append-only on-disk log), so
    /// every [`save`](Self::save) already writes the minimal file. Kept so
    /// callers migrating from an append-only format have a stable place to
    /// call compaction.
    pub fn compact(&mut self) -> CompactStats {
        let stats = CompactStats { sectors_kept: self.entries.len(), bytes_reclaimed: 0 };
        tracing::debug!(
            sectors_kept = stats.sectors_kept,
            bytes_reclaimed = stats.bytes_reclaimed,
            "region: compact (no-op, table already minimal)"
        );
        stats
    }

    pub fn save(&self, path: &Path) -> VoxelResult<()> {
        let mut keys: Vec<SectorKey> = self.entries.keys().copied().collect();
        keys.sort_by_key(|k| (k.x, k.y, k.z));

        let mut index = Vec::with_capacity(keys.len());
        let mut data = Vec::new();
        for key in &keys {
            let record = &self.entries[key];
            index.push((*key, data.len() as u64, record.bytes.len() as u32, record.crc));
            data.extend_from_slice(&record.bytes);
        }

        let mut out = Vec::with_capacity(HEADER_LEN + index.len() * INDEX_ENTRY_LEN + data.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.push(self.region_type);
        out.push(0u8); // flags, reserved
        out.extend_from_slice(&self.region_size.x.to_le_bytes());
        out.extend_from_slice(&self.region_size.y.to_le_bytes());
        out.extend_from_slice(&self.region_size.z.to_le_bytes());
        out.extend_from_slice(&(index.len() as u32).to_le_bytes());
        out.resize(HEADER_LEN, 0); // zero-filled reserved tail

        for (key, offset, len, crc) in &index {
            out.extend_from_slice(&key.x.to_le_bytes());
            out.extend_from_slice(&key.y.to_le_bytes());
            out.extend_from_slice(&key.z.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
        }
        out.extend_from_slice(&data);

        std::fs::write(path, out)?;
        tracing::info!(path = %path.display(), sectors = index.len(), "region: saved");
        Ok(())
    }

    pub fn load(path: &Path) -> VoxelResult<Self> {
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
        let region_type = r.read_u8()?;
        let _flags = r.read_u8()?;
        let region_size = IVec3::new(r.read_i32()?, r.read_i32()?, r.read_i32()?);
        let entry_count = r.read_u32()? as usize;
        r.need(RESERVED_LEN)?;
        r.pos = HEADER_LEN;

        let mut entries = HashMap::with_capacity(entry_count);
        let mut ir = Reader { buf: &bytes, pos: HEADER_LEN };
        for _ in 0..entry_count {
            let x = ir.read_i32()?;
            let y = ir.read_i32()?;
            let z = ir.read_i32()?;
            let offset = ir.read_u64()? as usize;
            let length = ir.read_u32()? as usize;
            let crc = ir.read_u32()?;

            let end = offset.checked_add(length).ok_or(VoxelError::DecoderInconsistency(
                "region index entry offset+length overflows".into(),
            ))?;
            if end > bytes.len() {
                return Err(VoxelError::Truncated { needed: end, available: bytes.len() });
            }
            let payload = bytes[offset..end].to_vec();
            entries.insert(SectorKey::new(x, y, z), SectorRecord { bytes: payload, crc });
        }

        tracing::info!(path = %path.display(), sectors = entries.len(), "region: loaded");
        Ok(Self { entries, region_type, region_size })
    }
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

    fn read_u8(&mut self) -> VoxelResult<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
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

    fn read_i32(&mut self) -> VoxelResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> VoxelResult<u64> {
        self.need(8)?;
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("voxel_core_region_test_{name}_{}", std::process::id()))
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut store = RegionStore::default();
        let key = SectorKey::new(1, 2, 3);
        store.write_sector(key, vec![1, 2, 3, 4]);
        assert_eq!(store.read_sector(key).unwrap(), Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn missing_sector_reads_as_none() {
        let store = RegionStore::default();
        assert_eq!(store.read_sector(SectorKey::new(0, 0, 0)).unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips_to_disk() {
        let path = temp_path("roundtrip");
        let mut store = RegionStore::new(0, IVec3::new(16, 16, 16));
        store.write_sector(SectorKey::new(0, 0, 0), vec![9, 9, 9]);
        store.write_sector(SectorKey::new(-1, 2, 5), vec![1, 2, 3, 4, 5]);
        store.save(&path).unwrap();

        let loaded = RegionStore::load(&path).unwrap();
        assert_eq!(loaded.sector_count(), 2);
        assert_eq!(loaded.region_type(), 0);
        assert_eq!(loaded.region_size(), IVec3::new(16, 16, 16));
        assert_eq!(loaded.read_sector(SectorKey::new(0, 0, 0)).unwrap(), Some(&[9u8, 9, 9][..]));
        assert_eq!(
            loaded.read_sector(SectorKey::new(-1, 2, 5)).unwrap(),
            Some(&[1u8, 2, 3, 4, 5][..])
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn finite_region_header_round_trips() {
        let path = temp_path("finite");
        let store = RegionStore::new(1, IVec3::new(0, 0, 0));
        store.save(&path).unwrap();
        let loaded = RegionStore::load(&path).unwrap();
        assert_eq!(loaded.region_type(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupted_payload_reads_as_none_not_error() {
        let path = temp_path("corrupt");
        let mut store = RegionStore::default();
        store.write_sector(SectorKey::new(0, 0, 0), vec![1, 2, 3]);
        store.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let loaded = RegionStore::load(&path).unwrap();
        assert_eq!(loaded.read_sector(SectorKey::new(0, 0, 0)).unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn infinite_region_key_groups_by_region_size() {
        let cfg = RegionStoreConfig { region_size: 16 };
        let a = cfg.region_key_for(SectorKey::new(5, 5, 5));
        let b = cfg.region_key_for(SectorKey::new(20, 5, 5));
        assert_eq!(a, RegionKey::Infinite { x: 0, y: 0, z: 0 });
        assert_eq!(b, RegionKey::Infinite { x: 1, y: 0, z: 0 });
    }

    #[test]
    fn compact_is_a_no_op_that_reports_current_size() {
        let mut store = RegionStore::default();
        store.write_sector(SectorKey::new(0, 0, 0), vec![1]);
        let stats = store.compact();
        assert_eq!(stats.sectors_kept, 1);
        assert_eq!(stats.bytes_reclaimed, 0);
    }
}
