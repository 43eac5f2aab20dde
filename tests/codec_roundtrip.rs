//! Integration-level codec coverage: brick RLE edge cases and a fully
//! populated sector round trip.

use voxel_core::codec::rle::{decode_brick, encode_brick};
use voxel_core::codec::sector_codec::{decode_sector, encode_sector};
use voxel_core::sector::{BLOCKS_IN_BRICK, SIZE_IN_BLOCKS, Sector};
use voxel_core::{Block, IVec3};

#[test]
fn fully_alternating_brick_has_one_run_per_block() {
    let mut blocks = [Block::EMPTY; BLOCKS_IN_BRICK];
    for (i, b) in blocks.iter_mut().enumerate() {
        *b = Block::from_id_meta(i as u16, 0);
    }
    let encoded = encode_brick(&blocks);
    let run_count = u16::from_le_bytes([encoded[0], encoded[1]]) as usize;
    assert_eq!(run_count, BLOCKS_IN_BRICK);

    let (decoded, consumed) = decode_brick(&encoded).unwrap();
    assert_eq!(decoded, blocks);
    assert_eq!(consumed, encoded.len());
}

#[test]
fn fully_populated_sector_round_trips_every_block() {
    let mut sector = Sector::new();
    for x in 0..SIZE_IN_BLOCKS * 2 {
        for y in 0..SIZE_IN_BLOCKS * 2 {
            for z in 0..SIZE_IN_BLOCKS * 2 {
                let id = (x * 37 + y * 13 + z) as u16 % 251 + 1; // never 0/empty
                sector.set_block(x, y, z, Block::from_id_meta(id, 0), None);
            }
        }
    }

    let encoded = encode_sector(IVec3::new(3, -1, 7), &sector);
    let (position, decoded) = decode_sector(&encoded).unwrap();
    assert_eq!(position, IVec3::new(3, -1, 7));

    for x in 0..SIZE_IN_BLOCKS * 2 {
        for y in 0..SIZE_IN_BLOCKS * 2 {
            for z in 0..SIZE_IN_BLOCKS * 2 {
                assert_eq!(decoded.get_block(x, y, z), sector.get_block(x, y, z));
            }
        }
    }
    assert_eq!(decoded.non_empty_brick_count(), sector.non_empty_brick_count());
}

#[test]
fn sparse_sector_with_one_block_encodes_compactly() {
    let mut sector = Sector::new();
    sector.set_block(0, 0, 0, Block::from_id_meta(1, 0), None);
    let encoded = encode_sector(IVec3::new(0, 0, 0), &sector);
    // One non-empty brick at most a few hundred bytes, nowhere near a
    // dense per-block encoding of the whole 128^3 volume.
    assert!(encoded.len() < 2_000);
}
