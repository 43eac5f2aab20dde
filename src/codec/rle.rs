//! Brick-level run-length encoding.
//!
//! Wire format: `u16` run count, followed by all `R` run values (`u32`,
//! block `data`) contiguous, followed by all `R` run lengths (`u8`,
//! stored as `length - 1`) contiguous -- struct-of-arrays, not interleaved
//! pairs. A run never exceeds [`MAX_RUN_LENGTH`] blocks -- longer runs
//! split into several entries -- so `length_minus_1` always fits in a `u8`
//! (0..=255 meaning length 1..=256). Compacts the common case (large
//! uniform regions) while staying exact on the rare one.

use crate::block::Block;
use crate::error::{VoxelError, VoxelResult};
use crate::sector::BLOCKS_IN_BRICK;

/// Longest run a single entry can encode.
pub const MAX_RUN_LENGTH: usize = 256;

/// Encode one brick's 512 blocks as a sequence of runs.
pub fn encode_brick(blocks: &[Block; BLOCKS_IN_BRICK]) -> Vec<u8> {
    let mut runs: Vec<(u32, usize)> = Vec::new();
    let mut i = 0;
    while i < blocks.len() {
        let value = blocks[i].data;
        let mut len = 1;
        while i + len < blocks.len() && blocks[i + len].data == value && len < MAX_RUN_LENGTH {
            len += 1;
        }
        runs.push((value, len));
        i += len;
    }

    let mut out = Vec::with_capacity(2 + runs.len() * 5);
    out.extend_from_slice(&(runs.len() as u16).to_le_bytes());
    for &(value, _) in &runs {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for &(_, len) in &runs {
        out.push((len - 1) as u8);
    }
    out
}

/// Decode a brick previously written by [`encode_brick`] from the front of
/// `buf`, returning the 512 blocks and the number of bytes consumed.
pub fn decode_brick(buf: &[u8]) -> VoxelResult<([Block; BLOCKS_IN_BRICK], usize)> {
    let mut pos = 0;
    let run_count = read_u16(buf, &mut pos)? as usize;

    let mut values = Vec::with_capacity(run_count);
    for _ in 0..run_count {
        values.push(read_u32(buf, &mut pos)?);
    }
    let mut lengths = Vec::with_capacity(run_count);
    for _ in 0..run_count {
        lengths.push(read_u8(buf, &mut pos)? as usize + 1);
    }

    let mut blocks = [Block::EMPTY; BLOCKS_IN_BRICK];
    let mut written = 0usize;

    for (value, len) in values.into_iter().zip(lengths) {
        if written + len > BLOCKS_IN_BRICK {
            return Err(VoxelError::DecoderInconsistency(format!(
                "brick RLE run overruns brick: {written} + {len} > {BLOCKS_IN_BRICK}"
            )));
        }
        let block = Block::new(value);
        blocks[written..written + len].fill(block);
        written += len;
    }

    if written != BLOCKS_IN_BRICK {
        return Err(VoxelError::DecoderInconsistency(format!(
            "brick RLE runs cover {written} blocks, expected {BLOCKS_IN_BRICK}"
        )));
    }

    Ok((blocks, pos))
}

fn read_u8(buf: &[u8], pos: &mut usize) -> VoxelResult<u8> {
    need(buf, *pos, 1)?;
    let v = buf[*pos];
    *pos += 1;
    Ok(v)
}

fn read_u16(buf: &[u8], pos: &mut usize) -> VoxelResult<u16> {
    need(buf, *pos, 2)?;
    let v = u16::from_le_bytes(buf[*pos..*pos + 2].try_into().unwrap());
    *pos += 2;
    Ok(v)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> VoxelResult<u32> {
    need(buf, *pos, 4)?;
    let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

fn need(buf: &[u8], pos: usize, n: usize) -> VoxelResult<()> {
    let available = buf.len().saturating_sub(pos);
    if available < n {
        return Err(VoxelError::Truncated { needed: n, available });
    }
    Ok(())
}
