//! Superblock slot encoding
//!
//! The descriptor is serialized with bincode using fixed-width big-endian
//! integers, then framed with a length and CRC32 and zero padded to the slot.

use bincode::Options;
use bytes::{Buf, BufMut};

use crate::error::{DiskError, Result};
use crate::format::SUPERBLOCK_SIZE;

use super::Super;

/// Len (4) + CRC (4)
const FRAME_HEADER_SIZE: usize = 8;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .with_limit(SUPERBLOCK_SIZE - FRAME_HEADER_SIZE as u64)
}

/// Encode a descriptor into a full slot image
pub fn encode(s: &Super) -> Result<Vec<u8>> {
    let payload = options().serialize(s)?;
    if payload.len() + FRAME_HEADER_SIZE > SUPERBLOCK_SIZE as usize {
        return Err(DiskError::Size(format!(
            "encoded superblock is {} bytes, slot holds {}",
            payload.len(),
            SUPERBLOCK_SIZE
        )));
    }

    let mut slot = Vec::with_capacity(SUPERBLOCK_SIZE as usize);
    slot.put_u32(payload.len() as u32);
    slot.put_u32(crc32fast::hash(&payload));
    slot.extend_from_slice(&payload);
    slot.resize(SUPERBLOCK_SIZE as usize, 0);
    Ok(slot)
}

/// Decode a slot image; checks framing and CRC, not structure
pub fn decode(slot: &[u8]) -> Result<Super> {
    if slot.len() < FRAME_HEADER_SIZE {
        return Err(DiskError::Format("superblock slot truncated".into()));
    }

    let mut header = &slot[..FRAME_HEADER_SIZE];
    let len = header.get_u32() as usize;
    let crc = header.get_u32();

    if len == 0 || FRAME_HEADER_SIZE + len > slot.len() {
        return Err(DiskError::Format(format!("bad superblock length {}", len)));
    }

    let payload = &slot[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len];
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(DiskError::Format(format!(
            "superblock checksum mismatch: stored {:#010x}, computed {:#010x}",
            crc, actual
        )));
    }

    options()
        .deserialize(payload)
        .map_err(|e| DiskError::Format(format!("undecodable superblock: {}", e)))
}
