//! Arena Table
//!
//! Persistent map of the arenas forming the log: fill level and state of
//! each one.
//!
//! ## Region Format
//! ```text
//! ┌───────────┬───────────┬─────────┬─────────┐
//! │ Magic (4) │ Count (4) │ CRC (4) │ Pad (4) │
//! ├───────────┴───────────┴─────────┴─────────┤
//! │ Entry 0..count (64 bytes each)            │
//! │   wrp u64 | state u8 | sealed_at i64 |    │
//! │   allocations u32 | zero pad              │
//! └───────────────────────────────────────────┘
//! ```

use bytes::{Buf, BufMut};

use crate::device::BlockDevice;
use crate::error::{DiskError, Result};
use crate::format::ARENA_TABLE_ENTRY_SIZE;
use crate::superblock::Super;

use super::segment::{Arena, ArenaState};

/// Magic bytes identifying the arena table region
const TABLE_MAGIC: u32 = u32::from_be_bytes(*b"PATB");

/// Magic (4) + Count (4) + CRC (4) + Pad (4)
pub const ARENA_TABLE_HEADER_SIZE: u64 = 16;

/// Bytes used by the fields of one entry; the rest of the entry is zero
const ENTRY_FIELDS_SIZE: usize = 8 + 1 + 8 + 4;

/// All arenas of a formatted device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaTable {
    arenas: Vec<Arena>,
    block_size: u64,
}

impl ArenaTable {
    /// A table of free arenas for the given layout
    pub fn new(sup: &Super) -> Self {
        let arenas = (0..sup.arena_count as usize)
            .map(|id| Arena::new(id, sup.arena_start(id), sup.arena_size))
            .collect();
        Self {
            arenas,
            block_size: u64::from(sup.block_size),
        }
    }

    /// Read and check the table region described by `sup`
    pub fn load(device: &dyn BlockDevice, sup: &Super) -> Result<Self> {
        let mut region = vec![0u8; Self::encoded_len(sup.arena_count) as usize];
        if region.len() as u64 > sup.arena_table_size {
            return Err(DiskError::Size(format!(
                "arena table for {} arenas exceeds region of {} bytes",
                sup.arena_count, sup.arena_table_size
            )));
        }
        device.read_at(sup.arena_table_location, &mut region)?;

        let mut header = &region[..ARENA_TABLE_HEADER_SIZE as usize];
        let magic = header.get_u32();
        let count = header.get_u32();
        let crc = header.get_u32();

        if magic != TABLE_MAGIC {
            return Err(DiskError::Format(format!("bad arena table magic {:#010x}", magic)));
        }
        if count != sup.arena_count {
            return Err(DiskError::Format(format!(
                "arena table holds {} arenas, superblock says {}",
                count, sup.arena_count
            )));
        }

        let body = &region[ARENA_TABLE_HEADER_SIZE as usize..];
        if crc32fast::hash(body) != crc {
            return Err(DiskError::Format("arena table checksum mismatch".into()));
        }

        let mut table = Self::new(sup);
        let mut open = 0;
        for (arena, mut entry) in table
            .arenas
            .iter_mut()
            .zip(body.chunks_exact(ARENA_TABLE_ENTRY_SIZE as usize))
        {
            arena.wrp = entry.get_u64();
            let state = entry.get_u8();
            arena.state = ArenaState::from_u8(state).ok_or_else(|| {
                DiskError::Format(format!("arena {}: bad state {}", arena.id, state))
            })?;
            arena.sealed_at = entry.get_i64();
            arena.allocations = entry.get_u32();

            if arena.wrp > arena.size || arena.wrp % table.block_size != 0 {
                return Err(DiskError::Format(format!(
                    "arena {}: bad write cursor {:#x}",
                    arena.id, arena.wrp
                )));
            }
            if arena.state == ArenaState::Open {
                open += 1;
            }
        }
        if open > 1 {
            return Err(DiskError::Format(format!("{} arenas open at once", open)));
        }

        Ok(table)
    }

    /// Rewrite the whole table region
    pub fn flush(&self, device: &dyn BlockDevice, sup: &Super) -> Result<()> {
        let image = self.encode();
        if image.len() as u64 > sup.arena_table_size {
            return Err(DiskError::Size(format!(
                "arena table of {} bytes exceeds region of {} bytes",
                image.len(),
                sup.arena_table_size
            )));
        }
        device.write_at(sup.arena_table_location, &image)?;
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.arenas.len() * ARENA_TABLE_ENTRY_SIZE as usize);
        for arena in &self.arenas {
            body.put_u64(arena.wrp);
            body.put_u8(arena.state as u8);
            body.put_i64(arena.sealed_at);
            body.put_u32(arena.allocations);
            body.put_bytes(0, ARENA_TABLE_ENTRY_SIZE as usize - ENTRY_FIELDS_SIZE);
        }

        let mut image = Vec::with_capacity(ARENA_TABLE_HEADER_SIZE as usize + body.len());
        image.put_u32(TABLE_MAGIC);
        image.put_u32(self.arenas.len() as u32);
        image.put_u32(crc32fast::hash(&body));
        image.put_u32(0);
        image.extend_from_slice(&body);
        image
    }

    fn encoded_len(count: u32) -> u64 {
        ARENA_TABLE_HEADER_SIZE + u64::from(count) * ARENA_TABLE_ENTRY_SIZE
    }

    pub fn arenas(&self) -> &[Arena] {
        &self.arenas
    }

    pub fn get(&self, id: usize) -> Option<&Arena> {
        self.arenas.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut Arena> {
        self.arenas.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// The arena currently receiving appends, if any
    pub fn open_arena(&self) -> Option<usize> {
        self.arenas
            .iter()
            .position(|a| a.state == ArenaState::Open)
    }

    /// Lowest-numbered arena never written
    pub fn first_free(&self) -> Option<usize> {
        self.arenas
            .iter()
            .position(|a| a.state == ArenaState::Free)
    }

    /// Arena holding `addr`, if it lies in the arena region
    pub fn arena_for(&self, addr: u64) -> Option<&Arena> {
        let first = self.arenas.first()?;
        if addr < first.start {
            return None;
        }
        let id = ((addr - first.start) / first.size) as usize;
        self.arenas.get(id)
    }
}
