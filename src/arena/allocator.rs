//! Arena Allocator
//!
//! Hands out block-aligned space from the open arena. A request that does
//! not fit in what is left of the open arena seals it and continues in the
//! next free one; an allocation never crosses an arena boundary.

use tracing::{debug, info};

use crate::error::{DiskError, Result};
use crate::format::{now_nanos, round_up};

use super::segment::Arena;
use super::table::ArenaTable;

/// Outcome of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Absolute device address of the reserved space
    pub address: u64,
    /// Reserved length (request rounded up to blocks)
    pub length: u64,
    /// Arena the space came from
    pub arena: usize,
    /// Whether one or more arenas were sealed by this allocation
    pub sealed: bool,
}

/// Append cursor over the arena table
#[derive(Debug)]
pub struct ArenaAllocator {
    table: ArenaTable,
}

impl ArenaAllocator {
    pub fn new(table: ArenaTable) -> Self {
        Self { table }
    }

    /// Reserve `len` bytes (rounded up to whole blocks)
    pub fn allocate(&mut self, len: u64) -> Result<Allocation> {
        if len == 0 {
            return Err(DiskError::Size("zero-length allocation".into()));
        }
        let need = round_up(len, self.table.block_size());
        let arena_size = self.table.get(0).map_or(0, |a| a.size);
        if need > arena_size {
            return Err(DiskError::Size(format!(
                "allocation of {} bytes exceeds arena size {}",
                need, arena_size
            )));
        }

        let mut sealed = false;
        let id = match self.table.open_arena() {
            Some(id) if self.arena(id).remaining() >= need => id,
            Some(id) => {
                self.seal(id);
                sealed = true;
                self.open_next()?
            }
            None => self.open_next()?,
        };

        let arena = self
            .table
            .get_mut(id)
            .ok_or_else(|| DiskError::Size(format!("no arena {}", id)))?;
        let address = arena.append(need);
        let full = arena.remaining() == 0;

        if full {
            self.seal(id);
            sealed = true;
        }

        Ok(Allocation {
            address,
            length: need,
            arena: id,
            sealed,
        })
    }

    /// Seal the open arena (if any) so the next allocation starts a new one
    pub fn seal_open(&mut self) -> bool {
        match self.table.open_arena() {
            Some(id) => {
                self.seal(id);
                true
            }
            None => false,
        }
    }

    /// Address the next allocation would start at, if it fits the open arena
    pub fn log_position(&self) -> u64 {
        if let Some(id) = self.table.open_arena() {
            return self.arena(id).cursor();
        }
        if let Some(id) = self.table.first_free() {
            return self.arena(id).start;
        }
        self.table.arenas().last().map_or(0, Arena::end)
    }

    pub fn table(&self) -> &ArenaTable {
        &self.table
    }

    fn arena(&self, id: usize) -> &Arena {
        &self.table.arenas()[id]
    }

    fn seal(&mut self, id: usize) {
        if let Some(arena) = self.table.get_mut(id) {
            arena.seal(now_nanos());
            info!(
                arena = id,
                used = arena.wrp,
                wasted = arena.remaining(),
                "arena sealed"
            );
        }
    }

    fn open_next(&mut self) -> Result<usize> {
        let id = self.table.first_free().ok_or_else(|| {
            DiskError::Size(format!("log full: all {} arenas sealed", self.table.len()))
        })?;
        if let Some(arena) = self.table.get_mut(id) {
            arena.open();
            debug!(arena = id, start = arena.start, "arena opened");
        }
        Ok(id)
    }
}
