//! Arena (log segment)
//!
//! A fixed-size, append-only byte range. The write cursor only advances;
//! once it reaches the end the arena is sealed and its bytes never change.

/// Lifecycle of an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArenaState {
    /// Never written
    Free = 0,
    /// Currently receiving appends (at most one arena at a time)
    Open = 1,
    /// Full or retired; immutable
    Sealed = 2,
}

impl ArenaState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ArenaState::Free),
            1 => Some(ArenaState::Open),
            2 => Some(ArenaState::Sealed),
            _ => None,
        }
    }
}

/// One log segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    pub id: usize,
    /// Absolute device address of the first byte
    pub start: u64,
    pub size: u64,
    /// Write cursor, relative to `start`
    pub wrp: u64,
    pub state: ArenaState,
    /// Seal time (nanoseconds since the epoch), 0 while unsealed
    pub sealed_at: i64,
    /// Number of allocations made in this arena
    pub allocations: u32,
}

impl Arena {
    pub fn new(id: usize, start: u64, size: u64) -> Self {
        Self {
            id,
            start,
            size,
            wrp: 0,
            state: ArenaState::Free,
            sealed_at: 0,
            allocations: 0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.wrp
    }

    pub fn is_sealed(&self) -> bool {
        self.state == ArenaState::Sealed
    }

    /// Absolute address of the write cursor
    pub fn cursor(&self) -> u64 {
        self.start + self.wrp
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Reserve `len` bytes at the cursor and return their address.
    ///
    /// Caller checks `len <= remaining()` and that the arena is open.
    pub(crate) fn append(&mut self, len: u64) -> u64 {
        debug_assert_eq!(self.state, ArenaState::Open);
        debug_assert!(len <= self.remaining());
        let addr = self.cursor();
        self.wrp += len;
        self.allocations += 1;
        addr
    }

    pub(crate) fn open(&mut self) {
        debug_assert_eq!(self.state, ArenaState::Free);
        self.state = ArenaState::Open;
    }

    pub(crate) fn seal(&mut self, now: i64) {
        self.state = ArenaState::Sealed;
        self.sealed_at = now;
    }
}
