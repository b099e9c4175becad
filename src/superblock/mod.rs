//! Superblock Module
//!
//! The format descriptor: where every region lives and how big it is.
//!
//! ## Responsibilities
//! - Encode/decode the descriptor into a fixed 8 KiB slot (CRC protected)
//! - Structural validation (magic, timestamp, region placement)
//! - Two alternating copies; selection of the live copy at mount
//! - Updates always go to the non-current copy, then authority flips
//!
//! ## Slot Format
//! ```text
//! ┌──────────┬──────────┬──────────────────────────────┬───────────┐
//! │ Len (4)  │ CRC (4)  │ Super (fixed width, BE)      │ zero fill │
//! └──────────┴──────────┴──────────────────────────────┴───────────┘
//! ```

mod codec;
mod manager;
mod validate;

use serde::{Deserialize, Serialize};

pub use codec::{decode, encode};
pub use manager::SuperblockManager;
pub use validate::{overlap, validate};

use crate::format::{slot_a_offset, slot_b_offset, MAGIC};
use crate::types::Vid;

/// One of the two superblock copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Right after the config region
    A,
    /// At the end of the device
    B,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// The superblock: region layout and dynamic state of a formatted device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Super {
    pub magic: [u8; 8],
    /// Time last written (nanoseconds since the epoch)
    pub timestamp: i64,
    /// Which copy was last written
    pub current: Slot,
    /// Size of the device when formatted
    pub total_size: u64,
    /// Reserved config region at offset 0
    pub config_size: u64,
    /// Index addresses; slot 1 is reserved and always zero
    pub index_location: [u64; 2],
    pub index_size: u64,
    pub arena_table_location: u64,
    pub arena_table_size: u64,
    /// First arena address
    pub arena_region_start: u64,
    pub arena_size: u64,
    pub arena_count: u32,
    pub block_size: u32,
    /// Vid of the root
    pub root_vid: Vid,
    /// Log position of the last snapshot
    pub last_snapshot_offset: u64,
}

impl Super {
    /// A descriptor with everything but the geometry zeroed
    pub fn new(total_size: u64, config_size: u64, block_size: u32) -> Self {
        Self {
            magic: MAGIC,
            timestamp: 0,
            current: Slot::A,
            total_size,
            config_size,
            index_location: [0, 0],
            index_size: 0,
            arena_table_location: 0,
            arena_table_size: 0,
            arena_region_start: 0,
            arena_size: 0,
            arena_count: 0,
            block_size,
            root_vid: Vid::default(),
            last_snapshot_offset: 0,
        }
    }

    pub fn index_location(&self) -> u64 {
        self.index_location[0]
    }

    /// Total bytes covered by the arenas
    pub fn arena_region_size(&self) -> u64 {
        self.arena_size * u64::from(self.arena_count)
    }

    /// Start address of arena `id`
    pub fn arena_start(&self, id: usize) -> u64 {
        self.arena_region_start + self.arena_size * id as u64
    }

    /// Offset of the given superblock copy
    pub fn slot_offset(&self, slot: Slot) -> u64 {
        match slot {
            Slot::A => slot_a_offset(self.config_size),
            Slot::B => slot_b_offset(self.total_size, self.block_size),
        }
    }

    /// True if both descriptors agree on everything but the current flag
    pub fn same_except_current(&self, other: &Super) -> bool {
        let mut a = self.clone();
        a.current = other.current;
        a == *other
    }
}
