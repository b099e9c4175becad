//! Index Module
//!
//! Resident map from Vid to on-disk location.
//!
//! ## Responsibilities
//! - O(log n) lookups with no disk I/O, for present *and* absent files
//! - Reject a second insert of the same Vid (versions are immutable)
//! - Load the whole on-disk array at mount, rewrite it wholesale on flush
//!
//! A file system holding 10 million files needs on the order of half a
//! gigabyte of index; it is kept in memory so that finding out a file is
//! *not* there is as fast as finding it.
//!
//! ## Region Format
//! ```text
//! ┌───────────┬───────────┬─────────┐
//! │ Magic (4) │ Count (8) │ CRC (4) │
//! ├───────────┴───────────┴─────────┤
//! │ Indexelem 0..count (40 bytes)   │
//! │   server u64 | file u64 |       │
//! │   version i64 | daddr u64 |     │
//! │   doff u32 | dlen u32           │
//! └─────────────────────────────────┘
//! ```
//! Array order carries no meaning; lookups are by key.

mod table;

pub use table::Index;

use crate::types::INDEXELEM_SIZE;

/// Magic (4) + Count (8) + CRC (4)
pub const INDEX_HEADER_SIZE: usize = 16;

/// Width of one persisted entry
pub const INDEX_ENTRY_SIZE: usize = INDEXELEM_SIZE;

/// Magic bytes identifying the index region
pub(crate) const INDEX_MAGIC: u32 = u32::from_be_bytes(*b"PIDX");
