//! Arena Module
//!
//! The log: a fixed number of fixed-size, append-only segments.
//!
//! ## Responsibilities
//! - Plan the region layout of a device at format time
//! - Track each arena's write cursor and state (free, open, sealed)
//! - Hand out block-aligned space, rotating to the next arena when full
//! - Encode and scan the records appended to an arena
//!
//! Sealed arenas are immutable, so any byte below the write cursor of a
//! sealed arena can be read without synchronization. The tail of the open
//! arena belongs to the single writer.

mod allocator;
mod layout;
mod record;
mod segment;
mod table;

pub use allocator::{Allocation, ArenaAllocator};
pub use layout::plan;
pub use record::{
    encode_record, split_meta_group, FileKind, MetaState, MetaTrailer, Record, RecordHeader,
    RecordIter, RecordKind, RecordLayout, META_TRAILER_SIZE, RECORD_HEADER_SIZE,
};
pub use segment::{Arena, ArenaState};
pub use table::{ArenaTable, ARENA_TABLE_HEADER_SIZE};
