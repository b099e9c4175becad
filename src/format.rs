//! Format constants and on-disk geometry helpers.
//!
//! ```text
//! ┌────────────┬──────────┬────────┬─────────────┬──────────────────┬─────┬──────────┐
//! │ Config     │ Super A  │ Index  │ Arena table │ Arenas 0..n      │ ... │ Super B  │
//! │ (reserved) │ (8 KiB)  │        │             │                  │     │ (8 KiB)  │
//! └────────────┴──────────┴────────┴─────────────┴──────────────────┴─────┴──────────┘
//! 0       config_size                                         (size - 8 KiB) & !(bsize - 1)
//! ```
//!
//! All multi-byte integers on disk are big-endian.

pub const K: u64 = 1 << 10;
pub const M: u64 = 1 << 20;
pub const G: u64 = 1 << 30;

/// Magic at the start of every encoded superblock
pub const MAGIC: [u8; 8] = *b"pepysfs\0";

/// Default block size; every allocation is a multiple of it
pub const BLOCK_SIZE: u32 = 512;

/// Size of one superblock slot
pub const SUPERBLOCK_SIZE: u64 = 8 * K;

/// Default (target) arena size
pub const ARENA_SIZE: u64 = G;

/// Smallest arena the planner will scale down to, in blocks
pub const MIN_ARENA_BLOCKS: u64 = 4;

pub const MIN_ARENAS: u64 = 4;
pub const MIN_INDEX_SIZE: u64 = 8 * K;
pub const MIN_ARENA_TABLE_SIZE: u64 = 8 * K;

/// Region sizes are rounded up to this granularity
pub const REGION_GRANULARITY: u64 = M;

/// Granularity used when the device is too small for 1 MiB rounding
pub const SMALL_REGION_GRANULARITY: u64 = 8 * K;

/// Usable space below which the small granularity is used
pub const SMALL_DEVICE_LIMIT: u64 = 64 * M;

/// Average file size used to estimate how many files a device holds
pub const AVG_FILE_SIZE: u64 = 20_000;

/// Width of one arena table entry
pub const ARENA_TABLE_ENTRY_SIZE: u64 = 64;

/// Smallest device that can hold a format
pub const fn min_disk(config_size: u64) -> u64 {
    config_size + MIN_ARENA_TABLE_SIZE + 2 * SUPERBLOCK_SIZE + 2 * MIN_INDEX_SIZE
}

/// Round `x` up to a multiple of `align` (`align` > 0)
pub const fn round_up(x: u64, align: u64) -> u64 {
    x.div_ceil(align) * align
}

/// Offset of the first superblock slot
pub const fn slot_a_offset(config_size: u64) -> u64 {
    config_size
}

/// Offset of the second superblock slot: the last superblock-sized span of
/// the device, rounded down to the block size
pub fn slot_b_offset(total_size: u64, block_size: u32) -> u64 {
    total_size.saturating_sub(SUPERBLOCK_SIZE) & !(u64::from(block_size) - 1)
}

/// Nanoseconds since the Unix epoch
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
