//! Structural validation of a superblock.

use crate::error::{DiskError, Result};
use crate::format::{MAGIC, SUPERBLOCK_SIZE};

use super::{Slot, Super};

/// Whether `[a1, a1+s1)` and `[a2, a2+s2)` intersect.
///
/// Zero-length ranges never overlap anything.
pub fn overlap(a1: u64, s1: u64, a2: u64, s2: u64) -> bool {
    (a1 < a2 && a1.saturating_add(s1) > a2)
        || (a2 < a1 && a2.saturating_add(s2) > a1)
        || (a1 == a2 && s1 != 0 && s2 != 0)
}

/// Check the sanity of a superblock against the time `now` (nanoseconds).
///
/// Bad magic/time/geometry is a `Format` error, intersecting regions an
/// `Overlap` error, and a region past the end of the device a `Size` error.
pub fn validate(s: &Super, now: i64) -> Result<()> {
    if s.magic != MAGIC {
        return Err(DiskError::Format(format!("bad magic {:02x?}", s.magic)));
    }
    if s.timestamp < 0 || s.timestamp > now {
        return Err(DiskError::Format(format!("bad time {}", s.timestamp)));
    }
    if s.block_size < 512 || !s.block_size.is_power_of_two() {
        return Err(DiskError::Format(format!("bad block size {}", s.block_size)));
    }
    let bsize = u64::from(s.block_size);
    if s.arena_size == 0 || s.arena_size % bsize != 0 {
        return Err(DiskError::Format(format!("bad arena size {:#x}", s.arena_size)));
    }
    if s.arena_region_start % bsize != 0 {
        return Err(DiskError::Format(format!(
            "arena region {:#x} not block aligned",
            s.arena_region_start
        )));
    }
    if s.index_location[1] != 0 {
        return Err(DiskError::Format(format!(
            "second index location {:#x} is reserved",
            s.index_location[1]
        )));
    }

    let head = s.config_size + SUPERBLOCK_SIZE;
    let arenas_len = s
        .arena_size
        .checked_mul(u64::from(s.arena_count))
        .ok_or_else(|| DiskError::Size("arena region size overflows".into()))?;

    let regions = [
        ("Index", s.index_location(), s.index_size),
        ("Arena table", s.arena_table_location, s.arena_table_size),
        ("Arenas", s.arena_region_start, arenas_len),
    ];

    for (name, start, _) in &regions {
        if *start < head {
            return Err(DiskError::Overlap(format!(
                "{} overlaps conf/superblock ({:#x})",
                name, start
            )));
        }
    }

    for (i, (name1, start1, size1)) in regions.iter().enumerate() {
        for (name2, start2, size2) in &regions[i + 1..] {
            if overlap(*start1, *size1, *start2, *size2) {
                return Err(DiskError::Overlap(format!("{} and {} overlap", name1, name2)));
            }
        }
    }

    let second = s.slot_offset(Slot::B);
    if second < head {
        return Err(DiskError::Size(format!(
            "no room for two superblocks in {:#x} bytes",
            s.total_size
        )));
    }
    for (name, start, size) in &regions {
        let end = start
            .checked_add(*size)
            .ok_or_else(|| DiskError::Size(format!("{} end overflows", name)))?;
        if end > s.total_size {
            return Err(DiskError::Size(format!("{} doesn't fit", name)));
        }
        if overlap(*start, *size, second, SUPERBLOCK_SIZE) {
            return Err(DiskError::Overlap(format!(
                "{} overlaps second superblock ({:#x})",
                name, second
            )));
        }
    }

    Ok(())
}
