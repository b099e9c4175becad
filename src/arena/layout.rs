//! Layout Planner
//!
//! Partitions a device into index, arena table and arena regions at format
//! time. Region sizes are derived from how many files the arenas are
//! expected to hold.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DiskError, Result};
use crate::format::{
    min_disk, now_nanos, round_up, slot_b_offset, K, ARENA_TABLE_ENTRY_SIZE, MIN_ARENAS,
    MIN_ARENA_BLOCKS, MIN_ARENA_TABLE_SIZE, MIN_INDEX_SIZE, REGION_GRANULARITY,
    SMALL_DEVICE_LIMIT, SMALL_REGION_GRANULARITY, SUPERBLOCK_SIZE,
};
use crate::index::{INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE};
use crate::superblock::{validate, Super};

use super::table::ARENA_TABLE_HEADER_SIZE;

/// Plan the layout of a device of `device_size` bytes.
///
/// When fewer than the minimum number of arenas fit, the arena size is
/// halved (down to `MIN_ARENA_BLOCKS` blocks) if `config.scale_arenas` is
/// set; otherwise the device is rejected with a `Size` error. The result has
/// passed [`validate`]; nothing is written.
pub fn plan(device_size: u64, config: &Config) -> Result<Super> {
    config.validate()?;

    let minimum = min_disk(config.config_size);
    if device_size < minimum {
        return Err(DiskError::Size(format!(
            "device too small: {} < {}",
            device_size, minimum
        )));
    }

    let bsize = u64::from(config.block_size);
    let head = config.config_size + SUPERBLOCK_SIZE;
    let tail = slot_b_offset(device_size, config.block_size);
    let usable = tail.saturating_sub(head);

    let granularity = if usable >= SMALL_DEVICE_LIMIT {
        REGION_GRANULARITY
    } else {
        SMALL_REGION_GRANULARITY
    };

    let min_arena = MIN_ARENA_BLOCKS * bsize;
    let mut arena_size = config.arena_size;

    loop {
        let planned = plan_with_arena_size(device_size, config, arena_size, granularity);
        if u64::from(planned.arena_count) >= MIN_ARENAS {
            validate(&planned, now_nanos())?;
            info!(
                arenas = planned.arena_count,
                arena_kb = planned.arena_size / K,
                index_size = planned.index_size,
                arena_table_size = planned.arena_table_size,
                "layout planned"
            );
            return Ok(planned);
        }

        let next = arena_size / 2;
        if !config.scale_arenas || next < min_arena || next % bsize != 0 {
            return Err(DiskError::Size(format!(
                "only {} arenas of {} bytes fit, need {}",
                planned.arena_count, arena_size, MIN_ARENAS
            )));
        }
        debug!(
            arenas = planned.arena_count,
            from = arena_size,
            to = next,
            "scaling arena size down"
        );
        arena_size = next;
    }
}

fn plan_with_arena_size(
    device_size: u64,
    config: &Config,
    arena_size: u64,
    granularity: u64,
) -> Super {
    let head = config.config_size + SUPERBLOCK_SIZE;
    let tail = slot_b_offset(device_size, config.block_size);
    let usable = tail.saturating_sub(head);

    // Approximate arena count before the index and table are carved out
    let estimate = usable / arena_size;
    let max_files = estimate * arena_size / config.avg_file_size;

    let index_size = round_up(
        INDEX_HEADER_SIZE as u64 + max_files * INDEX_ENTRY_SIZE as u64,
        granularity,
    )
    .max(MIN_INDEX_SIZE);
    let arena_table_size = round_up(
        ARENA_TABLE_HEADER_SIZE + estimate * ARENA_TABLE_ENTRY_SIZE,
        granularity,
    )
    .max(MIN_ARENA_TABLE_SIZE);

    let mut s = Super::new(device_size, config.config_size, config.block_size);
    s.timestamp = now_nanos();
    s.index_location = [head, 0];
    s.index_size = index_size;
    s.arena_table_location = head + index_size;
    s.arena_table_size = arena_table_size;
    s.arena_region_start = s.arena_table_location + arena_table_size;
    s.arena_size = arena_size;

    // Recount from the space actually left so the whole layout fits
    let room = tail.saturating_sub(s.arena_region_start);
    let count = (room / arena_size).min(u64::from(u32::MAX));
    s.arena_count = count as u32;

    debug!(
        max_files,
        index_size,
        arena_table_size,
        arena_size,
        arenas = s.arena_count,
        "layout candidate"
    );
    s
}
