//! Tests for the layout planner
//!
//! These tests verify:
//! - Every device size from the minimum upwards plans a valid layout
//! - Arena scaling on small devices, and the strict alternative
//! - Region granularity and the config region offset

use pepysfs::arena::plan;
use pepysfs::config::Config;
use pepysfs::format::{min_disk, now_nanos, G, K, M, SUPERBLOCK_SIZE};
use pepysfs::superblock::{overlap, validate, Slot};
use pepysfs::DiskError;

// =============================================================================
// Helper Functions
// =============================================================================

fn default_config() -> Config {
    Config::default()
}

// =============================================================================
// Minimum Size Tests
// =============================================================================

#[test]
fn test_min_disk_value() {
    assert_eq!(min_disk(0), 40 * K);
    assert_eq!(min_disk(8 * M), 8 * M + 40 * K);
}

#[test]
fn test_minimum_device_plans() {
    let s = plan(min_disk(0), &default_config()).unwrap();

    assert_eq!(s.arena_count, 4);
    assert_eq!(s.arena_size, 2 * K);
    assert!(validate(&s, now_nanos()).is_ok());
}

#[test]
fn test_device_below_minimum_is_size_error() {
    let result = plan(min_disk(0) - 512, &default_config());

    assert!(matches!(result, Err(DiskError::Size(_))));
}

#[test]
fn test_invalid_config_is_config_error() {
    let config = Config::builder().block_size(1000).build();

    assert!(matches!(plan(G, &config), Err(DiskError::Config(_))));
}

// =============================================================================
// Planning Tests
// =============================================================================

#[test]
fn test_many_sizes_plan_valid_layouts() {
    let config = default_config();
    let mut size = min_disk(0);

    while size <= 64 * G {
        let s = plan(size, &config).unwrap_or_else(|e| panic!("size {}: {}", size, e));

        assert!(validate(&s, now_nanos()).is_ok(), "size {}", size);
        assert!(s.arena_count >= 4, "size {}", size);
        assert_eq!(s.total_size, size);

        let arenas_end = s.arena_region_start + s.arena_region_size();
        assert!(arenas_end <= s.slot_offset(Slot::B), "size {}", size);
        assert!(!overlap(
            s.arena_region_start,
            s.arena_region_size(),
            s.slot_offset(Slot::B),
            SUPERBLOCK_SIZE
        ));

        // Odd sizes exercise the block rounding of slot B
        size = size * 3 / 2 + 511;
    }
}

#[test]
fn test_small_device_scales_arenas() {
    let s = plan(2 * G, &default_config()).unwrap();

    assert_eq!(s.arena_size, 256 * M);
    assert_eq!(s.arena_count, 7);
}

#[test]
fn test_strict_planning_rejects_small_device() {
    let config = Config::builder().scale_arenas(false).build();

    assert!(matches!(plan(2 * G, &config), Err(DiskError::Size(_))));
}

#[test]
fn test_large_device_keeps_target_arena_size() {
    let s = plan(64 * G, &default_config()).unwrap();

    assert_eq!(s.arena_size, G);
    assert!(s.arena_count >= 60);
}

#[test]
fn test_region_granularity() {
    // Large devices round regions to 1 MiB
    let s = plan(64 * G, &default_config()).unwrap();
    assert_eq!(s.index_size % M, 0);
    assert_eq!(s.arena_table_size % M, 0);

    // Small devices to 8 KiB
    let s = plan(256 * K, &default_config()).unwrap();
    assert_eq!(s.index_size % (8 * K), 0);
    assert_eq!(s.arena_table_size % (8 * K), 0);
    assert!(s.index_size < M);
}

#[test]
fn test_index_sized_for_expected_files() {
    let s = plan(64 * G, &default_config()).unwrap();
    let expected_files = u64::from(s.arena_count) * s.arena_size / 20_000;

    // Entries are 40 bytes behind a 16 byte header
    assert!((s.index_size - 16) / 40 >= expected_files);
}

#[test]
fn test_regions_follow_config_region() {
    let config = Config::builder().config_size(8 * M).build();
    let s = plan(4 * G, &config).unwrap();

    assert_eq!(s.config_size, 8 * M);
    assert_eq!(s.slot_offset(Slot::A), 8 * M);
    assert_eq!(s.index_location(), 8 * M + SUPERBLOCK_SIZE);
    assert_eq!(s.arena_table_location, s.index_location() + s.index_size);
    assert_eq!(s.arena_region_start, s.arena_table_location + s.arena_table_size);
}

#[test]
fn test_larger_block_size() {
    let config = Config::builder().block_size(4096).build();
    let s = plan(G, &config).unwrap();

    assert_eq!(s.block_size, 4096);
    assert_eq!(s.arena_region_start % 4096, 0);
    assert_eq!(s.slot_offset(Slot::B) % 4096, 0);
    assert!(validate(&s, now_nanos()).is_ok());
}
