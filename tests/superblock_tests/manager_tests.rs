//! Tests for the double-buffered superblock manager
//!
//! These tests verify:
//! - Format writes two valid copies, the second one current
//! - Persist alternates slots and round-trips through load
//! - Selection: newer copy wins, equal timestamps pick slot A
//! - Corrupt copies under each selection policy
//! - A failed write leaves the in-memory flag untouched

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use pepysfs::arena::plan;
use pepysfs::config::{Config, SuperblockPolicy};
use pepysfs::device::{BlockDevice, MemDevice};
use pepysfs::format::{now_nanos, SUPERBLOCK_SIZE};
use pepysfs::superblock::{encode, Slot, Super, SuperblockManager};
use pepysfs::{DiskError, Vid};

// =============================================================================
// Helper Functions
// =============================================================================

const DEVICE_SIZE: u64 = 256 * 1024;

fn config() -> Config {
    Config::builder().arena_size(16 * 1024).build()
}

fn planned() -> Super {
    plan(DEVICE_SIZE, &config()).unwrap()
}

fn formatted() -> (MemDevice, SuperblockManager) {
    let dev = MemDevice::new(DEVICE_SIZE);
    let manager = SuperblockManager::format(planned(), &dev).unwrap();
    (dev, manager)
}

/// Write `s` verbatim into `slot`
fn write_slot(dev: &dyn BlockDevice, s: &Super, slot: Slot) {
    let mut copy = s.clone();
    copy.current = slot;
    dev.write_at(s.slot_offset(slot), &encode(&copy).unwrap()).unwrap();
}

fn smash_slot(dev: &dyn BlockDevice, s: &Super, slot: Slot) {
    dev.write_at(s.slot_offset(slot) + 4, &[0xde, 0xad, 0xbe, 0xef])
        .unwrap();
}

/// Device whose writes can be switched off
struct FailingDevice {
    inner: MemDevice,
    fail_writes: AtomicBool,
}

impl BlockDevice for FailingDevice {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.inner.write_at(offset, buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.inner.sync()
    }
}

// =============================================================================
// Format Tests
// =============================================================================

#[test]
fn test_format_leaves_second_slot_current() {
    let (dev, manager) = formatted();

    assert_eq!(manager.current_slot(), Slot::B);

    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(loaded.current_slot(), Slot::B);
    assert_eq!(loaded.current(), manager.current());
}

#[test]
fn test_slot_b_sits_at_end_of_device() {
    let s = planned();

    assert_eq!(s.slot_offset(Slot::A), 0);
    assert_eq!(s.slot_offset(Slot::B), DEVICE_SIZE - SUPERBLOCK_SIZE);
}

#[test]
fn test_slot_b_is_block_aligned_on_odd_device() {
    let size = DEVICE_SIZE + 300;
    let s = plan(size, &config()).unwrap();

    assert_eq!(s.slot_offset(Slot::B) % 512, 0);
    assert!(s.slot_offset(Slot::B) + SUPERBLOCK_SIZE <= size);
}

#[test]
fn test_config_region_shifts_slot_a() {
    let config = Config::builder()
        .arena_size(16 * 1024)
        .config_size(8 * 1024)
        .build();
    let s = plan(DEVICE_SIZE, &config).unwrap();

    assert_eq!(s.slot_offset(Slot::A), 8 * 1024);
    assert_eq!(s.index_location(), 16 * 1024);
}

// =============================================================================
// Persist / Load Tests
// =============================================================================

#[test]
fn test_persist_toggles_flag_and_round_trips() {
    let (dev, mut manager) = formatted();
    let before = manager.current().clone();

    manager.persist(&dev).unwrap();

    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert!(loaded.current().same_except_current(&before));
    assert_ne!(loaded.current_slot(), before.current);
    assert_eq!(loaded.current_slot(), manager.current_slot());
}

#[test]
fn test_update_alternates_slots() {
    let (dev, mut manager) = formatted();
    let mut slots = Vec::new();

    for i in 0..4u64 {
        manager
            .update(&dev, |s| s.last_snapshot_offset = i * 512)
            .unwrap();
        slots.push(manager.current_slot());

        let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
        assert_eq!(loaded.current(), manager.current());
    }

    assert_eq!(slots, vec![Slot::A, Slot::B, Slot::A, Slot::B]);
}

#[test]
fn test_update_advances_timestamp() {
    let (dev, mut manager) = formatted();
    let before = manager.current().timestamp;

    manager.update(&dev, |_| {}).unwrap();

    assert!(manager.current().timestamp > before);
}

#[test]
fn test_update_leaves_previous_copy_intact() {
    let (dev, mut manager) = formatted();
    let previous = manager.current().clone();

    manager.update(&dev, |s| s.root_vid = Vid::new(1, 2, 3)).unwrap();

    // The copy that was current before the update still decodes as it was
    let mut slot = vec![0u8; SUPERBLOCK_SIZE as usize];
    dev.read_at(previous.slot_offset(previous.current), &mut slot)
        .unwrap();
    assert_eq!(pepysfs::superblock::decode(&slot).unwrap(), previous);
}

#[test]
fn test_failed_write_keeps_flag() {
    let dev = FailingDevice {
        inner: MemDevice::new(DEVICE_SIZE),
        fail_writes: AtomicBool::new(false),
    };
    let mut manager = SuperblockManager::format(planned(), &dev).unwrap();
    let before = manager.current().clone();

    dev.fail_writes.store(true, Ordering::SeqCst);
    let result = manager.update(&dev, |s| s.root_vid = Vid::new(9, 9, 9));

    assert!(matches!(result, Err(DiskError::Io(_))));
    assert_eq!(manager.current(), &before);

    dev.fail_writes.store(false, Ordering::SeqCst);
    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(loaded.current(), &before);
}

// =============================================================================
// Selection Tests
// =============================================================================

#[test]
fn test_newer_copy_wins() {
    let dev = MemDevice::new(DEVICE_SIZE);
    let mut a = planned();
    a.timestamp = now_nanos() - 2_000;
    let mut b = a.clone();
    b.timestamp = a.timestamp + 1;
    b.root_vid = Vid::new(0, 7, 1);

    write_slot(&dev, &a, Slot::A);
    write_slot(&dev, &b, Slot::B);

    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(loaded.current_slot(), Slot::B);
    assert_eq!(loaded.current().root_vid, b.root_vid);

    // And the other way round
    a.timestamp = b.timestamp + 1;
    write_slot(&dev, &a, Slot::A);

    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(loaded.current_slot(), Slot::A);
    assert_eq!(loaded.current().root_vid, a.root_vid);
}

#[test]
fn test_equal_timestamps_select_first_slot() {
    let dev = MemDevice::new(DEVICE_SIZE);
    let mut a = planned();
    a.timestamp = now_nanos() - 1_000;
    a.root_vid = Vid::new(0, 1, 1);
    let mut b = a.clone();
    b.root_vid = Vid::new(0, 2, 2);

    write_slot(&dev, &a, Slot::A);
    write_slot(&dev, &b, Slot::B);

    let loaded = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(loaded.current_slot(), Slot::A);
    assert_eq!(loaded.current().root_vid, a.root_vid);
}

#[test]
fn test_unformatted_device_fails() {
    let dev = MemDevice::new(DEVICE_SIZE);

    let result = SuperblockManager::load_latest(&dev, &config());

    assert!(matches!(result, Err(DiskError::Format(_))));
}

#[test]
fn test_corrupt_copy_fails_when_both_required() {
    let (dev, manager) = formatted();
    smash_slot(&dev, manager.current(), Slot::B);

    let result = SuperblockManager::load_latest(&dev, &config());

    assert!(matches!(result, Err(DiskError::Format(_))));
}

#[test]
fn test_single_copy_accepted_when_allowed() {
    let (dev, manager) = formatted();
    let relaxed = Config::builder()
        .arena_size(16 * 1024)
        .superblock_policy(SuperblockPolicy::AllowSingle)
        .build();

    smash_slot(&dev, manager.current(), Slot::B);
    let loaded = SuperblockManager::load_latest(&dev, &relaxed).unwrap();
    assert_eq!(loaded.current_slot(), Slot::A);

    // Losing the first copy instead falls back to the second
    let (dev, manager) = formatted();
    smash_slot(&dev, manager.current(), Slot::A);
    let loaded = SuperblockManager::load_latest(&dev, &relaxed).unwrap();
    assert_eq!(loaded.current_slot(), Slot::B);
}

#[test]
fn test_persist_repairs_bad_copy() {
    let (dev, manager) = formatted();
    let relaxed = Config::builder()
        .arena_size(16 * 1024)
        .superblock_policy(SuperblockPolicy::AllowSingle)
        .build();
    smash_slot(&dev, manager.current(), Slot::B);

    let mut loaded = SuperblockManager::load_latest(&dev, &relaxed).unwrap();
    loaded.update(&dev, |_| {}).unwrap();

    // Both copies valid again
    let strict = SuperblockManager::load_latest(&dev, &config()).unwrap();
    assert_eq!(strict.current_slot(), Slot::B);
    assert_eq!(strict.current(), loaded.current());
}

#[test]
fn test_superblock_larger_than_device_is_size_error() {
    let (dev, manager) = formatted();

    // Same image on a device that lost its tail
    let mut bytes = dev.to_bytes();
    bytes.truncate((DEVICE_SIZE - 4096) as usize);
    let shrunk = MemDevice::from_bytes(bytes);
    let relaxed = Config::builder()
        .arena_size(16 * 1024)
        .superblock_policy(SuperblockPolicy::AllowSingle)
        .build();

    let result = SuperblockManager::load_latest(&shrunk, &relaxed);

    assert!(manager.current().total_size > shrunk.len());
    assert!(matches!(result, Err(DiskError::Size(_))));
}
