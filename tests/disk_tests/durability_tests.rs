//! Tests for what survives a remount
//!
//! These tests verify:
//! - A clean close persists the index, arena table and superblock
//! - Without a flush, commits since the last flush are lost
//! - Arena seals and the commit-count strategy flush the index
//! - Snapshot and root updates go through the superblock
//! - A torn superblock write falls back to the previous copy
//! - A flush cut short never lets indexed records be overwritten

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pepysfs::arena::{plan, ArenaState, FileKind};
use pepysfs::config::{Config, IndexFlushStrategy, SuperblockPolicy};
use pepysfs::device::{BlockDevice, MemDevice};
use pepysfs::format::K;
use pepysfs::superblock::{Slot, Super};
use pepysfs::{Disk, DiskError, Vid};
use tracing::Span;

// =============================================================================
// Helper Functions
// =============================================================================

const DEVICE_SIZE: u64 = 256 * K;

fn config() -> Config {
    Config::builder().arena_size(16 * K).build()
}

fn setup(config: Config) -> Disk {
    let dev = Box::new(MemDevice::new(DEVICE_SIZE));
    Disk::format_device(dev, config, Span::none()).unwrap()
}

fn remount(dev: Box<dyn BlockDevice>, config: Config) -> Disk {
    Disk::mount_device(dev, config, Span::none()).unwrap()
}

/// Device that fails the first write at `offset` once armed
struct CrashDevice {
    inner: MemDevice,
    offset: u64,
    armed: Arc<AtomicBool>,
}

impl BlockDevice for CrashDevice {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        if offset == self.offset && self.armed.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "power lost"));
        }
        self.inner.write_at(offset, buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.inner.sync()
    }
}

fn vid(file: u64) -> Vid {
    Vid::new(0, file, 1)
}

// =============================================================================
// Close / Remount Tests
// =============================================================================

#[test]
fn test_close_then_remount() {
    let disk = setup(config());
    for i in 0..10 {
        disk.write_file(vid(i), FileKind::File, &[i as u8; 700], b"meta")
            .unwrap();
    }
    let arenas = disk.arenas();
    let disk = remount(disk.unmount().unwrap(), config());

    assert_eq!(disk.file_count(), 10);
    assert_eq!(disk.arenas(), arenas);
    for i in 0..10 {
        assert_eq!(disk.read_data(&vid(i)).unwrap().as_ref(), &[i as u8; 700][..]);
    }
}

#[test]
fn test_remount_resumes_at_write_cursor() {
    let disk = setup(config());
    let first = disk
        .write_file(vid(1), FileKind::File, b"one", b"")
        .unwrap();
    let disk = remount(disk.unmount().unwrap(), config());
    let second = disk
        .write_file(vid(2), FileKind::File, b"two", b"")
        .unwrap();

    // One header, one data and one metadata block per record
    assert_eq!(second.disk_address, first.disk_address + 3 * 512);
}

#[test]
fn test_unflushed_commits_are_lost() {
    let disk = setup(config());
    disk.write_file(vid(1), FileKind::File, b"durable", b"")
        .unwrap();
    disk.flush().unwrap();
    disk.write_file(vid(2), FileKind::File, b"volatile", b"")
        .unwrap();
    let disk = remount(disk.into_device(), config());

    assert!(disk.lookup(&vid(1)).is_ok());
    assert!(matches!(disk.lookup(&vid(2)), Err(DiskError::NotFound(_))));
}

#[test]
fn test_every_n_commits_flushes_index() {
    let config = Config::builder()
        .arena_size(16 * K)
        .index_flush_strategy(IndexFlushStrategy::EveryNCommits { count: 2 })
        .build();
    let disk = setup(config.clone());

    for i in 0..3 {
        disk.write_file(vid(i), FileKind::File, b"x", b"").unwrap();
    }
    let disk = remount(disk.into_device(), config);

    // The third commit was still pending
    assert_eq!(disk.file_count(), 2);
    assert!(disk.lookup(&vid(2)).is_err());
}

#[test]
fn test_arena_seal_flushes_index() {
    let disk = setup(config());

    // 13 KiB record, then a 10 KiB record that has to go to arena 1
    disk.write_file(vid(1), FileKind::File, &[1u8; 12 * 1024], b"")
        .unwrap();
    disk.write_file(vid(2), FileKind::File, &[2u8; 9 * 1024], b"")
        .unwrap();
    let disk = remount(disk.into_device(), config());

    assert_eq!(disk.file_count(), 2);
    let arenas = disk.arenas();
    assert_eq!(arenas[0].state, ArenaState::Sealed);
    assert_eq!(arenas[1].state, ArenaState::Open);
    assert_eq!(disk.read_data(&vid(2)).unwrap().len(), 9 * 1024);
}

// =============================================================================
// Superblock Update Tests
// =============================================================================

#[test]
fn test_snapshot_records_log_position() {
    let disk = setup(config());
    let location = disk
        .write_file(vid(1), FileKind::File, b"snap", b"")
        .unwrap();
    let before = disk.superblock();

    let offset = disk.snapshot().unwrap();

    // Right after the record: payload start + data + metadata
    assert_eq!(offset, location.disk_address + u64::from(location.disk_length));
    let after = disk.superblock();
    assert_eq!(after.last_snapshot_offset, offset);
    assert!(after.timestamp > before.timestamp);
    assert_ne!(after.current, before.current);
    let disk = remount(disk.into_device(), config());
    assert_eq!(disk.superblock().last_snapshot_offset, offset);
    assert!(disk.lookup(&vid(1)).is_ok());
}

#[test]
fn test_root_survives_remount() {
    let disk = setup(config());
    disk.write_file(vid(1), FileKind::Dir, b"", b"/").unwrap();
    disk.set_root(vid(1)).unwrap();
    let disk = remount(disk.unmount().unwrap(), config());

    assert_eq!(disk.root(), vid(1));
}

#[test]
fn test_torn_superblock_write_falls_back() {
    let disk = setup(config());
    disk.write_file(vid(1), FileKind::File, b"a", b"").unwrap();
    let first = disk.snapshot().unwrap();
    disk.write_file(vid(2), FileKind::File, b"b", b"").unwrap();
    disk.snapshot().unwrap();

    // The second snapshot went to slot B; tear it
    let sup = disk.superblock();
    assert_eq!(sup.current, Slot::B);
    let dev = disk.into_device();
    dev.write_at(sup.slot_offset(Slot::B) + 100, &[0xff; 64])
        .unwrap();
    let mut image = vec![0u8; DEVICE_SIZE as usize];
    dev.read_at(0, &mut image).unwrap();

    // Both copies required: refuse to mount
    assert!(matches!(
        Disk::mount_device(
            Box::new(MemDevice::from_bytes(image.clone())),
            config(),
            Span::none()
        ),
        Err(DiskError::Format(_))
    ));

    // Single copy accepted: the first snapshot's superblock is live
    let relaxed = Config::builder()
        .arena_size(16 * K)
        .superblock_policy(SuperblockPolicy::AllowSingle)
        .build();
    let disk = remount(Box::new(MemDevice::from_bytes(image)), relaxed);
    assert_eq!(disk.superblock().current, Slot::A);
    assert_eq!(disk.superblock().last_snapshot_offset, first);
}

#[test]
fn test_superblock_updates_alternate() {
    let disk = setup(config());
    disk.write_file(vid(1), FileKind::File, b"a", b"").unwrap();
    let mut slots = vec![disk.superblock().current];

    for _ in 0..3 {
        disk.snapshot().unwrap();
        slots.push(disk.superblock().current);
    }
    disk.set_root(vid(1)).unwrap();
    slots.push(disk.superblock().current);

    assert_eq!(slots, vec![Slot::B, Slot::A, Slot::B, Slot::A, Slot::B]);
}

// =============================================================================
// Interrupted Flush Tests
// =============================================================================

/// Formatted disk on a device that fails the first write at the offset
/// `target` picks from the layout, once the returned flag is set
fn crash_setup(target: fn(&Super) -> u64) -> (Disk, Arc<AtomicBool>) {
    let planned = plan(DEVICE_SIZE, &config()).unwrap();
    let armed = Arc::new(AtomicBool::new(false));
    let dev = CrashDevice {
        inner: MemDevice::new(DEVICE_SIZE),
        offset: target(&planned),
        armed: Arc::clone(&armed),
    };
    let disk = Disk::format_device(Box::new(dev), config(), Span::none()).unwrap();
    (disk, armed)
}

#[test]
fn test_failed_table_write_keeps_index_consistent() {
    let (disk, armed) = crash_setup(|s| s.arena_table_location);
    disk.write_file(vid(1), FileKind::File, b"durable", b"").unwrap();
    disk.flush().unwrap();
    disk.write_file(vid(2), FileKind::File, b"lost", b"").unwrap();

    armed.store(true, Ordering::SeqCst);
    assert!(matches!(disk.flush(), Err(DiskError::Io(_))));

    let disk = remount(disk.into_device(), config());

    // The interrupted flush wrote nothing past the table
    assert!(matches!(disk.lookup(&vid(2)), Err(DiskError::NotFound(_))));

    // Space after the last durable record is reused without harming it
    disk.write_file(vid(3), FileKind::File, b"reused", b"").unwrap();
    assert_eq!(disk.read_data(&vid(1)).unwrap().as_ref(), b"durable");
    assert_eq!(disk.read_data(&vid(3)).unwrap().as_ref(), b"reused");
}

#[test]
fn test_failed_index_write_only_leaks_space() {
    let (disk, armed) = crash_setup(|s| s.index_location());
    disk.write_file(vid(1), FileKind::File, b"durable", b"").unwrap();
    disk.flush().unwrap();
    let lost = disk
        .write_file(vid(2), FileKind::File, b"lost", b"")
        .unwrap();

    armed.store(true, Ordering::SeqCst);
    assert!(matches!(disk.flush(), Err(DiskError::Io(_))));

    let disk = remount(disk.into_device(), config());
    assert!(matches!(disk.lookup(&vid(2)), Err(DiskError::NotFound(_))));

    // The table already covers the lost record, so new writes land after it
    let next = disk
        .write_file(vid(3), FileKind::File, b"after", b"")
        .unwrap();
    assert!(next.disk_address > lost.disk_address);
    assert_eq!(disk.read_data(&vid(1)).unwrap().as_ref(), b"durable");
    assert_eq!(disk.read_data(&vid(3)).unwrap().as_ref(), b"after");
}
