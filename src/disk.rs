//! Disk Module
//!
//! The facade that mounts a device and coordinates all components.
//!
//! ## Responsibilities
//! - Format a device: plan the layout, write empty tables, both superblocks
//! - Mount: validate size, select the live superblock, load tables and index
//! - Serve lookups and raw reads to the protocol layer
//! - Allocate log space, write records, commit index entries
//! - Flush the index when an arena seals; persist snapshots

use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, info_span, Span};

use crate::arena::{
    self, encode_record, split_meta_group, Arena, ArenaAllocator, ArenaTable, FileKind, MetaState,
    Record, RecordIter, RecordLayout,
};
use crate::config::{Config, IndexFlushStrategy};
use crate::device::{BlockDevice, FileDevice};
use crate::error::{DiskError, Result};
use crate::format::min_disk;
use crate::index::Index;
use crate::superblock::{Super, SuperblockManager};
use crate::types::{Metaaddr, Vid, Xid};

/// A mounted pepysfs device
///
/// ## Concurrency Model: Single Writer
///
/// - **Mutations** (allocate/commit/write_file/flush/snapshot): serialized by
///   the `writer` mutex, which owns the superblock and the arena cursor. The
///   double-buffer superblock flip and the wholesale index rewrite are only
///   safe with one writer.
///
/// - **Lookups**: take the index read lock only.
///
/// - **Raw reads** (`read_range`): no engine lock. Bytes below the write
///   cursor of a sealed arena never change.
pub struct Disk {
    config: Config,

    /// Backing store, owned for the lifetime of the mount
    device: Box<dyn BlockDevice>,

    /// Resident Vid index (internal RwLock)
    index: Index,

    /// Everything the single writer mutates
    writer: Mutex<Writer>,

    /// Logging context for every operation on this disk
    span: Span,
}

struct Writer {
    superblock: SuperblockManager,
    allocator: ArenaAllocator,
    /// Commits since the index was last written
    pending: usize,
}

impl Disk {
    // =========================================================================
    // Format
    // =========================================================================

    /// Format the device at `config.device_path`
    pub fn format(config: Config) -> Result<Self> {
        let device = FileDevice::open(&config.device_path)?;
        let span = Self::default_span(&config.device_path);
        Self::format_device(Box::new(device), config, span)
    }

    /// Format `device` and return it mounted.
    ///
    /// 1. Plan and validate the layout (nothing written on failure)
    /// 2. Write an empty arena table and index
    /// 3. Write superblock copy A, then copy B
    pub fn format_device(device: Box<dyn BlockDevice>, config: Config, span: Span) -> Result<Self> {
        let (superblock, table, index) = span.in_scope(|| -> Result<_> {
            info!(size = device.len(), "creating superblock");

            // Step 1: Plan (validates before anything touches the device)
            let sup = arena::plan(device.len(), &config)?;

            // Step 2: Empty tables
            let table = ArenaTable::new(&sup);
            let index = Index::new(sup.index_size);
            table.flush(device.as_ref(), &sup)?;
            index.flush(device.as_ref(), &sup)?;
            device.sync()?;

            // Step 3: Superblocks last, so a half-formatted device never mounts
            let superblock = SuperblockManager::format(sup, device.as_ref())?;

            info!(
                arenas = superblock.current().arena_count,
                arena_size = superblock.current().arena_size,
                index_capacity = index.capacity(),
                "formatted"
            );
            Ok((superblock, table, index))
        })?;

        Ok(Self::assemble(config, device, superblock, table, index, span))
    }

    // =========================================================================
    // Mount
    // =========================================================================

    /// Mount the device at `config.device_path`
    pub fn mount(config: Config) -> Result<Self> {
        let device = FileDevice::open(&config.device_path)?;
        let span = Self::default_span(&config.device_path);
        Self::mount_device(Box::new(device), config, span)
    }

    /// Mount with default config (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().device_path(path).build();
        Self::mount(config)
    }

    /// Mount `device`.
    ///
    /// Each step is fatal; on failure the device handle is dropped.
    /// 1. Confirm the device is at least `min_disk` bytes
    /// 2. Read both superblocks and select the live one
    /// 3. Load the arena table
    /// 4. Load the index
    pub fn mount_device(device: Box<dyn BlockDevice>, config: Config, span: Span) -> Result<Self> {
        let (superblock, table, index) = span.in_scope(|| -> Result<_> {
            config.validate()?;

            // Step 1: Size
            let minimum = min_disk(config.config_size);
            if device.len() < minimum {
                return Err(DiskError::Size(format!(
                    "too small {} < {}",
                    device.len(),
                    minimum
                )));
            }

            // Step 2: Superblock
            let superblock = SuperblockManager::load_latest(device.as_ref(), &config)?;
            let sup = superblock.current();
            if sup.config_size != config.config_size {
                return Err(DiskError::Format(format!(
                    "superblock config size {} differs from configured {}",
                    sup.config_size, config.config_size
                )));
            }
            if sup.block_size != config.block_size {
                debug!(
                    on_disk = sup.block_size,
                    configured = config.block_size,
                    "using on-disk block size"
                );
            }

            // Step 3: Arena table
            let table = ArenaTable::load(device.as_ref(), sup)?;

            // Step 4: Index
            let index = Index::load(device.as_ref(), sup)?;

            info!(
                files = index.len(),
                open_arena = ?table.open_arena(),
                "mounted"
            );
            Ok((superblock, table, index))
        })?;

        Ok(Self::assemble(config, device, superblock, table, index, span))
    }

    fn assemble(
        config: Config,
        device: Box<dyn BlockDevice>,
        superblock: SuperblockManager,
        table: ArenaTable,
        index: Index,
        span: Span,
    ) -> Self {
        Self {
            config,
            device,
            index,
            writer: Mutex::new(Writer {
                superblock,
                allocator: ArenaAllocator::new(table),
                pending: 0,
            }),
            span,
        }
    }

    fn default_span(path: &Path) -> Span {
        info_span!("disk", device = %path.display())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Location of `vid`; `NotFound` if it was never committed
    pub fn lookup(&self, vid: &Vid) -> Result<Metaaddr> {
        self.index.lookup(vid)
    }

    /// Newest committed version of a file
    pub fn latest(&self, xid: Xid) -> Option<(Vid, Metaaddr)> {
        self.index.latest(xid)
    }

    /// Read `len` bytes at `addr`
    pub fn read_range(&self, addr: u64, len: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; len];
        self.device.read_at(addr, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Metadata of `vid`, from the cache or from disk (then cached)
    pub fn read_metadata(&self, vid: &Vid) -> Result<Bytes> {
        let _enter = self.span.enter();

        let addr = self.index.lookup(vid)?;
        if let Some(meta) = &addr.cached {
            return Ok(meta.clone());
        }
        if !addr.is_on_disk() {
            return Err(DiskError::NotFound(*vid));
        }

        let meta_len = addr
            .disk_length
            .checked_sub(addr.disk_offset)
            .ok_or_else(|| bad_location(&addr))?;
        let group = self.read_range(
            addr.disk_address + u64::from(addr.disk_offset),
            meta_len as usize,
        )?;
        let meta = self.checked_metadata(vid, &group)?;
        self.index.set_cached(vid, meta.clone())?;
        Ok(meta)
    }

    /// File data of `vid` (empty for metadata-only records).
    ///
    /// Data and metadata are read in one request.
    pub fn read_data(&self, vid: &Vid) -> Result<Bytes> {
        let _enter = self.span.enter();

        let addr = self.index.lookup(vid)?;
        if !addr.is_on_disk() {
            return Err(DiskError::NotFound(*vid));
        }
        if !addr.has_data() {
            return Ok(Bytes::new());
        }

        let range = self.read_range(addr.disk_address, addr.disk_length as usize)?;
        let split = addr.disk_offset as usize;
        let group = range.get(split..).ok_or_else(|| bad_location(&addr))?;
        let (_, trailer) = split_meta_group(group)?;
        if trailer.vid != *vid {
            return Err(DiskError::Format(format!(
                "record at {:#x} belongs to {}, not {}",
                addr.disk_address, trailer.vid, vid
            )));
        }
        let data_len = trailer.data_length as usize;
        if data_len > split {
            return Err(DiskError::Format(format!(
                "data length {} exceeds {} data bytes",
                data_len, split
            )));
        }
        Ok(range.slice(..data_len))
    }

    fn checked_metadata(&self, vid: &Vid, group: &[u8]) -> Result<Bytes> {
        let (meta, trailer) = split_meta_group(group)?;
        if trailer.vid != *vid {
            return Err(DiskError::Format(format!(
                "metadata belongs to {}, not {}",
                trailer.vid, vid
            )));
        }
        Ok(Bytes::copy_from_slice(meta))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Reserve `len` bytes of log space (rounded up to blocks).
    ///
    /// If the open arena cannot hold the request it is sealed and the
    /// allocation continues in the next arena; sealing rewrites the index.
    pub fn allocate(&self, len: u64) -> Result<u64> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        let allocation = writer.allocator.allocate(len)?;
        debug!(
            address = allocation.address,
            length = allocation.length,
            arena = allocation.arena,
            "allocated"
        );
        if allocation.sealed {
            self.flush_locked(&mut writer)?;
        }
        Ok(allocation.address)
    }

    /// Record where `vid` lives.
    ///
    /// Fails with `DuplicateKey` if `vid` is already present.
    pub fn commit(&self, vid: Vid, addr: Metaaddr) -> Result<()> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        if addr.disk_offset > addr.disk_length {
            return Err(bad_location(&addr));
        }
        if addr.is_on_disk() {
            let sup = writer.superblock.current();
            let region_end = sup.arena_region_start + sup.arena_region_size();
            let end = addr.disk_address.checked_add(u64::from(addr.disk_length));
            if addr.disk_address < sup.arena_region_start
                || end.map_or(true, |end| end > region_end)
            {
                return Err(DiskError::Size(format!(
                    "{:#x}+{:#x} lies outside the arena region",
                    addr.disk_address, addr.disk_length
                )));
            }
        }

        self.index.insert(vid, addr)?;
        self.after_commit(&mut writer, false)
    }

    /// Append a record holding `data` followed by `meta` and commit it.
    ///
    /// The duplicate check happens before any log space is consumed.
    pub fn write_file(&self, vid: Vid, kind: FileKind, data: &[u8], meta: &[u8]) -> Result<Metaaddr> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        if self.index.contains(&vid) {
            return Err(DiskError::DuplicateKey(vid));
        }

        let block_size = u64::from(writer.superblock.current().block_size);
        let layout = RecordLayout::new(data.len(), meta.len(), block_size)?;
        let allocation = writer.allocator.allocate(layout.total_len())?;

        let image = encode_record(&layout, vid, kind, MetaState::Clean, data, meta);
        self.device.write_at(allocation.address, &image)?;

        let addr = layout.metaaddr(allocation.address);
        self.index.insert(vid, addr.clone())?;
        debug!(
            vid = %vid,
            address = allocation.address,
            blocks = layout.payload_blocks(),
            "file written"
        );

        self.after_commit(&mut writer, allocation.sealed)?;
        Ok(addr)
    }

    fn after_commit(&self, writer: &mut Writer, sealed: bool) -> Result<()> {
        writer.pending += 1;
        let threshold = match self.config.index_flush_strategy {
            IndexFlushStrategy::OnSeal => false,
            IndexFlushStrategy::EveryNCommits { count } => writer.pending >= count,
        };
        if sealed || threshold {
            self.flush_locked(writer)?;
        }
        Ok(())
    }

    /// Rewrite the arena table and index and sync the device
    pub fn flush(&self) -> Result<()> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();
        self.flush_locked(&mut writer)
    }

    /// Internal flush implementation (called with the writer lock held).
    ///
    /// The arena table is durable before the index, so every indexed record
    /// lies below a persisted write cursor. A crash in between leaks log
    /// space; indexed records are never reallocated.
    fn flush_locked(&self, writer: &mut Writer) -> Result<()> {
        let sup = writer.superblock.current();
        writer.allocator.table().flush(self.device.as_ref(), sup)?;
        self.device.sync()?;
        let written = self.index.flush(self.device.as_ref(), sup)?;
        self.device.sync()?;

        debug!(entries = written, pending = writer.pending, "flushed");
        writer.pending = 0;
        Ok(())
    }

    /// Flush, then record the current log position in the superblock.
    ///
    /// Returns the snapshot offset.
    pub fn snapshot(&self) -> Result<u64> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        self.flush_locked(&mut writer)?;
        let position = writer.allocator.log_position();
        writer
            .superblock
            .update(self.device.as_ref(), |s| s.last_snapshot_offset = position)?;

        info!(offset = position, "snapshot");
        Ok(position)
    }

    /// Make `vid` the root of the file system
    pub fn set_root(&self, vid: Vid) -> Result<()> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        if !self.index.contains(&vid) {
            return Err(DiskError::NotFound(vid));
        }
        writer
            .superblock
            .update(self.device.as_ref(), |s| s.root_vid = vid)?;

        info!(root = %vid, "root set");
        Ok(())
    }

    /// Seal the open arena so the next write starts a fresh one
    pub fn seal_open_arena(&self) -> Result<bool> {
        let _enter = self.span.enter();
        let mut writer = self.writer.lock();

        if !writer.allocator.seal_open() {
            return Ok(false);
        }
        self.flush_locked(&mut writer)?;
        Ok(true)
    }

    /// Close the disk gracefully
    ///
    /// Flushes the arena table and index; the device is closed on drop.
    pub fn close(self) -> Result<()> {
        self.unmount().map(drop)
    }

    /// Flush and hand the device back to the caller
    pub fn unmount(self) -> Result<Box<dyn BlockDevice>> {
        self.flush()?;
        self.span.in_scope(|| info!("closed"));
        Ok(self.device)
    }

    /// Give up the device without flushing.
    ///
    /// Commits since the last flush are not persisted, exactly as if the
    /// process had stopped here.
    pub fn into_device(self) -> Box<dyn BlockDevice> {
        let pending = self.writer.lock().pending;
        self.span.in_scope(|| debug!(pending, "device released unflushed"));
        self.device
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Records appended to arena `id`, up to its write cursor
    pub fn scan_arena(&self, id: usize) -> Result<Vec<Record>> {
        let (arena, block_size) = {
            let writer = self.writer.lock();
            let table = writer.allocator.table();
            let arena = table
                .get(id)
                .cloned()
                .ok_or_else(|| DiskError::Size(format!("no arena {}", id)))?;
            (arena, table.block_size())
        };
        RecordIter::new(self.device.as_ref(), &arena, block_size).collect()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Copy of the live superblock
    pub fn superblock(&self) -> Super {
        self.writer.lock().superblock.current().clone()
    }

    /// Copy of the arena states
    pub fn arenas(&self) -> Vec<Arena> {
        self.writer.lock().allocator.table().arenas().to_vec()
    }

    /// Vid of the root
    pub fn root(&self) -> Vid {
        self.writer.lock().superblock.current().root_vid
    }

    /// Number of indexed file versions
    pub fn file_count(&self) -> usize {
        self.index.len()
    }

    /// Maximum number of file versions the index region holds
    pub fn index_capacity(&self) -> usize {
        self.index.capacity()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn bad_location(addr: &Metaaddr) -> DiskError {
    DiskError::Format(format!(
        "metadata offset {:#x} past record length {:#x} at {:#x}",
        addr.disk_offset, addr.disk_length, addr.disk_address
    ))
}
