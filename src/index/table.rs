//! Index implementation
//!
//! BTreeMap keyed by Vid, behind an RwLock: lookups share the read lock,
//! inserts and cache updates take the write lock briefly.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes};
use parking_lot::RwLock;
use tracing::debug;

use crate::device::BlockDevice;
use crate::error::{DiskError, Result};
use crate::superblock::Super;
use crate::types::{Indexelem, Metaaddr, Vid, VersionId, Xid};

use super::{INDEX_ENTRY_SIZE, INDEX_HEADER_SIZE, INDEX_MAGIC};

/// In-memory index of every committed file version
#[derive(Debug)]
pub struct Index {
    entries: RwLock<BTreeMap<Vid, Metaaddr>>,
    /// Entries the on-disk region can hold
    capacity: usize,
}

impl Index {
    /// An empty index sized for a region of `region_size` bytes
    pub fn new(region_size: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: Self::capacity_for(region_size),
        }
    }

    /// Number of entries a region of `region_size` bytes holds
    pub fn capacity_for(region_size: u64) -> usize {
        (region_size.saturating_sub(INDEX_HEADER_SIZE as u64) / INDEX_ENTRY_SIZE as u64) as usize
    }

    /// Read the whole index region described by `sup`
    pub fn load(device: &dyn BlockDevice, sup: &Super) -> Result<Self> {
        let index = Self::new(sup.index_size);

        let mut header = [0u8; INDEX_HEADER_SIZE];
        device.read_at(sup.index_location(), &mut header)?;
        let mut buf = &header[..];
        let magic = buf.get_u32();
        let count = buf.get_u64();
        let crc = buf.get_u32();

        if magic != INDEX_MAGIC {
            return Err(DiskError::Format(format!("bad index magic {:#010x}", magic)));
        }
        if count > index.capacity as u64 {
            return Err(DiskError::Format(format!(
                "index claims {} entries, region holds {}",
                count, index.capacity
            )));
        }

        let mut body = vec![0u8; count as usize * INDEX_ENTRY_SIZE];
        device.read_at(sup.index_location() + INDEX_HEADER_SIZE as u64, &mut body)?;
        if crc32fast::hash(&body) != crc {
            return Err(DiskError::Format("index checksum mismatch".into()));
        }

        {
            let mut entries = index.entries.write();
            for mut chunk in body.chunks_exact(INDEX_ENTRY_SIZE) {
                let elem = Indexelem::decode(&mut chunk);
                if entries.insert(elem.vid, Metaaddr::from(elem)).is_some() {
                    return Err(DiskError::Format(format!(
                        "index lists {} more than once",
                        elem.vid
                    )));
                }
            }
        }

        debug!(entries = count, capacity = index.capacity, "index loaded");
        Ok(index)
    }

    /// Rewrite the whole index region. Entries not on disk are skipped.
    ///
    /// Returns the number of entries written.
    pub fn flush(&self, device: &dyn BlockDevice, sup: &Super) -> Result<usize> {
        let mut body = Vec::new();
        let mut count = 0usize;
        {
            let entries = self.entries.read();
            body.reserve(entries.len() * INDEX_ENTRY_SIZE);
            for (vid, addr) in entries.iter().filter(|(_, a)| a.is_on_disk()) {
                addr.to_indexelem(*vid).encode(&mut body);
                count += 1;
            }
        }

        let mut image = Vec::with_capacity(INDEX_HEADER_SIZE + body.len());
        image.put_u32(INDEX_MAGIC);
        image.put_u64(count as u64);
        image.put_u32(crc32fast::hash(&body));
        image.extend_from_slice(&body);

        if image.len() as u64 > sup.index_size {
            return Err(DiskError::Size(format!(
                "index of {} bytes exceeds region of {} bytes",
                image.len(),
                sup.index_size
            )));
        }
        device.write_at(sup.index_location(), &image)?;

        debug!(entries = count, bytes = image.len(), "index flushed");
        Ok(count)
    }

    /// Location of `vid`, or `NotFound`
    pub fn lookup(&self, vid: &Vid) -> Result<Metaaddr> {
        self.get(vid).ok_or(DiskError::NotFound(*vid))
    }

    pub fn get(&self, vid: &Vid) -> Option<Metaaddr> {
        self.entries.read().get(vid).cloned()
    }

    pub fn contains(&self, vid: &Vid) -> bool {
        self.entries.read().contains_key(vid)
    }

    /// Add a new version. Existing keys are never overwritten.
    pub fn insert(&self, vid: Vid, addr: Metaaddr) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(&vid) {
            return Err(DiskError::DuplicateKey(vid));
        }
        if entries.len() >= self.capacity {
            return Err(DiskError::Size(format!(
                "index full ({} entries)",
                self.capacity
            )));
        }
        entries.insert(vid, addr);
        Ok(())
    }

    /// Attach an in-memory copy of the metadata of `vid`
    pub fn set_cached(&self, vid: &Vid, meta: Bytes) -> Result<()> {
        let mut entries = self.entries.write();
        let addr = entries.get_mut(vid).ok_or(DiskError::NotFound(*vid))?;
        addr.cached = Some(meta);
        Ok(())
    }

    /// Newest version of a file
    pub fn latest(&self, xid: Xid) -> Option<(Vid, Metaaddr)> {
        let entries = self.entries.read();
        entries
            .range(Self::version_range(xid))
            .next_back()
            .map(|(v, a)| (*v, a.clone()))
    }

    /// All versions of a file, oldest first
    pub fn versions(&self, xid: Xid) -> Vec<Vid> {
        let entries = self.entries.read();
        entries
            .range(Self::version_range(xid))
            .map(|(v, _)| *v)
            .collect()
    }

    fn version_range(xid: Xid) -> std::ops::RangeInclusive<Vid> {
        Vid {
            xid,
            version: VersionId(i64::MIN),
        }..=Vid {
            xid,
            version: VersionId(i64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
