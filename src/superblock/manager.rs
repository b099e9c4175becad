//! Superblock Manager
//!
//! Keeps the live descriptor and the double-buffer protocol: read both
//! copies at mount, pick the newer one, and write every update to the copy
//! that is *not* current before flipping authority. The previously current
//! copy stays untouched until the next update, so a crash mid-write always
//! leaves one intact copy behind.

use tracing::{debug, info, warn};

use crate::config::{Config, SuperblockPolicy};
use crate::device::BlockDevice;
use crate::error::{DiskError, Result};
use crate::format::{now_nanos, slot_a_offset, slot_b_offset, SUPERBLOCK_SIZE};

use super::{codec, validate, Slot, Super};

/// Owner of the in-memory descriptor
#[derive(Debug)]
pub struct SuperblockManager {
    current: Super,
}

impl SuperblockManager {
    /// Wrap a freshly planned descriptor (nothing is read or written)
    pub fn new(sup: Super) -> Self {
        Self { current: sup }
    }

    /// Write a new format: slot A first, then slot B with a newer timestamp,
    /// so both copies are valid and B is current afterwards
    pub fn format(sup: Super, device: &dyn BlockDevice) -> Result<Self> {
        let mut manager = Self::new(sup);
        manager.current.current = Slot::B;
        manager.persist(device)?;
        manager.update(device, |_| {})?;
        Ok(manager)
    }

    /// Read and validate both copies and select the live one.
    ///
    /// The copy with the strictly greater timestamp wins; equal timestamps
    /// select slot A.
    pub fn load_latest(device: &dyn BlockDevice, config: &Config) -> Result<Self> {
        let now = now_nanos();
        let offset_a = slot_a_offset(config.config_size);

        debug!(
            device_size = device.len(),
            offset = offset_a,
            "reading first superblock"
        );
        let first = read_copy(device, offset_a, now);

        let offset_b = match &first {
            Ok(s) => s.slot_offset(Slot::B),
            Err(_) => slot_b_offset(device.len(), config.block_size),
        };
        debug!(offset = offset_b, "reading second superblock");
        let second = read_copy(device, offset_b, now);

        let chosen = match (first, second) {
            (Ok(a), Ok(b)) => {
                if b.timestamp > a.timestamp {
                    debug!(time = b.timestamp, "second superblock is current");
                    select(b, Slot::B)
                } else {
                    debug!(time = a.timestamp, "first superblock is current");
                    select(a, Slot::A)
                }
            }
            (Err(e), Ok(b)) => match config.superblock_policy {
                SuperblockPolicy::RequireBoth => return Err(e),
                SuperblockPolicy::AllowSingle => {
                    warn!(error = %e, "first superblock invalid, using second");
                    select(b, Slot::B)
                }
            },
            (Ok(a), Err(e)) => match config.superblock_policy {
                SuperblockPolicy::RequireBoth => return Err(e),
                SuperblockPolicy::AllowSingle => {
                    warn!(error = %e, "second superblock invalid, using first");
                    select(a, Slot::A)
                }
            },
            (Err(e), Err(_)) => return Err(e),
        };

        if chosen.total_size > device.len() {
            return Err(DiskError::Size(format!(
                "superblock describes {} bytes, device has {}",
                chosen.total_size,
                device.len()
            )));
        }

        info!(
            slot = ?chosen.current,
            time = chosen.timestamp,
            arenas = chosen.arena_count,
            "superblock loaded"
        );
        Ok(Self { current: chosen })
    }

    /// Write the descriptor to the non-current slot, then flip the flag.
    ///
    /// The descriptor is written as-is; callers that change state go
    /// through [`update`](Self::update), which also advances the timestamp.
    /// On error the flag is unchanged.
    pub fn persist(&mut self, device: &dyn BlockDevice) -> Result<()> {
        let target = self.current.current.other();
        let mut next = self.current.clone();
        next.current = target;

        let offset = next.slot_offset(target);
        let image = codec::encode(&next)?;
        device.write_at(offset, &image)?;
        device.sync()?;

        debug!(slot = ?target, offset, time = next.timestamp, "superblock written");
        self.current = next;
        Ok(())
    }

    /// Apply `f`, stamp a timestamp newer than the previous one, and persist
    pub fn update(&mut self, device: &dyn BlockDevice, f: impl FnOnce(&mut Super)) -> Result<()> {
        let previous = self.current.clone();
        f(&mut self.current);
        self.current.timestamp = now_nanos().max(previous.timestamp + 1);

        if let Err(e) = self.persist(device) {
            self.current = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn current(&self) -> &Super {
        &self.current
    }

    pub fn current_slot(&self) -> Slot {
        self.current.current
    }
}

fn select(mut s: Super, slot: Slot) -> Super {
    s.current = slot;
    s
}

/// Read, decode and validate one copy
fn read_copy(device: &dyn BlockDevice, offset: u64, now: i64) -> Result<Super> {
    let mut slot = vec![0u8; SUPERBLOCK_SIZE as usize];
    device.read_at(offset, &mut slot)?;
    let s = codec::decode(&slot)?;
    validate(&s, now)?;
    Ok(s)
}
