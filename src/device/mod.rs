//! Block Device Module
//!
//! Raw, byte-addressable backing store for a disk.
//!
//! ## Responsibilities
//! - Positioned reads and writes anywhere on the device
//! - Report the device length (fixed for the lifetime of a mount)
//! - Push written bytes to stable storage on `sync`
//!
//! A device is owned by exactly one `Disk`; dropping the disk closes it.

mod file;
mod memory;

use std::io;

pub use file::FileDevice;
pub use memory::MemDevice;

/// Positioned I/O against a fixed-size backing store
pub trait BlockDevice: Send + Sync {
    /// Device length in bytes
    fn len(&self) -> u64;

    /// Fill `buf` from `offset`; short reads are errors
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `buf` at `offset`
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Flush written data to stable storage
    fn sync(&self) -> io::Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject ranges that run past the end of the device
pub(crate) fn check_range(len: u64, offset: u64, count: usize) -> io::Result<()> {
    match offset.checked_add(count as u64) {
        Some(end) if end <= len => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "range {:#x}+{:#x} past end of device ({:#x})",
                offset, count, len
            ),
        )),
    }
}
