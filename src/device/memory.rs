//! In-memory block device for tests, benches and tooling.

use std::io;

use parking_lot::RwLock;

use super::{check_range, BlockDevice};

/// A block device backed by a byte vector
pub struct MemDevice {
    data: RwLock<Vec<u8>>,
}

impl MemDevice {
    /// Create a zero-filled device of `size` bytes
    pub fn new(size: u64) -> Self {
        Self {
            data: RwLock::new(vec![0u8; size as usize]),
        }
    }

    /// Wrap existing bytes (e.g. a copy of another device)
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Copy of the current contents
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl BlockDevice for MemDevice {
    fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.read();
        check_range(data.len() as u64, offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.data.write();
        check_range(data.len() as u64, offset, buf.len())?;
        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
