//! Identifier and location types shared by every layer.
//!
//! A file is named across servers by an [`Xid`]; one immutable version of its
//! content is named by a [`Vid`], the primary key of the engine.

use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};

/// Identifier of the server that owns a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ServerId(pub u64);

/// Server-local file identifier (not to be confused with a protocol Fid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FileId(pub u64);

/// Version of a file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct VersionId(pub i64);

/// A file, named across servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Xid {
    pub server: ServerId,
    pub file: FileId,
}

/// One immutable version of a file.
///
/// Field order gives the derived `Ord` the `(server, file, version)` key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Vid {
    pub xid: Xid,
    pub version: VersionId,
}

/// Encoded width of a Vid: server (8) + file (8) + version (8)
pub const VID_SIZE: usize = 24;

impl Vid {
    pub fn new(server: u64, file: u64, version: i64) -> Self {
        Self {
            xid: Xid {
                server: ServerId(server),
                file: FileId(file),
            },
            version: VersionId(version),
        }
    }

    pub fn server(&self) -> ServerId {
        self.xid.server
    }

    pub fn file(&self) -> FileId {
        self.xid.file
    }

    pub(crate) fn put(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.xid.server.0);
        buf.put_u64(self.xid.file.0);
        buf.put_i64(self.version.0);
    }

    /// Caller guarantees `buf.remaining() >= VID_SIZE`
    pub(crate) fn get(buf: &mut impl Buf) -> Self {
        let server = buf.get_u64();
        let file = buf.get_u64();
        let version = buf.get_i64();
        Self::new(server, file, version)
    }
}

impl fmt::Display for Vid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}.{:#x}.{}",
            self.xid.server.0, self.xid.file.0, self.version.0
        )
    }
}

/// On-disk index record: where a file version's metadata begins and how much
/// to read. `disk_length == 0` means the version is not committed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indexelem {
    pub vid: Vid,
    pub disk_address: u64,
    pub disk_offset: u32,
    pub disk_length: u32,
}

/// Encoded width of an Indexelem: Vid (24) + address (8) + offset (4) + length (4)
pub const INDEXELEM_SIZE: usize = VID_SIZE + 16;

impl Indexelem {
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.vid.put(buf);
        buf.put_u64(self.disk_address);
        buf.put_u32(self.disk_offset);
        buf.put_u32(self.disk_length);
    }

    /// Caller guarantees `buf.remaining() >= INDEXELEM_SIZE`
    pub fn decode(buf: &mut impl Buf) -> Self {
        let vid = Vid::get(buf);
        Self {
            vid,
            disk_address: buf.get_u64(),
            disk_offset: buf.get_u32(),
            disk_length: buf.get_u32(),
        }
    }
}

/// Result of an index lookup.
///
/// Many files are written whole: data followed by metadata. `disk_address`
/// is where to start reading, `disk_offset` (when non-zero) is where the
/// metadata starts, so data is included in the range, and `disk_length` is
/// how much to read from `disk_address` to get all of the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metaaddr {
    pub disk_address: u64,
    pub disk_offset: u32,
    pub disk_length: u32,
    /// In-memory copy of the metadata, if cached
    pub cached: Option<Bytes>,
}

impl Metaaddr {
    pub fn on_disk(disk_address: u64, disk_offset: u32, disk_length: u32) -> Self {
        Self {
            disk_address,
            disk_offset,
            disk_length,
            cached: None,
        }
    }

    pub fn is_on_disk(&self) -> bool {
        self.disk_length != 0
    }

    /// Length of the cached copy; 0 when not cached
    pub fn mem_length(&self) -> usize {
        self.cached.as_ref().map_or(0, |b| b.len())
    }

    pub fn has_data(&self) -> bool {
        self.disk_offset != 0
    }

    pub fn to_indexelem(&self, vid: Vid) -> Indexelem {
        Indexelem {
            vid,
            disk_address: self.disk_address,
            disk_offset: self.disk_offset,
            disk_length: self.disk_length,
        }
    }
}

impl From<Indexelem> for Metaaddr {
    fn from(e: Indexelem) -> Self {
        Self::on_disk(e.disk_address, e.disk_offset, e.disk_length)
    }
}
