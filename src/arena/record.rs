//! Log records
//!
//! ```text
//! ┌──────────────────────────────────────────────┐ block boundary
//! │ kind u8 | length u16 (payload blocks)  | pad │
//! ├──────────────────────────────────────────────┤ block boundary
//! │ [data]  k blocks (k = 0 for metadata only)   │
//! ├──────────────────────────────────────────────┤ block boundary
//! │ metadata, m blocks; the last 32 bytes are:   │
//! │   meta_length u16 | Vid (24) | kind u8 |     │
//! │   state u8 | data_length u32                 │
//! └──────────────────────────────────────────────┘ block boundary
//! ```
//!
//! A record with `length == 0` carries no payload.

use bytes::{Buf, BufMut};

use crate::device::BlockDevice;
use crate::error::{DiskError, Result};
use crate::types::{Metaaddr, Vid};

use super::segment::Arena;

/// Kind (1) + Length (2)
pub const RECORD_HEADER_SIZE: usize = 3;

/// Trailer at the end of the metadata group
pub const META_TRAILER_SIZE: usize = 2 + 24 + 1 + 1 + 4;

/// What a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Data blocks followed by metadata
    File = 1,
    /// Metadata only
    Meta = 2,
}

impl RecordKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(RecordKind::File),
            2 => Some(RecordKind::Meta),
            _ => None,
        }
    }
}

/// Type of the stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileKind {
    File = 0,
    Dir = 1,
    Tmp = 2,
}

impl FileKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(FileKind::File),
            1 => Some(FileKind::Dir),
            2 => Some(FileKind::Tmp),
            _ => None,
        }
    }
}

/// Cache state of the stored metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetaState {
    Clean = 0,
    Dirty = 1,
    Cached = 2,
}

impl MetaState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MetaState::Clean),
            1 => Some(MetaState::Dirty),
            2 => Some(MetaState::Cached),
            _ => None,
        }
    }
}

/// Leading record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    /// Payload blocks following the header block
    pub length: u16,
}

impl RecordHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.kind as u8);
        buf.put_u16(self.length);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Err(DiskError::Format("record header truncated".into()));
        }
        let kind = buf.get_u8();
        let kind = RecordKind::from_u8(kind)
            .ok_or_else(|| DiskError::Format(format!("bad record kind {}", kind)))?;
        Ok(Self {
            kind,
            length: buf.get_u16(),
        })
    }
}

/// Trailer closing the metadata group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaTrailer {
    /// Metadata bytes at the start of the group
    pub meta_length: u16,
    pub vid: Vid,
    pub kind: FileKind,
    pub state: MetaState,
    /// Exact file data length (data blocks are zero padded)
    pub data_length: u32,
}

impl MetaTrailer {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.meta_length);
        self.vid.put(buf);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.state as u8);
        buf.put_u32(self.data_length);
    }

    /// Decode from the last `META_TRAILER_SIZE` bytes of `tail`
    pub fn decode(tail: &[u8]) -> Result<Self> {
        if tail.len() < META_TRAILER_SIZE {
            return Err(DiskError::Format("metadata group truncated".into()));
        }
        let mut buf = &tail[tail.len() - META_TRAILER_SIZE..];
        let meta_length = buf.get_u16();
        let vid = Vid::get(&mut buf);
        let kind = buf.get_u8();
        let state = buf.get_u8();
        let data_length = buf.get_u32();

        Ok(Self {
            meta_length,
            vid,
            kind: FileKind::from_u8(kind)
                .ok_or_else(|| DiskError::Format(format!("bad file kind {}", kind)))?,
            state: MetaState::from_u8(state)
                .ok_or_else(|| DiskError::Format(format!("bad metadata state {}", state)))?,
            data_length,
        })
    }
}

/// Block geometry of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub data_blocks: u64,
    pub meta_blocks: u64,
    pub block_size: u64,
}

impl RecordLayout {
    pub fn new(data_len: usize, meta_len: usize, block_size: u64) -> Result<Self> {
        if meta_len > usize::from(u16::MAX) {
            return Err(DiskError::Size(format!("metadata of {} bytes too large", meta_len)));
        }
        if data_len as u64 > u64::from(u32::MAX) {
            return Err(DiskError::Size(format!("data of {} bytes too large", data_len)));
        }

        let data_blocks = (data_len as u64).div_ceil(block_size);
        let meta_blocks = ((meta_len + META_TRAILER_SIZE) as u64).div_ceil(block_size);
        if data_blocks + meta_blocks > u64::from(u16::MAX) {
            return Err(DiskError::Size(format!(
                "record of {} blocks exceeds {}",
                data_blocks + meta_blocks,
                u16::MAX
            )));
        }
        let payload = (data_blocks + meta_blocks) * block_size;
        if payload > u64::from(u32::MAX) {
            return Err(DiskError::Size(format!(
                "record payload of {} bytes exceeds {}",
                payload,
                u32::MAX
            )));
        }

        Ok(Self {
            data_blocks,
            meta_blocks,
            block_size,
        })
    }

    /// Layout of a record whose header announces `length` payload blocks and
    /// whose trailer announces `meta_length` bytes of metadata
    fn from_parts(length: u16, meta_length: u16, block_size: u64) -> Result<Self> {
        let meta_bytes = (usize::from(meta_length) + META_TRAILER_SIZE) as u64;
        let meta_blocks = meta_bytes.div_ceil(block_size);
        let total = u64::from(length);
        if meta_blocks > total {
            return Err(DiskError::Format(format!(
                "metadata needs {} blocks, record has {}",
                meta_blocks, total
            )));
        }
        Ok(Self {
            data_blocks: total - meta_blocks,
            meta_blocks,
            block_size,
        })
    }

    pub fn payload_blocks(&self) -> u64 {
        self.data_blocks + self.meta_blocks
    }

    /// Header block + payload, in bytes
    pub fn total_len(&self) -> u64 {
        (1 + self.payload_blocks()) * self.block_size
    }

    pub fn kind(&self) -> RecordKind {
        if self.data_blocks > 0 {
            RecordKind::File
        } else {
            RecordKind::Meta
        }
    }

    /// Location of the metadata of a record written at `record_address`
    pub fn metaaddr(&self, record_address: u64) -> Metaaddr {
        let payload = record_address + self.block_size;
        let data_len = self.data_blocks * self.block_size;
        let meta_len = self.meta_blocks * self.block_size;
        Metaaddr::on_disk(payload, data_len as u32, (data_len + meta_len) as u32)
    }
}

/// Build the full on-disk image of a record
pub fn encode_record(
    layout: &RecordLayout,
    vid: Vid,
    kind: FileKind,
    state: MetaState,
    data: &[u8],
    meta: &[u8],
) -> Vec<u8> {
    let bsize = layout.block_size as usize;
    let mut image = Vec::with_capacity(layout.total_len() as usize);

    RecordHeader {
        kind: layout.kind(),
        length: layout.payload_blocks() as u16,
    }
    .encode(&mut image);
    image.resize(bsize, 0);

    image.extend_from_slice(data);
    image.resize(bsize * (1 + layout.data_blocks as usize), 0);

    image.extend_from_slice(meta);
    image.resize(layout.total_len() as usize - META_TRAILER_SIZE, 0);
    MetaTrailer {
        meta_length: meta.len() as u16,
        vid,
        kind,
        state,
        data_length: data.len() as u32,
    }
    .encode(&mut image);

    debug_assert_eq!(image.len() as u64, layout.total_len());
    image
}

/// A record found by scanning an arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Address of the header block
    pub address: u64,
    pub header: RecordHeader,
    /// `None` for payload-less records
    pub trailer: Option<MetaTrailer>,
    /// Where the metadata lives, as the index would hold it
    pub location: Option<Metaaddr>,
}

/// Iterator over the records of an arena, up to its write cursor.
///
/// Space handed out by raw allocations that was never filled with a record
/// stops the scan with a `Format` error.
pub struct RecordIter<'a> {
    device: &'a dyn BlockDevice,
    block_size: u64,
    pos: u64,
    end: u64,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    pub fn new(device: &'a dyn BlockDevice, arena: &Arena, block_size: u64) -> Self {
        Self {
            device,
            block_size,
            pos: arena.start,
            end: arena.cursor(),
            failed: false,
        }
    }

    fn read_record(&mut self) -> Result<Record> {
        let mut block = vec![0u8; self.block_size as usize];
        self.device.read_at(self.pos, &mut block)?;
        let header = RecordHeader::decode(&block)?;
        let address = self.pos;

        if header.length == 0 {
            self.pos += self.block_size;
            return Ok(Record {
                address,
                header,
                trailer: None,
                location: None,
            });
        }

        let record_end = address + (1 + u64::from(header.length)) * self.block_size;
        if record_end > self.end {
            return Err(DiskError::Format(format!(
                "record at {:#x} runs past write cursor {:#x}",
                address, self.end
            )));
        }

        // The trailer sits at the end of the last block
        self.device.read_at(record_end - self.block_size, &mut block)?;
        let trailer = MetaTrailer::decode(&block)?;
        let layout = RecordLayout::from_parts(header.length, trailer.meta_length, self.block_size)?;

        self.pos = record_end;
        Ok(Record {
            address,
            header,
            trailer: Some(trailer),
            location: Some(layout.metaaddr(address)),
        })
    }
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.end {
            return None;
        }
        let record = self.read_record();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}

/// Split a metadata group read from disk into its metadata bytes and trailer
pub fn split_meta_group(group: &[u8]) -> Result<(&[u8], MetaTrailer)> {
    let trailer = MetaTrailer::decode(group)?;
    let meta_len = usize::from(trailer.meta_length);
    if meta_len > group.len() - META_TRAILER_SIZE {
        return Err(DiskError::Format(format!(
            "metadata length {} exceeds group of {} bytes",
            meta_len,
            group.len()
        )));
    }
    Ok((&group[..meta_len], trailer))
}
