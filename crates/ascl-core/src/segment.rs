use crate::types::align_to;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    pub addr: u32,
    pub bytes: Vec<u8>,
}

impl SegmentEntry {
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn end(&self) -> u32 {
        self.addr + self.len()
    }
}

/// Constant data shared by every function of a module. Identical blobs are
/// stored once; entries are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSegment {
    entries: Vec<SegmentEntry>,
    offset: u32,
}

impl DataSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the address of `bytes` in the segment, appending it if no
    /// identical blob is present yet.
    pub fn add_blob(&mut self, bytes: &[u8]) -> u32 {
        if let Some(entry) = self.entries.iter().find(|e| e.bytes == bytes) {
            trace!(addr = entry.addr, len = bytes.len(), "data segment hit");
            return entry.addr;
        }

        let align = if bytes.len() <= 4 { 4 } else { 8 };
        let addr = align_to(self.offset, align);

        self.entries.push(SegmentEntry {
            addr,
            bytes: bytes.to_vec(),
        });
        self.offset = addr + bytes.len() as u32;

        trace!(addr, len = bytes.len(), "data segment miss");
        addr
    }

    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First free byte after the last entry.
    pub fn size(&self) -> u32 {
        self.offset
    }

    pub fn lookup(&self, addr: u32) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.addr == addr)
            .map(|e| e.bytes.as_slice())
    }
}
