//! Merge Iterator
//!
//! K-way merge of sorted sources into one sorted stream.
//!
//! Sources are passed newest first. When several sources hold the same key,
//! only the newest version is emitted; older versions are skipped. With
//! `keep_tombstones = false` deleted keys disappear from the output, which is
//! what scans and compactions that reach the oldest table want.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::StorageResult;

/// `(key, value)`; a `None` value is a tombstone
pub type MergeEntry = (Vec<u8>, Option<Vec<u8>>);

/// A sorted stream of entries
pub type MergeSource = Box<dyn Iterator<Item = StorageResult<MergeEntry>> + Send>;

struct HeapItem {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    /// Position in the source list; lower is newer
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Sorted, de-duplicated view over several sorted sources
pub struct MergeIterator {
    sources: Vec<MergeSource>,
    heap: BinaryHeap<Reverse<HeapItem>>,
    keep_tombstones: bool,
    failed: bool,
}

impl MergeIterator {
    /// Build a merge over `sources` (newest first)
    ///
    /// Pulls the first entry of every source, so errors opening a source
    /// surface here rather than mid-scan.
    pub fn new(sources: Vec<MergeSource>, keep_tombstones: bool) -> StorageResult<Self> {
        let mut merge = Self {
            sources,
            heap: BinaryHeap::new(),
            keep_tombstones,
            failed: false,
        };
        for source in 0..merge.sources.len() {
            merge.advance(source)?;
        }
        Ok(merge)
    }

    /// Pull the next entry of `source` into the heap
    fn advance(&mut self, source: usize) -> StorageResult<()> {
        if let Some(entry) = self.sources[source].next() {
            let (key, value) = entry?;
            self.heap.push(Reverse(HeapItem { key, value, source }));
        }
        Ok(())
    }

    fn next_entry(&mut self) -> StorageResult<Option<MergeEntry>> {
        while let Some(Reverse(item)) = self.heap.pop() {
            self.advance(item.source)?;

            // Skip shadowed versions of the same key from older sources
            while let Some(Reverse(older)) = self.heap.peek() {
                if older.key != item.key {
                    break;
                }
                let older_source = older.source;
                self.heap.pop();
                self.advance(older_source)?;
            }

            if item.value.is_none() && !self.keep_tombstones {
                continue;
            }
            return Ok(Some((item.key, item.value)));
        }
        Ok(None)
    }
}

impl Iterator for MergeIterator {
    type Item = StorageResult<MergeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
