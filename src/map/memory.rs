//! Memory Stage
//!
//! The in-process half of a spillable map. Entries are held as serialized
//! bytes so that a spill is a move, and so the budget accounting matches what
//! the engine will be asked to store.

use std::collections::HashMap;

/// In-memory entries plus the running byte tally
#[derive(Debug, Default)]
pub(crate) struct MemoryStage {
    entries: HashMap<Vec<u8>, Vec<u8>>,
    /// Serialized value bytes written since creation or the last spill.
    /// Cumulative: overwrites and deletes do not decrease it.
    tally: u64,
}

impl MemoryStage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite, returning the new tally
    pub(crate) fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> u64 {
        self.tally += value.len() as u64;
        self.entries.insert(key, value);
        self.tally
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Take every entry out and reset the tally
    pub(crate) fn take_all(&mut self) -> HashMap<Vec<u8>, Vec<u8>> {
        self.tally = 0;
        std::mem::take(&mut self.entries)
    }

    pub(crate) fn iter(&self) -> std::collections::hash_map::Iter<'_, Vec<u8>, Vec<u8>> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn tally(&self) -> u64 {
        self.tally
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.tally = 0;
    }
}
