//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};

use super::{SSTable, HEADER_SIZE, MAGIC, MAX_ENTRY_BYTES, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Sparse index: every `index_interval`-th key → file offset of entry
    index: Vec<(Vec<u8>, u64)>,
    index_interval: u64,
    /// Track min/max keys for metadata; `last` also enforces sort order
    min_key: Option<Vec<u8>>,
    last: Option<(Vec<u8>, u64)>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()`/`add_tombstone()` in strictly
    /// increasing key order, then `finish()` to write index and footer.
    pub fn new(path: &Path, index_interval: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Write header (entry_count placeholder, will be updated in finish)
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            index_interval: index_interval.max(1) as u64,
            min_key: None,
            last: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a key-value pair (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> StorageResult<()> {
        self.write_entry(key, None)
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> StorageResult<()> {
        let longest = key.len().max(value.map_or(0, <[u8]>::len));
        if longest > MAX_ENTRY_BYTES {
            return Err(StorageError::Corruption(format!(
                "entry of {} bytes does not fit an SSTable in {}",
                longest,
                self.path.display()
            )));
        }
        if let Some((last_key, _)) = &self.last {
            if key <= last_key.as_slice() {
                return Err(StorageError::Corruption(format!(
                    "SSTable keys out of order in {}",
                    self.path.display()
                )));
            }
        }

        let offset = self.current_offset;
        if self.entry_count % self.index_interval == 0 {
            self.index.push((key.to_vec(), offset));
        }
        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.last = Some((key.to_vec(), offset));

        // Prepare entry bytes: [key_len(4)][val_len(4)][key][value]
        let key_len_bytes = (key.len() as u32).to_le_bytes();
        let val_len_bytes = match value {
            Some(v) => v.len() as u32,
            None => TOMBSTONE_MARKER,
        }
        .to_le_bytes();

        self.writer.write_all(&key_len_bytes)?;
        self.writer.write_all(&val_len_bytes)?;
        self.writer.write_all(key)?;

        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);

        let mut entry_size: u64 = 8 + key.len() as u64;

        if let Some(v) = value {
            self.writer.write_all(v)?;
            self.data_hasher.update(v);
            entry_size += v.len() as u64;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write index block, footer, and return metadata
    pub fn finish(mut self) -> StorageResult<SSTable> {
        let index_offset = self.current_offset;

        // The last key is always indexed so readers know the table's range
        if let Some((last_key, last_offset)) = &self.last {
            let indexed = self.index.last().map(|(_, off)| off) == Some(last_offset);
            if !indexed {
                self.index.push((last_key.clone(), *last_offset));
            }
        }

        // Write index block: [key_len(4)][offset(8)][key] for each sample
        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let data_crc = self.data_hasher.finalize();

        // Write footer: index_offset (8) + data_crc (4) + index_interval (4)
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&(self.index_interval as u32).to_le_bytes())?;

        self.writer.flush()?;

        // Seek back and update entry count in header
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.last.map(|(k, _)| k).unwrap_or_default(),
            file_size,
        })
    }
}
