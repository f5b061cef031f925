//! SSTable Reader
//!
//! Opens SSTable files and answers point lookups through the sparse index:
//! binary search for the closest sampled key at or before the target, then a
//! short forward scan of at most `index_interval` entries.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{StorageError, StorageResult};

use super::iterator::SSTableIterator;
use super::{
    le_u32, le_u64, ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, TOMBSTONE_MARKER,
    VERSION,
};

/// Chunk size used when verifying the data checksum
const VERIFY_CHUNK: usize = 64 * 1024;

/// Reader for SSTable files
///
/// The file handle sits behind a mutex so lookups only need `&self`; the
/// partition can then serve reads under a shared lock.
pub struct SSTableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    /// Sparse index: sampled key → file offset, sorted by key
    index: Vec<(Vec<u8>, u64)>,
    entry_count: u64,
    /// Index block starting offset (end of the data block)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header and footer, checks the data CRC, and loads the sparse
    /// index into memory.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(StorageError::Corruption(format!(
                "SSTable {} is truncated ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StorageError::Corruption(format!(
                "Invalid SSTable magic: expected SPKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StorageError::Corruption(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let entry_count = le_u64(&header[6..14]);

        // Read footer
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer[0..8]);
        let data_crc = le_u32(&footer[8..12]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(StorageError::Corruption(format!(
                "SSTable {} has index offset {} outside the file",
                path.display(),
                index_offset
            )));
        }

        Self::verify_data_crc(&mut file, index_offset, data_crc, path)?;

        // Load sparse index
        let index_block_size = (file_size - FOOTER_SIZE - index_offset) as usize;
        let mut index_data = vec![0u8; index_block_size];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut index_data)?;
        let index = Self::parse_index(&index_data, path)?;

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            file_size,
        })
    }

    fn verify_data_crc(
        file: &mut File,
        index_offset: u64,
        expected: u32,
        path: &Path,
    ) -> StorageResult<()> {
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut chunk = vec![0u8; VERIFY_CHUNK];
        while remaining > 0 {
            let len = remaining.min(VERIFY_CHUNK as u64) as usize;
            file.read_exact(&mut chunk[..len])?;
            hasher.update(&chunk[..len]);
            remaining -= len as u64;
        }

        let actual = hasher.finalize();
        if actual != expected {
            return Err(StorageError::Corruption(format!(
                "SSTable {} data CRC mismatch: expected {:08x}, got {:08x}",
                path.display(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    /// Parse index entries: [key_len(4)][offset(8)][key]
    fn parse_index(data: &[u8], path: &Path) -> StorageResult<Vec<(Vec<u8>, u64)>> {
        let mut index = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            if pos + 12 > data.len() {
                return Err(StorageError::Corruption(format!(
                    "SSTable {} has a truncated index entry",
                    path.display()
                )));
            }
            let key_len = le_u32(&data[pos..pos + 4]) as usize;
            let offset = le_u64(&data[pos + 4..pos + 12]);
            pos += 12;

            if pos + key_len > data.len() {
                return Err(StorageError::Corruption(format!(
                    "SSTable {} has a truncated index key",
                    path.display()
                )));
            }
            index.push((data[pos..pos + key_len].to_vec(), offset));
            pos += key_len;
        }
        Ok(index)
    }

    /// Get a value by key
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with value
    /// - `Ok(None)` — key found but is a tombstone (deleted)
    /// - `Err(KeyNotFound)` — key not in this SSTable
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if !self.might_contain(key) {
            return Err(StorageError::KeyNotFound);
        }

        // Last sample whose key is <= the target
        let slot = self.index.partition_point(|(k, _)| k.as_slice() <= key);
        if slot == 0 {
            return Err(StorageError::KeyNotFound);
        }
        let mut offset = self.index[slot - 1].1;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; ENTRY_HEADER_SIZE];
        let mut entry_key = Vec::new();
        while offset < self.index_offset {
            file.read_exact(&mut header)?;
            let key_len = le_u32(&header[0..4]) as usize;
            let val_len = le_u32(&header[4..8]);

            entry_key.resize(key_len, 0);
            file.read_exact(&mut entry_key)?;

            let value_len = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as usize };

            match entry_key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => {
                    if val_len == TOMBSTONE_MARKER {
                        return Ok(None);
                    }
                    let mut value = vec![0u8; value_len];
                    file.read_exact(&mut value)?;
                    return Ok(Some(value));
                }
                // Keys are sorted: we walked past where it would be
                std::cmp::Ordering::Greater => return Err(StorageError::KeyNotFound),
                std::cmp::Ordering::Less => {
                    file.seek_relative(value_len as i64)?;
                }
            }

            offset += (ENTRY_HEADER_SIZE + key_len + value_len) as u64;
        }

        Err(StorageError::KeyNotFound)
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.first().map(|(k, _)| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.last().map(|(k, _)| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Number of keys held in the in-memory index
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Create an iterator over all entries
    ///
    /// The iterator opens its own file handle, so it is independent of
    /// lookups on this reader and stays valid if the file is later unlinked.
    pub fn iter(&self) -> StorageResult<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }
}
