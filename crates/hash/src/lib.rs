//! Hash index implementation using extensible hashing with overflow chains.
//!
//! Provides O(1) average-case lookups for equality predicates.
//! Only supports exact key matches (no range queries).

use catalog::IndexId;
use common::{DbError, DbResult, PageId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use types::Value;

/// Page size for hash index storage.
const PAGE_SIZE: usize = 4096;

/// Initial number of hash buckets; doubles whenever the load factor exceeds
/// [`REHASH_LOAD_FACTOR`].
const INITIAL_BUCKETS: usize = 256;

/// Maximum entries per bucket before spilling to an overflow page.
const MAX_BUCKET_ENTRIES: usize = 40;

/// Load factor (entries / buckets) above which the index doubles its bucket count and
/// rehashes every entry.
const REHASH_LOAD_FACTOR: f64 = 0.75;

/// Hash index using extensible hashing with overflow chains.
///
/// Layout:
/// - Page 0: Header (num_pages, num_buckets, entry_count)
/// - Pages 1..=num_buckets: Primary buckets
/// - Pages beyond that: Overflow buckets
pub struct HashIndex {
    /// Index identifier from catalog.
    pub index_id: IndexId,
    /// Underlying file for persistence.
    file: File,
    /// Total number of pages allocated.
    num_pages: u64,
    /// Current number of primary buckets (a power of two).
    num_buckets: usize,
    /// Page id of the first primary bucket; moves forward on each rehash since old bucket
    /// pages are left in place (reclaimed only by compaction, matching the storage engine's
    /// tombstone model).
    bucket_base: u64,
    /// Total live entries, tracked to decide when to rehash.
    entry_count: usize,
}

/// A bucket page containing key-value entries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HashBucket {
    /// Key-RecordId pairs stored in this bucket.
    entries: Vec<(Vec<Value>, RecordId)>,
    /// Pointer to overflow bucket page (0 = none).
    overflow: u64,
}

/// Header stored at the beginning of the index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HashHeader {
    num_pages: u64,
    num_buckets: usize,
    bucket_base: u64,
    entry_count: usize,
}

impl HashIndex {
    /// Create a new hash index file.
    pub fn create(path: &Path, index_id: IndexId) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DbError::Storage(format!("failed to create hash index: {}", e)))?;

        let num_buckets = INITIAL_BUCKETS;
        let num_pages = 1 + num_buckets as u64;

        let mut index = Self {
            index_id,
            file,
            num_pages,
            num_buckets,
            bucket_base: 1,
            entry_count: 0,
        };

        index.write_header()?;

        let empty_bucket = HashBucket::default();
        for i in 0..num_buckets {
            index.write_bucket(PageId(1 + i as u64), &empty_bucket)?;
        }

        Ok(index)
    }

    /// Open an existing hash index file.
    pub fn open(path: &Path, index_id: IndexId) -> DbResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| DbError::Storage(format!("failed to open hash index: {}", e)))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))
            .map_err(|e| DbError::Storage(format!("seek error: {}", e)))?;
        file.read_exact(&mut buf)
            .map_err(|e| DbError::Storage(format!("read error: {}", e)))?;

        let header: HashHeader = bincode::serde::decode_from_slice(&buf, bincode::config::legacy())
            .map_err(|e| DbError::Storage(format!("failed to decode header: {}", e)))?
            .0;

        Ok(Self {
            index_id,
            file,
            num_pages: header.num_pages,
            num_buckets: header.num_buckets,
            bucket_base: header.bucket_base,
            entry_count: header.entry_count,
        })
    }

    /// Search for all RecordIds matching the given key.
    pub fn search(&mut self, key: &[Value]) -> DbResult<Vec<RecordId>> {
        let bucket_idx = self.bucket_index(key);
        let mut results = Vec::new();

        let mut page_id = PageId(self.bucket_base + bucket_idx as u64);
        loop {
            let bucket = self.read_bucket(page_id)?;

            for (k, rid) in &bucket.entries {
                if k == key {
                    results.push(*rid);
                }
            }

            if bucket.overflow == 0 {
                break;
            }
            page_id = PageId(bucket.overflow);
        }

        Ok(results)
    }

    /// Insert a key-RecordId pair into the index.
    ///
    /// Triggers a rehash first if the load factor would exceed [`REHASH_LOAD_FACTOR`].
    pub fn insert(&mut self, key: Vec<Value>, rid: RecordId) -> DbResult<()> {
        if (self.entry_count + 1) as f64 / self.num_buckets as f64 > REHASH_LOAD_FACTOR {
            self.rehash()?;
        }

        let bucket_idx = self.bucket_index(&key);
        let primary_page = PageId(self.bucket_base + bucket_idx as u64);

        let mut page_id = primary_page;
        loop {
            let mut bucket = self.read_bucket(page_id)?;

            if bucket.entries.len() < MAX_BUCKET_ENTRIES {
                bucket.entries.push((key, rid));
                self.write_bucket(page_id, &bucket)?;
                self.entry_count += 1;
                self.write_header()?;
                return Ok(());
            }

            if bucket.overflow == 0 {
                let overflow_page = PageId(self.num_pages);
                self.num_pages += 1;

                bucket.overflow = overflow_page.0;
                self.write_bucket(page_id, &bucket)?;

                let new_bucket = HashBucket {
                    entries: vec![(key, rid)],
                    overflow: 0,
                };
                self.write_bucket(overflow_page, &new_bucket)?;
                self.entry_count += 1;
                self.write_header()?;
                return Ok(());
            }

            page_id = PageId(bucket.overflow);
        }
    }

    /// Delete a key-RecordId pair from the index.
    ///
    /// Returns true if the entry was found and deleted.
    pub fn delete(&mut self, key: &[Value], rid: RecordId) -> DbResult<bool> {
        let bucket_idx = self.bucket_index(key);
        let mut page_id = PageId(self.bucket_base + bucket_idx as u64);

        loop {
            let mut bucket = self.read_bucket(page_id)?;

            let original_len = bucket.entries.len();
            bucket.entries.retain(|(k, r)| !(k == key && *r == rid));

            if bucket.entries.len() < original_len {
                self.write_bucket(page_id, &bucket)?;
                self.entry_count = self.entry_count.saturating_sub(1);
                self.write_header()?;
                return Ok(true);
            }

            if bucket.overflow == 0 {
                break;
            }
            page_id = PageId(bucket.overflow);
        }

        Ok(false)
    }

    /// Flush all changes to disk.
    pub fn flush(&mut self) -> DbResult<()> {
        self.write_header()?;
        self.file
            .sync_all()
            .map_err(|e| DbError::Storage(format!("sync error: {}", e)))?;
        Ok(())
    }

    /// Double the bucket count and redistribute every live entry. Allocates fresh primary
    /// bucket pages at the end of the file; old primary/overflow pages become free (the file
    /// is not compacted, matching the storage engine's tombstone-reclaim-on-compaction model).
    fn rehash(&mut self) -> DbResult<()> {
        let mut all_entries = Vec::with_capacity(self.entry_count);
        for i in 0..self.num_buckets {
            let mut page_id = PageId(self.bucket_base + i as u64);
            loop {
                let bucket = self.read_bucket(page_id)?;
                all_entries.extend(bucket.entries.iter().cloned());
                if bucket.overflow == 0 {
                    break;
                }
                page_id = PageId(bucket.overflow);
            }
        }

        let new_num_buckets = self.num_buckets * 2;
        let new_primary_start = self.num_pages;
        self.num_pages += new_num_buckets as u64;

        let empty = HashBucket::default();
        for i in 0..new_num_buckets {
            self.write_bucket(PageId(new_primary_start + i as u64), &empty)?;
        }

        // Re-point bucket 0 to start at new_primary_start by rewriting bucket layout: buckets
        // now live at [new_primary_start, new_primary_start + new_num_buckets).
        self.bucket_base = new_primary_start;
        self.num_buckets = new_num_buckets;

        for (key, rid) in all_entries {
            let bucket_idx = self.bucket_index(&key);
            let mut page_id = PageId(self.bucket_base + bucket_idx as u64);
            loop {
                let mut bucket = self.read_bucket(page_id)?;
                if bucket.entries.len() < MAX_BUCKET_ENTRIES {
                    bucket.entries.push((key, rid));
                    self.write_bucket(page_id, &bucket)?;
                    break;
                }
                if bucket.overflow == 0 {
                    let overflow_page = PageId(self.num_pages);
                    self.num_pages += 1;
                    bucket.overflow = overflow_page.0;
                    self.write_bucket(page_id, &bucket)?;
                    self.write_bucket(
                        overflow_page,
                        &HashBucket {
                            entries: vec![(key, rid)],
                            overflow: 0,
                        },
                    )?;
                    break;
                }
                page_id = PageId(bucket.overflow);
            }
        }

        self.write_header()
    }

    /// Get bucket index from key hash.
    fn bucket_index(&self, key: &[Value]) -> usize {
        let hash = hash_key(key);
        (hash as usize) % self.num_buckets
    }

    /// Read a bucket from disk.
    fn read_bucket(&mut self, page_id: PageId) -> DbResult<HashBucket> {
        let offset = page_id.0 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("seek error: {}", e)))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| DbError::Storage(format!("read error: {}", e)))?;

        let bucket: HashBucket = bincode::serde::decode_from_slice(&buf, bincode::config::legacy())
            .map_err(|e| DbError::Storage(format!("failed to decode bucket: {}", e)))?
            .0;

        Ok(bucket)
    }

    /// Write a bucket to disk.
    fn write_bucket(&mut self, page_id: PageId, bucket: &HashBucket) -> DbResult<()> {
        let offset = page_id.0 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::Storage(format!("seek error: {}", e)))?;

        let encoded = bincode::serde::encode_to_vec(bucket, bincode::config::legacy())
            .map_err(|e| DbError::Storage(format!("failed to encode bucket: {}", e)))?;

        if encoded.len() > PAGE_SIZE {
            return Err(DbError::Storage(
                "hash bucket overflowed page size".to_string(),
            ));
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[..encoded.len()].copy_from_slice(&encoded);

        self.file
            .write_all(&buf)
            .map_err(|e| DbError::Storage(format!("write error: {}", e)))?;

        Ok(())
    }

    /// Write header to page 0.
    fn write_header(&mut self) -> DbResult<()> {
        let header = HashHeader {
            num_pages: self.num_pages,
            num_buckets: self.num_buckets,
            bucket_base: self.bucket_base,
            entry_count: self.entry_count,
        };

        let encoded = bincode::serde::encode_to_vec(&header, bincode::config::legacy())
            .map_err(|e| DbError::Storage(format!("failed to encode header: {}", e)))?;

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[..encoded.len()].copy_from_slice(&encoded);

        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| DbError::Storage(format!("seek error: {}", e)))?;
        self.file
            .write_all(&buf)
            .map_err(|e| DbError::Storage(format!("write error: {}", e)))?;

        Ok(())
    }
}

/// Hash a composite key to a u64.
pub fn hash_key(key: &[Value]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for val in key {
        match val {
            Value::Int32(i) => {
                0u8.hash(&mut hasher);
                i.hash(&mut hasher);
            }
            Value::Int64(i) => {
                1u8.hash(&mut hasher);
                i.hash(&mut hasher);
            }
            Value::Float64(f) => {
                2u8.hash(&mut hasher);
                f.to_bits().hash(&mut hasher);
            }
            Value::Decimal(d) => {
                3u8.hash(&mut hasher);
                d.hash(&mut hasher);
            }
            Value::Text(s) => {
                4u8.hash(&mut hasher);
                s.hash(&mut hasher);
            }
            Value::Blob(b) => {
                5u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Bool(b) => {
                6u8.hash(&mut hasher);
                b.hash(&mut hasher);
            }
            Value::Null => {
                7u8.hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_index() -> (HashIndex, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.idx");
        let index = HashIndex::create(&path, IndexId(1)).unwrap();
        (index, temp)
    }

    #[test]
    fn create_empty_index() {
        let (index, _temp) = temp_index();
        assert_eq!(index.num_pages, 1 + INITIAL_BUCKETS as u64);
    }

    #[test]
    fn insert_and_search_single_key() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Int64(42)];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        index.insert(key.clone(), rid).unwrap();

        let results = index.search(&key).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], rid);
    }

    #[test]
    fn insert_multiple_keys() {
        let (mut index, _temp) = temp_index();

        for i in 0..10 {
            let key = vec![Value::Int64(i)];
            let rid = RecordId {
                page_id: PageId(0),
                slot: i as u16,
            };
            index.insert(key, rid).unwrap();
        }

        for i in 0..10 {
            let key = vec![Value::Int64(i)];
            let results = index.search(&key).unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].slot, i as u16);
        }
    }

    #[test]
    fn duplicate_keys_return_multiple_rids() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Int64(42)];
        let rid1 = RecordId {
            page_id: PageId(0),
            slot: 0,
        };
        let rid2 = RecordId {
            page_id: PageId(0),
            slot: 1,
        };

        index.insert(key.clone(), rid1).unwrap();
        index.insert(key.clone(), rid2).unwrap();

        let results = index.search(&key).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.contains(&rid1));
        assert!(results.contains(&rid2));
    }

    #[test]
    fn delete_removes_entry() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Int64(42)];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        index.insert(key.clone(), rid).unwrap();
        assert_eq!(index.search(&key).unwrap().len(), 1);

        let deleted = index.delete(&key, rid).unwrap();
        assert!(deleted);
        assert_eq!(index.search(&key).unwrap().len(), 0);
    }

    #[test]
    fn delete_nonexistent_returns_false() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Int64(42)];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        let deleted = index.delete(&key, rid).unwrap();
        assert!(!deleted);
    }

    #[test]
    fn composite_key() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Int64(1), Value::Text("hello".into())];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        index.insert(key.clone(), rid).unwrap();

        let results = index.search(&key).unwrap();
        assert_eq!(results.len(), 1);

        let other_key = vec![Value::Int64(1), Value::Text("world".into())];
        let results = index.search(&other_key).unwrap();
        assert_eq!(results.len(), 0);
    }

    #[test]
    fn persistence_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.idx");

        let key = vec![Value::Int64(42)];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        {
            let mut index = HashIndex::create(&path, IndexId(1)).unwrap();
            index.insert(key.clone(), rid).unwrap();
            index.flush().unwrap();
        }

        {
            let mut index = HashIndex::open(&path, IndexId(1)).unwrap();
            let results = index.search(&key).unwrap();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0], rid);
        }
    }

    #[test]
    fn overflow_bucket_handling() {
        let (mut index, _temp) = temp_index();

        for i in 0..200 {
            let key = vec![Value::Int64(i)];
            let rid = RecordId {
                page_id: PageId(0),
                slot: i as u16,
            };
            index.insert(key, rid).unwrap();
        }

        for i in 0..200 {
            let key = vec![Value::Int64(i)];
            let results = index.search(&key).unwrap();
            assert_eq!(results.len(), 1, "key {} not found", i);
        }
    }

    #[test]
    fn many_inserts_trigger_rehash_and_stay_findable() {
        let (mut index, _temp) = temp_index();

        for i in 0..500 {
            let key = vec![Value::Int64(i)];
            let rid = RecordId {
                page_id: PageId(0),
                slot: (i % 100) as u16,
            };
            index.insert(key, rid).unwrap();
        }

        assert!(index.num_buckets > INITIAL_BUCKETS, "expected at least one rehash");

        for i in 0..500 {
            let key = vec![Value::Int64(i)];
            let results = index.search(&key).unwrap();
            assert_eq!(results.len(), 1, "key {} not found", i);
        }
    }

    #[test]
    fn text_keys() {
        let (mut index, _temp) = temp_index();

        let key = vec![Value::Text("hello world".into())];
        let rid = RecordId {
            page_id: PageId(0),
            slot: 0,
        };

        index.insert(key.clone(), rid).unwrap();

        let results = index.search(&key).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn bool_keys() {
        let (mut index, _temp) = temp_index();

        let key_true = vec![Value::Bool(true)];
        let key_false = vec![Value::Bool(false)];
        let rid1 = RecordId {
            page_id: PageId(0),
            slot: 0,
        };
        let rid2 = RecordId {
            page_id: PageId(0),
            slot: 1,
        };

        index.insert(key_true.clone(), rid1).unwrap();
        index.insert(key_false.clone(), rid2).unwrap();

        assert_eq!(index.search(&key_true).unwrap().len(), 1);
        assert_eq!(index.search(&key_false).unwrap().len(), 1);
    }

    #[test]
    fn hash_key_different_types() {
        let h1 = hash_key(&[Value::Int64(1)]);
        let h2 = hash_key(&[Value::Text("1".into())]);
        let h3 = hash_key(&[Value::Bool(true)]);

        assert_ne!(h1, h2);
        assert_ne!(h2, h3);
        assert_ne!(h1, h3);
    }

    #[test]
    fn hash_key_composite_order_matters() {
        let h1 = hash_key(&[Value::Int64(1), Value::Int64(2)]);
        let h2 = hash_key(&[Value::Int64(2), Value::Int64(1)]);

        assert_ne!(h1, h2);
    }
}
