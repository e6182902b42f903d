//! Unified handle over the B+Tree and hash index backends.
//!
//! `catalog::IndexMeta::kind` tells us which storage engine backs a given
//! secondary index; DML operators and index scans both need to open,
//! search, and mutate whichever one is actually registered without caring
//! which it is. `SecondaryIndexHandle` dispatches on `IndexKind` once so the
//! callers don't have to.

use btree::BTreeIndex;
use catalog::{IndexKind, IndexMeta};
use common::{DbError, DbResult, RecordId, Row};
use hash::HashIndex;
use std::path::{Path, PathBuf};
use types::Value;

/// Path of the backing file for an index, matching the naming `IndexScanExec` expects.
pub fn index_file_path(data_dir: &Path, index_id: catalog::IndexId) -> PathBuf {
    data_dir.join(format!("index_{}.idx", index_id.0))
}

/// A secondary index backed by either a B+Tree or a hash table.
pub enum SecondaryIndexHandle {
    BTree(BTreeIndex),
    Hash(HashIndex),
}

impl SecondaryIndexHandle {
    /// Create a fresh, empty backing file for `meta`.
    pub fn create(path: &Path, meta: &IndexMeta) -> DbResult<Self> {
        match meta.kind {
            IndexKind::BTree => Ok(Self::BTree(BTreeIndex::create(path, meta.id)?)),
            IndexKind::Hash => Ok(Self::Hash(HashIndex::create(path, meta.id)?)),
            ref other => Err(DbError::Executor(format!(
                "index kind {other:?} has no backing storage engine yet"
            ))),
        }
    }

    /// Open the existing backing file for `meta`.
    pub fn open(path: &Path, meta: &IndexMeta) -> DbResult<Self> {
        match meta.kind {
            IndexKind::BTree => Ok(Self::BTree(BTreeIndex::open(path, meta.id)?)),
            IndexKind::Hash => Ok(Self::Hash(HashIndex::open(path, meta.id)?)),
            ref other => Err(DbError::Executor(format!(
                "index kind {other:?} has no backing storage engine yet"
            ))),
        }
    }

    /// Open `meta`'s backing file if it exists, otherwise create it.
    pub fn open_or_create(path: &Path, meta: &IndexMeta) -> DbResult<Self> {
        if path.exists() {
            Self::open(path, meta)
        } else {
            Self::create(path, meta)
        }
    }

    pub fn search(&mut self, key: &[Value]) -> DbResult<Vec<RecordId>> {
        match self {
            Self::BTree(idx) => idx.search(key),
            Self::Hash(idx) => idx.search(key),
        }
    }

    pub fn insert(&mut self, key: Vec<Value>, rid: RecordId) -> DbResult<()> {
        match self {
            Self::BTree(idx) => idx.insert(key, rid),
            Self::Hash(idx) => idx.insert(key, rid),
        }
    }

    pub fn delete(&mut self, key: &[Value], rid: RecordId) -> DbResult<bool> {
        match self {
            Self::BTree(idx) => idx.delete(key, rid),
            Self::Hash(idx) => idx.delete(key, rid),
        }
    }

    pub fn flush(&mut self) -> DbResult<()> {
        match self {
            Self::BTree(idx) => idx.flush(),
            Self::Hash(idx) => idx.flush(),
        }
    }

    /// Inclusive range scan. Only the B+Tree backend supports ordered range queries.
    pub fn range_scan(
        &mut self,
        low: Option<&[Value]>,
        high: Option<&[Value]>,
    ) -> DbResult<Vec<RecordId>> {
        match self {
            Self::BTree(idx) => idx.range_scan(low, high),
            Self::Hash(_) => Err(DbError::Executor(
                "range scans are not supported on hash indexes".into(),
            )),
        }
    }
}

/// Extract the key tuple an index's columns project out of a row.
pub fn extract_key(meta: &IndexMeta, row: &Row) -> DbResult<Vec<Value>> {
    let mut key = Vec::with_capacity(meta.columns.len());
    for &col_id in &meta.columns {
        let idx = col_id as usize;
        let value = row.values.get(idx).cloned().ok_or_else(|| {
            DbError::Executor(format!(
                "index column {} out of bounds (row has {} columns)",
                col_id,
                row.values.len()
            ))
        })?;
        key.push(value);
    }
    Ok(key)
}
