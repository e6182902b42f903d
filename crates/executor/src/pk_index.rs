//! In-memory primary key index for enforcing uniqueness constraints.
//!
//! The `PrimaryKeyIndex` maintains a BTreeMap from primary key values to RecordIds,
//! enabling efficient duplicate detection during INSERT operations. The index is built
//! lazily when a table is first accessed by scanning existing rows from storage.

use common::{ColumnId, DbError, DbResult, RecordId, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use types::Value;

/// In-memory index tracking primary key → RecordId mappings for uniqueness enforcement.
///
/// # Design
///
/// - Single-column PK: BTreeMap key is `vec![Value::Int64(42)]`
/// - Composite PK: BTreeMap key is `vec![Value::Int64(1), Value::Text("foo")]`
/// - Built on first table access by scanning heap file or loading from `.pk_idx` file
/// - Updated on every INSERT/DELETE and persisted to disk
///
/// # Example
///
/// ```ignore
/// let mut index = PrimaryKeyIndex::new(vec![0]); // PRIMARY KEY (id)
/// index.insert(vec![Value::Int64(1)], RecordId { page_id: PageId(0), slot: 0 })?;
/// assert!(index.contains(&vec![Value::Int64(1)]));
/// index.save_to_file(Path::new("table.pk_idx"))?;
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct PrimaryKeyIndex {
    /// Column ordinals that comprise the primary key (in order)
    pk_columns: Vec<ColumnId>,
    /// Map from PK value tuple to RecordId
    index: BTreeMap<Vec<Value>, RecordId>,
}

impl PrimaryKeyIndex {
    /// Create a new primary key index for the given column ordinals.
    pub fn new(pk_columns: Vec<ColumnId>) -> Self {
        Self {
            pk_columns,
            index: BTreeMap::new(),
        }
    }

    /// Extract primary key values from a row based on configured PK columns.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Executor` if any PK column ordinal is out of bounds.
    pub fn extract_key(&self, row: &Row) -> DbResult<Vec<Value>> {
        let mut key = Vec::with_capacity(self.pk_columns.len());
        for &col_id in &self.pk_columns {
            let idx = col_id as usize;
            let value = row
                .values
                .get(idx)
                .ok_or_else(|| {
                    DbError::Executor(format!(
                        "PK column {} out of bounds (row has {} columns)",
                        col_id,
                        row.values.len()
                    ))
                })?
                .clone();
            key.push(value);
        }
        Ok(key)
    }

    /// Check if a primary key value already exists in the index.
    pub fn contains(&self, key: &[Value]) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a new primary key → RecordId mapping.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Constraint` if the key already exists.
    pub fn insert(&mut self, key: Vec<Value>, rid: RecordId) -> DbResult<()> {
        if self.index.contains_key(&key) {
            return Err(DbError::Constraint(format!(
                "duplicate primary key value: {:?}",
                key
            )));
        }
        self.index.insert(key, rid);
        Ok(())
    }

    /// Remove a primary key mapping.
    ///
    /// Returns `true` if the key was present, `false` otherwise.
    pub fn remove(&mut self, key: &[Value]) -> bool {
        self.index.remove(key).is_some()
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get the primary key column ordinals.
    pub fn pk_columns(&self) -> &[ColumnId] {
        &self.pk_columns
    }

    /// Save the index to a file using bincode serialization.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Storage` if serialization or file I/O fails.
    pub fn save_to_file(&self, path: &Path) -> DbResult<()> {
        let config = bincode::config::legacy();
        let bytes = bincode::serde::encode_to_vec(self, config)
            .map_err(|e| DbError::Storage(format!("Failed to serialize PK index: {}", e)))?;

        fs::write(path, bytes)
            .map_err(|e| DbError::Storage(format!("Failed to write PK index file: {}", e)))?;

        Ok(())
    }

    /// Load the index from a file using bincode deserialization.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Storage` if file I/O or deserialization fails.
    pub fn load_from_file(path: &Path) -> DbResult<Self> {
        let bytes = fs::read(path)
            .map_err(|e| DbError::Storage(format!("Failed to read PK index file: {}", e)))?;

        let config = bincode::config::legacy();
        let (index, _len) = bincode::serde::decode_from_slice(&bytes, config)
            .map_err(|e| DbError::Storage(format!("Failed to deserialize PK index: {}", e)))?;

        Ok(index)
    }
}
