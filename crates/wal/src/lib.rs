//! Write-Ahead Log (WAL) for crash recovery and durability.
//!
//! The WAL ensures that every change to the database is first recorded in a durable,
//! sequential log before it's applied to storage. If the process crashes mid-update,
//! the WAL can replay ("redo") those operations to bring storage back to a consistent
//! state, and roll back any transaction that never reached a closing `Commit` record.
//!
//! # Architecture (ARIES-lite)
//!
//! - **LSN per record**: every record is assigned a monotonically increasing log
//!   sequence number when appended; the log is the source of truth for ordering.
//! - **CRC-protected framing**: each record carries a CRC32 trailer. Replay stops at
//!   the first mismatch and truncates the tail, so a torn write from a crash mid-append
//!   never surfaces as a corrupted record to the caller.
//! - **Group commit**: DML/DDL records are appended without a per-record fsync; a
//!   transaction's `Commit` record is the fsync boundary, so any records appended
//!   since the last commit are flushed to disk together.
//! - **Checkpointing**: `checkpoint()` records the oldest LSN still needed for
//!   recovery; `truncate_before()` drops everything older once the caller has
//!   confirmed those pages are durable on the heap file.
//! - **Single WAL file**: simple for the single-writer architecture the engine runs.
//!
//! # Example
//!
//! ```no_run
//! use wal::{Wal, WalRecord};
//! use common::{TableId, RecordId, PageId};
//! use types::Value;
//!
//! let mut wal = Wal::open("data/sharpcore.wal").unwrap();
//!
//! let tid = wal.begin_txn().unwrap();
//! wal.append(&WalRecord::Insert {
//!     table: TableId(1),
//!     row: vec![Value::Int64(42), Value::Text("hello".into())],
//!     rid: RecordId { page_id: PageId(0), slot: 0 },
//! }).unwrap();
//! wal.commit(tid).unwrap();
//!
//! // Replay on recovery
//! let records = Wal::replay("data/sharpcore.wal").unwrap();
//! for rec in records {
//!     // Apply each record to storage
//! }
//! ```

#[cfg(test)]
mod tests;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, RecordId, TableId};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use types::Value;

/// Magic bytes identifying a SharpCoreDB WAL file.
const WAL_MAGIC: &[u8; 4] = b"SCWL";
/// On-disk format version. Bump when the framing or record shape changes incompatibly.
const WAL_VERSION: u16 = 1;

/// Whether a transaction's closing record represents a successful commit or a rollback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnOutcome {
    Committed,
    Aborted,
}

/// A logical change to the database that can be written to the WAL and replayed.
///
/// Each variant represents a different type of database operation:
/// - Transaction boundaries: BeginTxn, Commit (carries the outcome)
/// - DML: Insert, Update, Delete
/// - DDL: CreateTable, DropTable
/// - Recovery bookkeeping: Checkpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    /// Marks the start of a transaction.
    BeginTxn { tid: u64 },
    /// Insert a new row into a table.
    Insert {
        table: TableId,
        row: Vec<Value>,
        rid: RecordId,
    },
    /// Update an existing row. Carries the before-image so an abort can undo it.
    Update {
        table: TableId,
        rid: RecordId,
        before: Vec<Value>,
        after: Vec<Value>,
    },
    /// Delete a row. Carries the before-image so an abort can undo it.
    Delete {
        table: TableId,
        rid: RecordId,
        before: Vec<Value>,
    },
    /// Closes a transaction, either durably (`Committed`) or by rollback (`Aborted`).
    Commit { tid: u64, outcome: TxnOutcome },
    /// Create a new table.
    CreateTable { name: String, table: TableId },
    /// Drop a table.
    DropTable { table: TableId },
    /// Records the oldest LSN still needed for recovery. Everything before it may be
    /// truncated once the caller has confirmed those pages are flushed to the heap file.
    Checkpoint { oldest_dirty_lsn: u64 },
}

/// Write-Ahead Log manager.
///
/// Manages a single WAL file with append-only writes and sequential replay. Each
/// record is framed as `len (u32) | lsn (u64) | payload | crc32 (u32)`, all little-
/// endian, following a one-time `"SCWL"` + version header.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: File,
    next_lsn: u64,
    next_tid: u64,
}

impl Wal {
    /// Open or create a WAL file at the given path.
    ///
    /// The file is opened in append mode to preserve existing records. A fresh file
    /// gets the magic header written immediately; an existing file has its header
    /// validated and its LSN counter resumed from the highest record found.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the file cannot be opened, or
    /// `DbError::RecoveryRequired` if the header is missing/corrupt on a non-empty file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let is_new = !path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DbError::Wal(format!("Failed to open WAL file: {}", e)))?;

        if is_new {
            write_header(&mut file)?;
        } else {
            validate_header(&path)?;
        }

        let next_lsn = highest_lsn(&path)?.map(|lsn| lsn + 1).unwrap_or(0);

        Ok(Self {
            path,
            file,
            next_lsn,
            next_tid: 0,
        })
    }

    /// Allocate a new transaction id and write its `BeginTxn` record.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the record cannot be written.
    pub fn begin_txn(&mut self) -> DbResult<u64> {
        let tid = self.next_tid;
        self.next_tid += 1;
        self.append(&WalRecord::BeginTxn { tid })?;
        tracing::debug!(tid, "wal: begin transaction");
        Ok(tid)
    }

    /// Append a record to the WAL and assign it the next LSN.
    ///
    /// The record is serialized with bincode, CRC-protected, and written with a
    /// 4-byte length prefix. The file buffer is flushed but not fsynced; call
    /// `commit()` (or `sync()` directly) for durability.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if serialization or writing fails.
    pub fn append(&mut self, rec: &WalRecord) -> DbResult<u64> {
        let lsn = self.next_lsn;
        self.next_lsn += 1;

        let payload = encode_to_vec(rec, bincode_config())
            .map_err(|e| DbError::Wal(format!("Failed to serialize record: {}", e)))?;

        let mut frame_body = Vec::with_capacity(8 + payload.len());
        frame_body.extend_from_slice(&lsn.to_le_bytes());
        frame_body.extend_from_slice(&payload);

        let crc = crc32fast::hash(&frame_body);
        let len = frame_body.len() as u32;

        self.file
            .write_all(&len.to_le_bytes())
            .map_err(|e| DbError::Wal(format!("Failed to write length prefix: {}", e)))?;
        self.file
            .write_all(&frame_body)
            .map_err(|e| DbError::Wal(format!("Failed to write record: {}", e)))?;
        self.file
            .write_all(&crc.to_le_bytes())
            .map_err(|e| DbError::Wal(format!("Failed to write crc: {}", e)))?;
        self.file
            .flush()
            .map_err(|e| DbError::Wal(format!("Failed to flush WAL: {}", e)))?;

        Ok(lsn)
    }

    /// Close a transaction by writing its `Commit` record and fsyncing.
    ///
    /// This is the group-commit boundary: every record appended since the last
    /// commit is flushed to disk by a single fsync here, regardless of how many
    /// separate `append()` calls produced them.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the record cannot be written or fsync fails.
    pub fn commit(&mut self, tid: u64) -> DbResult<u64> {
        let lsn = self.append(&WalRecord::Commit {
            tid,
            outcome: TxnOutcome::Committed,
        })?;
        self.sync()?;
        tracing::debug!(tid, lsn, "wal: commit");
        Ok(lsn)
    }

    /// Abort a transaction: append undo (before-image) records for `mutations` in
    /// reverse order, then a `Commit { outcome: Aborted }` marker, and fsync.
    ///
    /// `mutations` should be the `Update`/`Delete` records already appended for this
    /// transaction, supplied here so their before-images can be replayed as undo.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if a record cannot be written or fsync fails.
    pub fn abort(&mut self, tid: u64, mutations: &[WalRecord]) -> DbResult<u64> {
        for rec in mutations.iter().rev() {
            let undo = match rec {
                WalRecord::Update {
                    table,
                    rid,
                    before,
                    ..
                } => Some(WalRecord::Update {
                    table: *table,
                    rid: *rid,
                    before: before.clone(),
                    after: before.clone(),
                }),
                WalRecord::Delete { table, rid, before } => Some(WalRecord::Insert {
                    table: *table,
                    row: before.clone(),
                    rid: *rid,
                }),
                WalRecord::Insert { table, rid, .. } => Some(WalRecord::Delete {
                    table: *table,
                    rid: *rid,
                    before: Vec::new(),
                }),
                _ => None,
            };
            if let Some(undo) = undo {
                self.append(&undo)?;
            }
        }
        let lsn = self.append(&WalRecord::Commit {
            tid,
            outcome: TxnOutcome::Aborted,
        })?;
        self.sync()?;
        tracing::warn!(tid, lsn, "wal: abort");
        Ok(lsn)
    }

    /// Fsync the WAL to ensure durability.
    ///
    /// This guarantees that all appended records are persisted to disk. `commit()`
    /// and `abort()` already call this; exposed directly for checkpoint callers.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if fsync fails.
    pub fn sync(&mut self) -> DbResult<()> {
        self.file
            .sync_all()
            .map_err(|e| DbError::Wal(format!("Failed to sync WAL: {}", e)))
    }

    /// Write a checkpoint record carrying the oldest dirty-page LSN and fsync it.
    ///
    /// Once every page with an LSN below `oldest_dirty_lsn` has been flushed to the
    /// heap file, the caller may safely call `truncate_before(oldest_dirty_lsn)`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the record cannot be written.
    pub fn checkpoint(&mut self, oldest_dirty_lsn: u64) -> DbResult<u64> {
        let lsn = self.append(&WalRecord::Checkpoint { oldest_dirty_lsn })?;
        self.sync()?;
        tracing::info!(lsn, oldest_dirty_lsn, "wal: checkpoint");
        Ok(lsn)
    }

    /// Replay all records from the WAL file, starting after the header.
    ///
    /// Reads the WAL sequentially, validating each record's CRC. Stops at EOF or the
    /// first CRC mismatch / truncated frame — a torn tail from a crash mid-append —
    /// without treating it as a hard error.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the file cannot be opened, or `DbError::RecoveryRequired`
    /// if the header itself is missing or doesn't match the expected magic/version.
    pub fn replay(path: impl AsRef<Path>) -> DbResult<Vec<WalRecord>> {
        Ok(Self::replay_with_lsn(path)?
            .into_iter()
            .map(|(_, rec)| rec)
            .collect())
    }

    /// Like `replay`, but also returns each record's LSN.
    pub fn replay_with_lsn(path: impl AsRef<Path>) -> DbResult<Vec<(u64, WalRecord)>> {
        let mut file = OpenOptions::new().read(true).open(path.as_ref()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                return DbError::Wal("WAL file not found (empty replay)".to_string());
            }
            DbError::Wal(format!("Failed to open WAL for replay: {}", e))
        })?;

        skip_header(&mut file)?;

        let mut records = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DbError::Wal(format!("Failed to read length prefix: {}", e))),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut body = vec![0u8; len];
            if file.read_exact(&mut body).is_err() {
                // Torn tail: length prefix present but body truncated by a crash.
                tracing::warn!(records_recovered = records.len(), "wal: torn tail, truncated body");
                break;
            }
            let mut crc_buf = [0u8; 4];
            if file.read_exact(&mut crc_buf).is_err() {
                tracing::warn!(records_recovered = records.len(), "wal: torn tail, missing crc");
                break;
            }
            let stored_crc = u32::from_le_bytes(crc_buf);
            if crc32fast::hash(&body) != stored_crc {
                // Torn tail: bytes present but corrupted mid-write. Stop here.
                tracing::warn!(records_recovered = records.len(), "wal: crc mismatch, stopping replay");
                break;
            }

            if body.len() < 8 {
                break;
            }
            let lsn = u64::from_le_bytes(body[0..8].try_into().unwrap());
            let (rec, _): (WalRecord, _) = decode_from_slice(&body[8..], bincode_config())
                .map_err(|e| DbError::Wal(format!("Failed to deserialize record: {}", e)))?;

            records.push((lsn, rec));
        }

        tracing::info!(records = records.len(), "wal: replay complete");
        Ok(records)
    }

    /// Truncate the WAL file, removing all records (including the header, which is
    /// rewritten). Used after a checkpoint covers the whole log.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the file cannot be truncated.
    pub fn truncate(&mut self) -> DbResult<()> {
        self.reopen_truncated()?;
        write_header(&mut self.file)?;
        self.next_lsn = 0;
        Ok(())
    }

    /// Rewrite the WAL keeping only records with LSN >= `lsn`, after a successful
    /// checkpoint has confirmed everything older is durable in the heap file.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Wal` if the file cannot be read or rewritten.
    pub fn truncate_before(&mut self, lsn: u64) -> DbResult<()> {
        let kept = Self::replay_with_lsn(&self.path)?
            .into_iter()
            .filter(|(record_lsn, _)| *record_lsn >= lsn)
            .collect::<Vec<_>>();

        self.reopen_truncated()?;
        write_header(&mut self.file)?;
        for (record_lsn, rec) in &kept {
            let payload = encode_to_vec(rec, bincode_config())
                .map_err(|e| DbError::Wal(format!("Failed to serialize record: {}", e)))?;
            let mut frame_body = Vec::with_capacity(8 + payload.len());
            frame_body.extend_from_slice(&record_lsn.to_le_bytes());
            frame_body.extend_from_slice(&payload);
            let crc = crc32fast::hash(&frame_body);
            let len = frame_body.len() as u32;
            self.file
                .write_all(&len.to_le_bytes())
                .map_err(|e| DbError::Wal(format!("Failed to write length prefix: {}", e)))?;
            self.file
                .write_all(&frame_body)
                .map_err(|e| DbError::Wal(format!("Failed to write record: {}", e)))?;
            self.file
                .write_all(&crc.to_le_bytes())
                .map_err(|e| DbError::Wal(format!("Failed to write crc: {}", e)))?;
        }
        self.file
            .flush()
            .map_err(|e| DbError::Wal(format!("Failed to flush WAL: {}", e)))?;

        Ok(())
    }

    fn reopen_truncated(&mut self) -> DbResult<()> {
        drop(std::mem::replace(
            &mut self.file,
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map_err(|e| DbError::Wal(format!("Failed to truncate WAL: {}", e)))?,
        ));

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| DbError::Wal(format!("Failed to reopen WAL after truncate: {}", e)))?;

        Ok(())
    }
}

fn write_header(file: &mut File) -> DbResult<()> {
    file.write_all(WAL_MAGIC)
        .map_err(|e| DbError::Wal(format!("Failed to write WAL magic: {}", e)))?;
    file.write_all(&WAL_VERSION.to_le_bytes())
        .map_err(|e| DbError::Wal(format!("Failed to write WAL version: {}", e)))?;
    file.flush()
        .map_err(|e| DbError::Wal(format!("Failed to flush WAL header: {}", e)))
}

fn skip_header(file: &mut File) -> DbResult<()> {
    let mut magic = [0u8; 4];
    let mut version = [0u8; 2];
    file.read_exact(&mut magic)
        .map_err(|e| DbError::RecoveryRequired(format!("missing WAL header: {}", e)))?;
    if &magic != WAL_MAGIC {
        return Err(DbError::RecoveryRequired(
            "WAL file magic mismatch".to_string(),
        ));
    }
    file.read_exact(&mut version)
        .map_err(|e| DbError::RecoveryRequired(format!("missing WAL version: {}", e)))?;
    Ok(())
}

fn validate_header(path: &Path) -> DbResult<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| DbError::Wal(format!("Failed to open WAL for header check: {}", e)))?;
    skip_header(&mut file)
}

fn highest_lsn(path: &Path) -> DbResult<Option<u64>> {
    let records = Wal::replay_with_lsn(path)?;
    Ok(records.last().map(|(lsn, _)| *lsn))
}

/// Get the bincode configuration for WAL serialization.
///
/// Uses little-endian, fixed-width integers for cross-platform compatibility.
fn bincode_config() -> impl Config {
    config::legacy()
}
