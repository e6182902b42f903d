//! Query executor: executes physical plans using a Volcano-style iterator model.
//!
//! The executor bridges the planner's physical operators with the storage layer,
//! buffer pool, and WAL to perform actual query execution. It implements a pull-based
//! iterator model where each operator pulls rows from its children.
//!
//! # Architecture
//!
//! ```text
//! Physical Plan
//!     ↓
//! Build Executor Tree
//!     ↓
//! open() → Initialize resources
//!     ↓
//! next() → Pull rows iteratively
//!     ↓
//! close() → Clean up resources
//! ```
//!
//! # Example
//!
//! ```no_run
//! use executor::{execute_query, ExecutionContext};
//! use planner::PhysicalPlan;
//! use catalog::Catalog;
//! use buffer::FilePager;
//! use wal::Wal;
//! use common::TableId;
//! use std::path::PathBuf;
//!
//! let catalog = Catalog::new();
//! let mut pager = FilePager::new(PathBuf::from("/tmp/db"), 100);
//! let mut wal = Wal::open("/tmp/db/wal.log").unwrap();
//! let mut ctx = ExecutionContext::new(&catalog, &mut pager, &mut wal, PathBuf::from("/tmp/db"));
//!
//! let plan = PhysicalPlan::SeqScan {
//!     table_id: TableId(1),
//!     schema: vec!["id".into(), "name".into()],
//! };
//! let results = execute_query(plan, &mut ctx).unwrap();
//! ```


mod builder;
mod dml;
mod filter;
mod join;
mod limit;
mod materializer;
mod paged_heap;
mod pk_index;
mod project;
mod scan;
mod secondary_index;
mod sort;

pub use materializer::{MaterializedRow, RowMaterializer};
pub use paged_heap::PagedHeapTable;
pub use pk_index::PrimaryKeyIndex;
pub use secondary_index::{
    extract_key as secondary_index_key, index_file_path as secondary_index_file_path,
    SecondaryIndexHandle,
};

use catalog::Catalog;
use common::{DbError, DbResult, Row, TableId};
use planner::PhysicalPlan;
use std::collections::HashMap;
use std::path::PathBuf;
use storage::HeapTable;
use wal::{Wal, WalRecord};

/// Volcano-style iterator interface for query execution.
///
/// Each operator implements this trait to provide a pull-based execution model.
/// Operators initialize resources in `open()`, produce rows via `next()`, and
/// clean up in `close()`.
pub trait Executor {
    /// Initialize the operator (open files, allocate buffers, etc.).
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Fetch the next row, or None if exhausted.
    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>>;

    /// Release resources (close files, flush buffers, etc.).
    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()>;

    /// Return the schema (column names) of rows produced by this operator.
    fn schema(&self) -> &[String];
}

/// Shared execution context passed to all operators.
///
/// Contains references to the catalog, buffer pool (pager), and WAL for
/// coordinating data access and durability.
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub pager: &'a mut dyn buffer::Pager,
    pub wal: &'a mut Wal,
    pub data_dir: PathBuf,
    pk_indexes: HashMap<TableId, PrimaryKeyIndex>,
    params: Vec<types::Value>,
}

impl<'a> ExecutionContext<'a> {
    /// Create a new execution context.
    pub fn new(
        catalog: &'a Catalog,
        pager: &'a mut dyn buffer::Pager,
        wal: &'a mut Wal,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            catalog,
            pager,
            wal,
            data_dir,
            pk_indexes: HashMap::new(),
            params: Vec::new(),
        }
    }

    /// Attach bound parameter values for a prepared-statement execution.
    pub fn with_params(mut self, params: Vec<types::Value>) -> Self {
        self.params = params;
        self
    }

    /// Bound parameter values, in the order the planner assigned their indices.
    pub fn params(&self) -> &[types::Value] {
        &self.params
    }

    /// Open a heap table for the given table ID, routed through the buffer pool.
    pub fn heap_table(&mut self, table_id: TableId) -> DbResult<impl HeapTable + '_> {
        self.catalog.table_by_id(table_id)?;
        Ok(PagedHeapTable::new(&mut *self.pager, table_id))
    }

    /// Log a DML operation to the WAL.
    ///
    /// Stamps the touched page's frame with the record's LSN before fsyncing the
    /// WAL, then advances the pager's durable-LSN mark so the eviction sweep can
    /// tell this page's last write is now safe to flush.
    pub fn log_dml(&mut self, record: WalRecord) -> DbResult<()> {
        let lsn = self.wal.append(&record)?;
        if let Some((table, rid)) = dml_record_location(&record) {
            self.pager.set_page_lsn(table, rid.page_id, lsn);
        }
        self.wal.sync()?;
        self.pager.set_durable_lsn(lsn);
        Ok(())
    }

    /// Return the primary key index for a table, building it on first access.
    ///
    /// Returns `None` if the table has no declared primary key. The index is
    /// loaded from its `.pk_idx` sidecar file if present, otherwise built by
    /// scanning every live row in the heap file once.
    pub fn pk_index_for(&mut self, table_id: TableId) -> DbResult<Option<&mut PrimaryKeyIndex>> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        let pk_columns = table_meta.primary_key_columns().to_vec();
        if pk_columns.is_empty() {
            return Ok(None);
        }

        if !self.pk_indexes.contains_key(&table_id) {
            let index = self.load_or_build_pk_index(table_id, pk_columns)?;
            self.pk_indexes.insert(table_id, index);
        }
        Ok(self.pk_indexes.get_mut(&table_id))
    }

    fn pk_index_path(&self, table_id: TableId) -> DbResult<PathBuf> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        Ok(self.data_dir.join(format!("{}.pk_idx", table_meta.name)))
    }

    fn load_or_build_pk_index(
        &mut self,
        table_id: TableId,
        pk_columns: Vec<common::ColumnId>,
    ) -> DbResult<PrimaryKeyIndex> {
        let path = self.pk_index_path(table_id)?;
        if path.exists() {
            return PrimaryKeyIndex::load_from_file(&path);
        }

        let mut index = PrimaryKeyIndex::new(pk_columns);
        let rows = {
            let mut heap_table = self.heap_table(table_id)?;
            heap_table.scan_all()?
        };
        for row in &rows {
            let rid = row
                .rid()
                .ok_or_else(|| DbError::Executor("scanned row has no record id".into()))?;
            let key = index.extract_key(row)?;
            index.insert(key, rid)?;
        }
        Ok(index)
    }

    /// Persist the primary key index for a table to its sidecar file, if built.
    pub fn save_pk_index(&mut self, table_id: TableId) -> DbResult<()> {
        let path = self.pk_index_path(table_id)?;
        if let Some(index) = self.pk_indexes.get(&table_id) {
            index.save_to_file(&path)?;
        }
        Ok(())
    }

    /// Open every secondary index registered on a table, opening (or creating, if a schema
    /// change registered the index but nothing has backfilled it yet) each backing file.
    pub fn secondary_indexes(
        &self,
        table_id: TableId,
    ) -> DbResult<Vec<(catalog::IndexMeta, secondary_index::SecondaryIndexHandle)>> {
        let table_meta = self.catalog.table_by_id(table_id)?;
        let mut handles = Vec::with_capacity(table_meta.indexes().len());
        for index_meta in table_meta.indexes() {
            let path = secondary_index::index_file_path(&self.data_dir, index_meta.id);
            let handle = secondary_index::SecondaryIndexHandle::open_or_create(&path, index_meta)?;
            handles.push((index_meta.clone(), handle));
        }
        Ok(handles)
    }

    /// Insert `row`'s projected key into every secondary index on `table_id`.
    pub fn insert_into_secondary_indexes(
        &mut self,
        table_id: TableId,
        row: &Row,
        rid: common::RecordId,
    ) -> DbResult<()> {
        for (meta, mut handle) in self.secondary_indexes(table_id)? {
            let key = secondary_index::extract_key(&meta, row)?;
            handle.insert(key, rid)?;
            handle.flush()?;
        }
        Ok(())
    }

    /// Remove `row`'s projected key from every secondary index on `table_id`.
    pub fn delete_from_secondary_indexes(
        &mut self,
        table_id: TableId,
        row: &Row,
        rid: common::RecordId,
    ) -> DbResult<()> {
        for (meta, mut handle) in self.secondary_indexes(table_id)? {
            let key = secondary_index::extract_key(&meta, row)?;
            handle.delete(&key, rid)?;
            handle.flush()?;
        }
        Ok(())
    }
}

/// Table and record location a DML WAL record describes, if any.
///
/// `BeginTxn`/`Commit`/`CreateTable`/`DropTable`/`Checkpoint` don't touch a
/// heap page and have no location to stamp.
fn dml_record_location(record: &WalRecord) -> Option<(TableId, common::RecordId)> {
    match record {
        WalRecord::Insert { table, rid, .. }
        | WalRecord::Update { table, rid, .. }
        | WalRecord::Delete { table, rid, .. } => Some((*table, *rid)),
        _ => None,
    }
}

/// Execute a query plan and return all result rows.
///
/// This is the main entry point for executing SELECT queries that return data.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails at any stage.
pub fn execute_query(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<Vec<Row>> {
    let mut executor = builder::build_executor(plan, ctx.catalog)?;

    executor.open(ctx)?;

    let mut results = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        results.push(row);
    }

    executor.close(ctx)?;

    Ok(results)
}

/// Execute a DML statement (INSERT/UPDATE/DELETE) and return affected row count.
///
/// DML statements return a single row containing the number of affected rows.
///
/// # Errors
///
/// Returns `DbError::Executor` if execution fails or no result is produced.
pub fn execute_dml(plan: PhysicalPlan, ctx: &mut ExecutionContext) -> DbResult<u64> {
    let mut executor = builder::build_executor(plan, ctx.catalog)?;

    executor.open(ctx)?;

    let result = executor
        .next(ctx)?
        .ok_or_else(|| DbError::Executor("DML operation returned no result".into()))?;

    executor.close(ctx)?;

    // DML operators return single row with affected count
    match result.values.first() {
        Some(types::Value::Int64(count)) => Ok(*count as u64),
        Some(other) => Err(DbError::Executor(format!(
            "DML result count must be integer, got {:?}",
            other
        ))),
        None => Err(DbError::Executor("DML result has no columns".into())),
    }
}
