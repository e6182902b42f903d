//! DML operators: Insert, Update, Delete.

use crate::{filter::eval_resolved_expr_with_params, ExecutionContext, Executor};
use common::{ColumnId, DbResult, Row, TableId};
use planner::ResolvedExpr;
use storage::HeapTable;
use types::Value;
use wal::WalRecord;

/// Insert operator - inserts one or more rows into a table with WAL logging.
///
/// Evaluates value expressions and writes to both WAL and storage.
/// Returns a single row containing the number of inserted rows.
pub struct InsertExec {
    table_id: TableId,
    schema: Vec<String>,
    /// One row of value expressions per VALUES tuple (multi-row INSERT supplies more than one).
    rows: Vec<Vec<ResolvedExpr>>,
    executed: bool,
}

impl InsertExec {
    /// Create a new insert operator.
    pub fn new(table_id: TableId, schema: Vec<String>, rows: Vec<Vec<ResolvedExpr>>) -> Self {
        Self {
            table_id,
            schema,
            rows,
            executed: false,
        }
    }

    /// Insert a single row, enforcing primary key uniqueness and logging to the WAL.
    fn insert_one(&self, ctx: &mut ExecutionContext, exprs: &[ResolvedExpr]) -> DbResult<()> {
        // Evaluate value expressions (no row context for INSERT literals)
        let empty_row = Row::new(vec![]);
        let params = ctx.params().to_vec();
        let mut row_values = Vec::with_capacity(exprs.len());

        for expr in exprs {
            let value = eval_resolved_expr_with_params(expr, &empty_row, &params)?;
            row_values.push(value);
        }

        let row = Row::new(row_values.clone());

        // 1. Check primary key uniqueness before touching storage.
        let pk_key = match ctx.pk_index_for(self.table_id)? {
            Some(index) => {
                let key = index.extract_key(&row)?;
                if index.contains(&key) {
                    tracing::warn!(table = self.table_id.0, ?key, "insert rejected: duplicate primary key");
                    return Err(common::DbError::Constraint(format!(
                        "duplicate primary key value: {:?}",
                        key
                    )));
                }
                Some(key)
            }
            None => None,
        };

        // 2. Insert into storage to get RID
        let rid = {
            let mut heap_table = ctx.heap_table(self.table_id)?;
            heap_table.insert(&row)?
        };

        // 3. Record the RID against the primary key once the insert has succeeded.
        if let Some(key) = pk_key {
            if let Some(index) = ctx.pk_index_for(self.table_id)? {
                index.insert(key, rid)?;
            }
            ctx.save_pk_index(self.table_id)?;
        }

        // 3b. Populate every secondary index registered on the table.
        ctx.insert_into_secondary_indexes(self.table_id, &row, rid)?;

        // 4. Log to WAL after successful insert
        let wal_record = WalRecord::Insert {
            table: self.table_id,
            row: row_values,
            rid,
        };
        ctx.log_dml(wal_record)?;

        Ok(())
    }
}

impl Executor for InsertExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }
        self.executed = true;

        for exprs in &self.rows {
            self.insert_one(ctx, exprs)?;
        }

        // Return single row with affected count
        Ok(Some(Row::new(vec![Value::Int64(self.rows.len() as i64)])))
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Update operator - updates rows matching a predicate with WAL logging.
///
/// Scans for matching rows, applies assignments, and writes to WAL and storage.
/// Returns a single row containing the number of updated rows.
pub struct UpdateExec {
    table_id: TableId,
    schema: Vec<String>,
    input: Box<dyn Executor>,
    assignments: Vec<(ColumnId, ResolvedExpr)>,
    executed: bool,
}

impl UpdateExec {
    /// Create a new update operator.
    pub fn new(
        table_id: TableId,
        schema: Vec<String>,
        input: Box<dyn Executor>,
        assignments: Vec<(ColumnId, ResolvedExpr)>,
    ) -> Self {
        Self {
            table_id,
            schema,
            input,
            assignments,
            executed: false,
        }
    }

    /// Apply assignments to a row to produce the updated row.
    fn apply_assignments(&self, old_row: &Row, params: &[Value]) -> DbResult<Row> {
        let mut new_values = old_row.values.clone();

        for (col_id, expr) in &self.assignments {
            let idx = *col_id as usize;
            if idx >= new_values.len() {
                return Err(common::DbError::Executor(format!(
                    "column index {} out of bounds (row has {} columns)",
                    idx,
                    new_values.len()
                )));
            }

            let value = eval_resolved_expr_with_params(expr, old_row, params)?;
            new_values[idx] = value;
        }

        Ok(Row::new(new_values))
    }
}

impl Executor for UpdateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }

        let mut count = 0;
        let params = ctx.params().to_vec();

        // For each matching row, apply updates and write the new version through
        // storage and the WAL.
        while let Some(old_row) = self.input.next(ctx)? {
            let rid = old_row.rid().ok_or_else(|| {
                common::DbError::Executor("update input row has no record id".into())
            })?;
            let new_row = self.apply_assignments(&old_row, &params)?;

            // Re-key the primary key index if an assignment touched a PK column.
            if let Some(index) = ctx.pk_index_for(self.table_id)? {
                let old_key = index.extract_key(&old_row)?;
                let new_key = index.extract_key(&new_row)?;
                if new_key != old_key && index.contains(&new_key) {
                    tracing::warn!(table = self.table_id.0, ?new_key, "update rejected: duplicate primary key");
                    return Err(common::DbError::Constraint(format!(
                        "duplicate primary key value: {:?}",
                        new_key
                    )));
                }
                if new_key != old_key {
                    index.remove(&old_key);
                    index.insert(new_key, rid)?;
                }
            }

            {
                let mut heap_table = ctx.heap_table(self.table_id)?;
                heap_table.update(rid, &new_row)?;
            }
            ctx.save_pk_index(self.table_id)?;

            // Re-key every secondary index: drop the old projection, insert the new one.
            ctx.delete_from_secondary_indexes(self.table_id, &old_row, rid)?;
            ctx.insert_into_secondary_indexes(self.table_id, &new_row, rid)?;

            ctx.log_dml(WalRecord::Update {
                table: self.table_id,
                rid,
                before: old_row.values.clone(),
                after: new_row.values.clone(),
            })?;

            count += 1;
        }

        self.executed = true;
        tracing::debug!(table = self.table_id.0, count, "update executed");

        // Return count of matched rows
        Ok(Some(Row::new(vec![Value::Int64(count)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}

/// Delete operator - deletes rows matching a predicate with WAL logging.
///
/// Scans for matching rows and removes them from storage.
/// Returns a single row containing the number of deleted rows.
pub struct DeleteExec {
    table_id: TableId,
    schema: Vec<String>,
    input: Box<dyn Executor>,
    executed: bool,
}

impl DeleteExec {
    /// Create a new delete operator.
    pub fn new(table_id: TableId, schema: Vec<String>, input: Box<dyn Executor>) -> Self {
        Self {
            table_id,
            schema,
            input,
            executed: false,
        }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.executed = false;
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.executed {
            return Ok(None);
        }

        let mut count = 0;

        // For each matching row, delete it from storage and log its before-image.
        while let Some(row) = self.input.next(ctx)? {
            let rid = row.rid().ok_or_else(|| {
                common::DbError::Executor("delete input row has no record id".into())
            })?;

            if let Some(index) = ctx.pk_index_for(self.table_id)? {
                let key = index.extract_key(&row)?;
                index.remove(&key);
            }
            ctx.delete_from_secondary_indexes(self.table_id, &row, rid)?;

            {
                let mut heap_table = ctx.heap_table(self.table_id)?;
                heap_table.delete(rid)?;
            }
            ctx.save_pk_index(self.table_id)?;

            ctx.log_dml(WalRecord::Delete {
                table: self.table_id,
                rid,
                before: row.values.clone(),
            })?;

            count += 1;
        }

        self.executed = true;
        tracing::debug!(table = self.table_id.0, count, "delete executed");

        // Return count of matched rows
        Ok(Some(Row::new(vec![Value::Int64(count)])))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.input.close(ctx)
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }
}
