//! Project operator: selects and reorders columns.

use crate::{ExecutionContext, Executor};
use common::{ColumnId, DbResult, ExecutionStats, Row};
use std::time::Instant;

/// Project operator - selects/reorders columns from input rows.
///
/// Produces rows with a subset of columns in a specified order.
/// Each projection is a (output_name, column_id) pair.
pub struct ProjectExec {
    input: Box<dyn Executor>,
    projections: Vec<(String, ColumnId)>,
    schema: Vec<String>,
    stats: ExecutionStats,
}

impl ProjectExec {
    /// Create a new project operator.
    pub fn new(input: Box<dyn Executor>, projections: Vec<(String, ColumnId)>) -> Self {
        let schema = projections.iter().map(|(name, _)| name.clone()).collect();
        Self {
            input,
            projections,
            schema,
            stats: ExecutionStats::default(),
        }
    }
}

impl Executor for ProjectExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();
        self.input.open(ctx)?;
        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        let row = match self.input.next(ctx)? {
            Some(r) => r,
            None => {
                self.stats.total_next_time += start.elapsed();
                return Ok(None);
            }
        };

        let rid = row.rid();

        // Project columns by evaluating each column reference
        let mut projected_values = Vec::with_capacity(self.projections.len());

        for (_name, col_id) in &self.projections {
            let idx = *col_id as usize;
            let value = row
                .values
                .get(idx)
                .ok_or_else(|| {
                    common::DbError::Executor(format!(
                        "column index {} out of bounds (row has {} columns)",
                        idx,
                        row.values.len()
                    ))
                })?
                .clone();
            projected_values.push(value);
        }

        let mut projected = Row::new(projected_values);
        projected.set_rid(rid);

        self.stats.rows_produced += 1;
        self.stats.total_next_time += start.elapsed();
        Ok(Some(projected))
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.input.close(ctx)?;
        self.stats.close_time = start.elapsed();
        Ok(())
    }

    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}
