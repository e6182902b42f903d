//! Join operators: combines rows from multiple tables.

use crate::{ExecutionContext, Executor};
use common::{DbResult, ExecutionStats, Row};
use planner::{PlanJoinType as JoinType, ResolvedExpr};
use std::time::Instant;
use types::Value;

/// Nested loop join operator - simple O(n*m) join algorithm.
///
/// For each row from the left table, iterates all rows from the right table,
/// evaluating the join condition on combined rows.
///
/// # Algorithm
///
/// 1. `open()`: Materialize all right-side rows into memory, fetch first left row.
/// 2. `next()`: For each left row, iterate through all right rows, evaluate condition.
/// 3. When all right rows exhausted for current left, advance to next left row.
/// 4. `close()`: Release materialized rows and close children.
///
/// # Performance
///
/// - Time: O(n * m) where n = left rows, m = right rows
/// - Space: O(m) to materialize right side
///
/// This is the simplest join algorithm, suitable for small tables or when no
/// better access method is available. More sophisticated algorithms (HashJoin,
/// MergeJoin) would be used for larger datasets.
pub struct NestedLoopJoinExec {
    left_input: Box<dyn Executor>,
    right_input: Box<dyn Executor>,
    join_type: JoinType,
    condition: ResolvedExpr,
    /// Number of columns contributed by the right side, used to pad unmatched
    /// LEFT JOIN outer rows with nulls.
    right_arity: usize,
    schema: Vec<String>,

    // State
    current_left_row: Option<Row>,
    current_left_matched: bool,
    right_materialized: Vec<Row>,
    right_cursor: usize,
    stats: ExecutionStats,
}

impl NestedLoopJoinExec {
    /// Create a new nested loop join operator.
    ///
    /// # Arguments
    ///
    /// * `left` - Left (outer) input executor
    /// * `right` - Right (inner) input executor, will be materialized
    /// * `join_type` - Inner or Left; Left preserves unmatched left rows with null right columns
    /// * `condition` - Join condition (ON clause) with resolved column ordinals
    /// * `right_arity` - Number of columns on the right side (for null padding)
    /// * `schema` - Combined output schema (left columns followed by right columns)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        join_type: JoinType,
        condition: ResolvedExpr,
        right_arity: usize,
        schema: Vec<String>,
    ) -> Self {
        Self {
            left_input: left,
            right_input: right,
            join_type,
            condition,
            right_arity,
            schema,
            current_left_row: None,
            current_left_matched: false,
            right_materialized: Vec::new(),
            right_cursor: 0,
            stats: ExecutionStats::default(),
        }
    }

    /// Combine a left and right row into a single row.
    ///
    /// The combined row has all columns from the left row first,
    /// followed by all columns from the right row.
    fn combine_rows(&self, left: &Row, right: &Row) -> Row {
        let mut combined_values = left.values.clone();
        combined_values.extend(right.values.clone());
        Row::new(combined_values)
    }

    /// Build a row for an unmatched LEFT JOIN outer row: left columns followed
    /// by nulls for every right-side column.
    fn pad_unmatched(&self, left: &Row) -> Row {
        let mut combined_values = left.values.clone();
        combined_values.extend(std::iter::repeat(Value::Null).take(self.right_arity));
        Row::new(combined_values)
    }

    /// Evaluate the join condition against a combined row.
    ///
    /// Returns true if the rows should be joined, false otherwise.
    /// NULL condition results are treated as false (SQL semantics).
    fn eval_condition(&self, row: &Row, params: &[Value]) -> DbResult<bool> {
        let result = crate::filter::eval_resolved_expr_with_params(&self.condition, row, params)?;
        match result {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(common::DbError::Executor(format!(
                "join condition must evaluate to boolean, got {:?}",
                other
            ))),
        }
    }
}

impl Executor for NestedLoopJoinExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();

        // Open both children
        self.left_input.open(ctx)?;
        self.right_input.open(ctx)?;

        // Materialize right side for repeated iteration
        self.right_materialized.clear();
        while let Some(row) = self.right_input.next(ctx)? {
            self.right_materialized.push(row);
        }

        // Get first left row
        self.current_left_row = self.left_input.next(ctx)?;
        self.current_left_matched = false;
        self.right_cursor = 0;

        self.stats.open_time = start.elapsed();
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        loop {
            // Check if we have a current left row
            let left_row = match &self.current_left_row {
                Some(r) => r.clone(),
                None => {
                    self.stats.total_next_time += start.elapsed();
                    return Ok(None);
                }
            };

            // Try to find matching right row
            while self.right_cursor < self.right_materialized.len() {
                let right_row = &self.right_materialized[self.right_cursor];
                self.right_cursor += 1;

                // Combine rows and evaluate join condition
                let combined = self.combine_rows(&left_row, right_row);

                if self.eval_condition(&combined, ctx.params())? {
                    self.current_left_matched = true;
                    self.stats.rows_produced += 1;
                    self.stats.total_next_time += start.elapsed();
                    return Ok(Some(combined));
                }
            }

            // Exhausted right side for this left row. A LEFT JOIN still emits
            // the outer row once, padded with nulls for the right columns.
            if self.join_type == JoinType::Left && !self.current_left_matched {
                self.current_left_matched = true;
                let padded = self.pad_unmatched(&left_row);
                self.stats.rows_produced += 1;
                self.stats.total_next_time += start.elapsed();
                return Ok(Some(padded));
            }

            // Advance to the next left row
            self.current_left_row = self.left_input.next(ctx)?;
            self.current_left_matched = false;
            self.right_cursor = 0;
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();

        self.right_materialized.clear();
        self.current_left_row = None;
        self.left_input.close(ctx)?;
        self.right_input.close(ctx)?;

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
