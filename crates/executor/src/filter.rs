//! Filter operator: applies WHERE predicates.

use crate::{ExecutionContext, Executor};
use common::{DbResult, ExecutionStats, Row};
use planner::ResolvedExpr;
use std::time::Instant;
use types::{Comparable, Value};

/// Filter operator - applies a predicate to rows from a child operator.
///
/// Only passes through rows where the predicate evaluates to true.
/// NULL predicate results are treated as false (SQL semantics).
pub struct FilterExec {
    input: Box<dyn Executor>,
    predicate: ResolvedExpr,
    stats: ExecutionStats,
}

impl FilterExec {
    /// Create a new filter operator.
    pub fn new(input: Box<dyn Executor>, predicate: ResolvedExpr) -> Self {
        Self {
            input,
            predicate,
            stats: ExecutionStats::default(),
        }
    }

    /// Evaluate the predicate against a row.
    fn eval_predicate(&self, row: &Row, params: &[Value]) -> DbResult<bool> {
        let result = eval_resolved_expr_with_params(&self.predicate, row, params)?;

        // NULL is treated as false in WHERE clauses
        match result {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(common::DbError::Executor(format!(
                "predicate must evaluate to boolean, got {:?}",
                other
            ))),
        }
    }
}

impl Executor for FilterExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        self.stats = ExecutionStats::default();
        let result = self.input.open(ctx)?;
        self.stats.open_time = start.elapsed();
        Ok(result)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        let start = Instant::now();

        loop {
            let row = match self.input.next(ctx)? {
                Some(r) => r,
                None => {
                    self.stats.total_next_time += start.elapsed();
                    return Ok(None);
                }
            };

            if self.eval_predicate(&row, ctx.params())? {
                self.stats.rows_produced += 1;
                self.stats.total_next_time += start.elapsed();
                return Ok(Some(row));
            } else {
                self.stats.rows_filtered += 1;
            }
        }
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        let start = Instant::now();
        let result = self.input.close(ctx)?;
        self.stats.close_time = start.elapsed();
        Ok(result)
    }

    fn schema(&self) -> &[String] {
        self.input.schema()
    }

    fn stats(&self) -> Option<&ExecutionStats> {
        Some(&self.stats)
    }
}

/// Evaluate a resolved expression against a row.
///
/// This is the core expression evaluator for the executor. It handles
/// column references, literals, and unary/binary operations. Equivalent to
/// [`eval_resolved_expr_with_params`] with an empty parameter vector; any
/// `ResolvedExpr::Parameter` in `expr` will fail to resolve.
pub fn eval_resolved_expr(expr: &ResolvedExpr, row: &Row) -> DbResult<Value> {
    eval_resolved_expr_with_params(expr, row, &[])
}

/// Evaluate a resolved expression against a row, resolving
/// `ResolvedExpr::Parameter(idx)` nodes against `params[idx]`.
pub fn eval_resolved_expr_with_params(
    expr: &ResolvedExpr,
    row: &Row,
    params: &[Value],
) -> DbResult<Value> {
    match expr {
        ResolvedExpr::Literal(v) => Ok(v.clone()),
        ResolvedExpr::Column(col_id) => {
            let idx = *col_id as usize;
            row.values
                .get(idx)
                .ok_or_else(|| {
                    common::DbError::Executor(format!(
                        "column index {} out of bounds (row has {} columns)",
                        idx,
                        row.values.len()
                    ))
                })
                .cloned()
        }
        ResolvedExpr::Parameter(idx) => params
            .get(*idx as usize)
            .cloned()
            .ok_or_else(|| {
                common::DbError::Executor(format!(
                    "parameter index {} has no bound value ({} bound)",
                    idx,
                    params.len()
                ))
            }),
        ResolvedExpr::Unary { op, expr } => {
            let val = eval_resolved_expr_with_params(expr, row, params)?;
            eval_unary_op(*op, val)
        }
        ResolvedExpr::Binary { left, op, right } => {
            let left_val = eval_resolved_expr_with_params(left, row, params)?;
            let right_val = eval_resolved_expr_with_params(right, row, params)?;
            eval_binary_op(left_val, *op, right_val)
        }
        ResolvedExpr::In {
            expr,
            list,
            negated,
        } => {
            let needle = eval_resolved_expr_with_params(expr, row, params)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut found = false;
            let mut saw_null = false;
            for item in list {
                let candidate = eval_resolved_expr_with_params(item, row, params)?;
                if candidate.is_null() {
                    saw_null = true;
                    continue;
                }
                if needle.cmp_same_type(&candidate) == Some(std::cmp::Ordering::Equal) {
                    found = true;
                    break;
                }
            }
            Ok(match (found, saw_null) {
                (true, _) => Value::Bool(!negated),
                (false, true) => Value::Null,
                (false, false) => Value::Bool(*negated),
            })
        }
        ResolvedExpr::Like {
            expr,
            pattern,
            negated,
        } => {
            let value = eval_resolved_expr_with_params(expr, row, params)?;
            let pattern_value = eval_resolved_expr_with_params(pattern, row, params)?;
            if value.is_null() || pattern_value.is_null() {
                return Ok(Value::Null);
            }
            let haystack = value.as_text().ok_or_else(|| {
                common::DbError::Executor(format!("LIKE expects text, got {:?}", value))
            })?;
            let needle = pattern_value.as_text().ok_or_else(|| {
                common::DbError::Executor(format!(
                    "LIKE pattern must be text, got {:?}",
                    pattern_value
                ))
            })?;
            let matched = expr::like_match(haystack, needle);
            Ok(Value::Bool(matched != *negated))
        }
    }
}

/// Evaluate a unary operation.
fn eval_unary_op(op: expr::UnaryOp, val: Value) -> DbResult<Value> {
    use expr::UnaryOp;

    match (op, val) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, val) => Err(common::DbError::Executor(format!(
            "NOT requires boolean, got {:?}",
            val
        ))),
    }
}

/// Evaluate a binary operation.
///
/// Comparisons between two numeric operands (any mix of `Int32`/`Int64`/
/// `Float64`/`Decimal`) go through `Comparable::compare`, which upcasts to a
/// common numeric type before ordering — this is what lets `price > 100`
/// compare a `Float64` column against an `Int64` literal instead of
/// rejecting it as a type mismatch. Same-variant operands (`Text`/`Text`,
/// `Bool`/`Bool`, ...) compare via `cmp_same_type`. Anything else (comparing
/// across non-numeric variants, e.g. `Int` vs `Text`) is a genuine type
/// error.
fn eval_binary_op(left: Value, op: expr::BinaryOp, right: Value) -> DbResult<Value> {
    use expr::BinaryOp;
    use std::cmp::Ordering;

    // Handle NULL propagation
    if matches!(left, Value::Null) || matches!(right, Value::Null) {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::And | BinaryOp::Or => {
            let lb = left.as_bool().ok_or_else(|| {
                common::DbError::Executor(format!("AND/OR expects bools, got {:?}", left))
            })?;
            let rb = right.as_bool().ok_or_else(|| {
                common::DbError::Executor(format!("AND/OR expects bools, got {:?}", right))
            })?;
            Ok(Value::Bool(match op {
                BinaryOp::And => lb && rb,
                BinaryOp::Or => lb || rb,
                _ => unreachable!(),
            }))
        }
        _ => {
            let ord = if left.is_numeric() && right.is_numeric() {
                left.compare(&right)
            } else {
                left.cmp_same_type(&right).ok_or_else(|| {
                    common::DbError::Executor(format!(
                        "invalid binary operation: {:?} {:?} {:?}",
                        left, op, right
                    ))
                })?
            };

            let result = match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::Ne => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                BinaryOp::Ge => ord != Ordering::Less,
                BinaryOp::And | BinaryOp::Or => unreachable!(),
            };

            Ok(Value::Bool(result))
        }
    }
}
