//! Builder: constructs executor trees from physical plans.

use crate::{
    dml::{DeleteExec, InsertExec, UpdateExec},
    filter::FilterExec,
    join::NestedLoopJoinExec,
    limit::LimitExec,
    project::ProjectExec,
    scan::{IndexScanExec, SeqScanExec},
    sort::{SortExec, SortKey},
    Executor,
};
use catalog::Catalog;
use common::DbResult;
use planner::PhysicalPlan;

/// Build an executor tree from a physical plan.
///
/// Recursively constructs operator instances, wiring up child inputs. Needs
/// the catalog to resolve table schemas for UPDATE/DELETE's implicit scan.
///
/// # Errors
///
/// Returns `DbError::Executor` if the plan contains unsupported operators.
pub fn build_executor(plan: PhysicalPlan, catalog: &Catalog) -> DbResult<Box<dyn Executor>> {
    match plan {
        PhysicalPlan::SeqScan { table_id, schema } => {
            Ok(Box::new(SeqScanExec::new(table_id, schema)))
        }

        PhysicalPlan::IndexScan {
            table_id,
            index_name,
            predicate,
            schema,
        } => Ok(Box::new(
            IndexScanExec::builder()
                .table_id(table_id)
                .index_name(index_name)
                .predicate(predicate)
                .schema(schema)
                .build(),
        )),

        PhysicalPlan::Filter { input, predicate } => {
            let child = build_executor(*input, catalog)?;
            Ok(Box::new(FilterExec::new(child, predicate)))
        }

        PhysicalPlan::Project { input, columns } => {
            let child = build_executor(*input, catalog)?;
            Ok(Box::new(ProjectExec::new(child, columns)))
        }

        PhysicalPlan::Insert { table_id, values } => {
            // No input operator for INSERT
            let schema = vec![]; // INSERT doesn't produce a schema
            Ok(Box::new(InsertExec::new(table_id, schema, values)))
        }

        PhysicalPlan::Update {
            table_id,
            assignments,
            predicate,
        } => {
            // Build scan + optional filter as input
            let table_schema = table_column_names(table_id, catalog)?;
            let mut input: Box<dyn Executor> =
                Box::new(SeqScanExec::new(table_id, table_schema));

            if let Some(pred) = predicate {
                input = Box::new(FilterExec::new(input, pred));
            }

            let schema = vec![];
            Ok(Box::new(
                UpdateExec::builder()
                    .table_id(table_id)
                    .schema(schema)
                    .input(input)
                    .assignments(assignments)
                    .build(),
            ))
        }

        PhysicalPlan::Delete {
            table_id,
            predicate,
        } => {
            // Build scan + optional filter as input
            let table_schema = table_column_names(table_id, catalog)?;
            let mut input: Box<dyn Executor> =
                Box::new(SeqScanExec::new(table_id, table_schema));

            if let Some(pred) = predicate {
                input = Box::new(FilterExec::new(input, pred));
            }

            let schema = vec![];
            Ok(Box::new(DeleteExec::new(table_id, schema, input)))
        }

        PhysicalPlan::Sort { input, order_by } => {
            let child = build_executor(*input, catalog)?;
            let sort_keys = order_by
                .into_iter()
                .map(|o| SortKey {
                    column_id: o.column_id,
                    direction: o.direction,
                })
                .collect();
            Ok(Box::new(SortExec::new(child, sort_keys)))
        }

        PhysicalPlan::Limit {
            input,
            limit,
            offset,
        } => {
            let child = build_executor(*input, catalog)?;
            Ok(Box::new(LimitExec::new(child, limit, offset)))
        }

        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            join_type,
            condition,
            right_arity,
            schema,
        } => {
            let left_child = build_executor(*left, catalog)?;
            let right_child = build_executor(*right, catalog)?;
            Ok(Box::new(NestedLoopJoinExec::new(
                left_child,
                right_child,
                join_type,
                condition,
                right_arity,
                schema,
            )))
        }
    }
}

/// Resolve a table's column names from the catalog, in ordinal order.
fn table_column_names(table_id: common::TableId, catalog: &Catalog) -> DbResult<Vec<String>> {
    let table = catalog.table_by_id(table_id)?;
    Ok(table
        .schema
        .columns
        .iter()
        .map(|col| col.name.clone())
        .collect())
}
