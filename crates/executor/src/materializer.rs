//! Cached, thread-safe reconstruction of row records from a page slice.
//!
//! A scan operator pulls a row's raw encoded bytes from the buffer pool and
//! hands them to a `RowMaterializer` to turn into a named-field record. The
//! materializer reuses one scratch row per instance instead of allocating a
//! fresh `Row` for every call; the scratch is held behind an exclusive lock
//! for the duration of a single `materialize` call and never exposed.

use bincode::serde::decode_from_slice;
use common::{DbError, DbResult, Row};
use std::sync::Mutex;
use types::Value;

/// A fully-owned row reconstructed against a schema: one `(column name, value)`
/// pair per column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRow {
    fields: Vec<(String, Value)>,
}

impl MaterializedRow {
    /// Look up a field by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// Column values in schema order, discarding the names.
    pub fn into_values(self) -> Vec<Value> {
        self.fields.into_iter().map(|(_, v)| v).collect()
    }

    /// Reassemble into a positional `Row`, attaching `rid`.
    pub fn into_row(self, rid: common::RecordId) -> Row {
        Row::new(self.into_values()).with_rid(rid)
    }
}

/// Decodes row-bytes slices against a fixed schema into owned records.
///
/// One instance is meant to be reused across every row a scan pulls from a
/// single table, rather than constructed per row. Not `Sync` by sharing
/// across threads concurrently in the usual sense — `materialize` takes
/// `&self` and serializes access internally, so callers that want per-thread
/// throughput should give each thread its own instance instead of contending
/// on one.
pub struct RowMaterializer {
    schema: Vec<String>,
    scratch: Mutex<Row>,
}

impl RowMaterializer {
    pub fn new(schema: Vec<String>) -> Self {
        Self {
            schema,
            scratch: Mutex::new(Row::new(Vec::new())),
        }
    }

    /// Decode `bytes` (a row's raw encoded page payload) into a fresh record.
    ///
    /// Holds the scratch row under an exclusive lock for the duration of the
    /// decode and copy; the scratch itself is never returned to the caller.
    pub fn materialize(&self, bytes: &[u8]) -> DbResult<MaterializedRow> {
        let mut scratch = self
            .scratch
            .lock()
            .map_err(|_| DbError::Executor("row materializer scratch lock poisoned".into()))?;

        let (decoded, _): (Row, _) = decode_from_slice(bytes, storage::bincode_config())
            .map_err(|e| DbError::Storage(format!("deserialize row failed: {e}")))?;
        *scratch = decoded;

        if scratch.values.len() != self.schema.len() {
            return Err(DbError::Storage(format!(
                "row has {} values but schema has {} columns",
                scratch.values.len(),
                self.schema.len()
            )));
        }

        let fields = self
            .schema
            .iter()
            .cloned()
            .zip(scratch.values.iter().cloned())
            .collect();
        Ok(MaterializedRow { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bincode::serde::encode_to_vec;

    fn encode_row(values: Vec<Value>) -> Vec<u8> {
        encode_to_vec(&Row::new(values), storage::bincode_config()).unwrap()
    }

    #[test]
    fn materialize_round_trips_values_against_schema() {
        let materializer = RowMaterializer::new(vec!["id".into(), "name".into()]);
        let bytes = encode_row(vec![Value::Int64(7), Value::Text("alice".into())]);

        let record = materializer.materialize(&bytes).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Int64(7)));
        assert_eq!(record.get("name"), Some(&Value::Text("alice".into())));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn materialize_reuses_scratch_across_calls() {
        let materializer = RowMaterializer::new(vec!["id".into()]);

        let first = materializer
            .materialize(&encode_row(vec![Value::Int64(1)]))
            .unwrap();
        let second = materializer
            .materialize(&encode_row(vec![Value::Int64(2)]))
            .unwrap();

        assert_eq!(first.get("id"), Some(&Value::Int64(1)));
        assert_eq!(second.get("id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn materialize_rejects_schema_arity_mismatch() {
        let materializer = RowMaterializer::new(vec!["id".into(), "name".into()]);
        let bytes = encode_row(vec![Value::Int64(1)]);
        assert!(materializer.materialize(&bytes).is_err());
    }

    #[test]
    fn into_row_preserves_rid_and_order() {
        let materializer = RowMaterializer::new(vec!["id".into(), "name".into()]);
        let bytes = encode_row(vec![Value::Int64(3), Value::Text("bob".into())]);
        let record = materializer.materialize(&bytes).unwrap();

        let rid = common::RecordId {
            page_id: common::PageId(0),
            slot: 1,
        };
        let row = record.into_row(rid);
        assert_eq!(row.rid(), Some(rid));
        assert_eq!(row.values, vec![Value::Int64(3), Value::Text("bob".into())]);
    }
}
