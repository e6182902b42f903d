//! Property-based test generators using proptest.
//!
//! Provides `Arbitrary` implementations and strategies for generating
//! random test data for property-based testing of core database types.

use common::Row;
use proptest::prelude::*;
use types::{Decimal, SqlType, Value};
use wal::WalRecord;

/// Strategy for generating random `Value` instances.
///
/// Covers every `Value` variant so property tests exercise the full type space,
/// including cross-type numeric comparisons.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::Float64),
        (any::<i128>(), 0u32..6).prop_map(|(mantissa, scale)| Value::Decimal(Decimal::new(mantissa, scale))),
        "[a-z]{1,20}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

/// Strategy for generating random `Row` instances.
///
/// Generates rows with 1-10 columns of random values.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_row;
///
/// proptest! {
///     #[test]
///     fn test_row_property(row in arb_row()) {
///         // Test invariants about rows
///         assert!(!row.values.is_empty());
///     }
/// }
/// ```
pub fn arb_row() -> impl Strategy<Value = Row> {
    prop::collection::vec(arb_value(), 1..10).prop_map(Row::new)
}

/// Strategy for generating random `Row` instances with a fixed number of columns.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_row_with_len;
///
/// proptest! {
///     #[test]
///     fn test_fixed_row(row in arb_row_with_len(3)) {
///         assert_eq!(row.values.len(), 3);
///     }
/// }
/// ```
pub fn arb_row_with_len(len: usize) -> impl Strategy<Value = Row> {
    prop::collection::vec(arb_value(), len).prop_map(Row::new)
}

/// Strategy for generating random `SqlType` instances.
pub fn arb_sql_type() -> impl Strategy<Value = SqlType> {
    prop_oneof![
        Just(SqlType::Int32),
        Just(SqlType::Int64),
        Just(SqlType::Float64),
        Just(SqlType::Decimal),
        Just(SqlType::Text),
        Just(SqlType::Blob),
        Just(SqlType::Bool),
    ]
}

/// Strategy for generating WAL records for testing.
///
/// Generates Insert, Update, and Delete records with random data.
pub fn arb_wal_record() -> impl Strategy<Value = WalRecord> {
    prop_oneof![
        (any::<u64>(), arb_row(), any::<u64>(), any::<u16>()).prop_map(
            |(table_id, row, page_id, slot)| {
                WalRecord::Insert {
                    table: common::TableId(table_id),
                    row: row.into_values(),
                    rid: common::RecordId {
                        page_id: common::PageId(page_id),
                        slot
                    },
                }
            }
        ),
        (any::<u64>(), arb_row(), any::<u64>(), any::<u16>()).prop_map(
            |(table_id, row, page_id, slot)| {
                WalRecord::Update {
                    table: common::TableId(table_id),
                    new_row: row.into_values(),
                    rid: common::RecordId {
                        page_id: common::PageId(page_id),
                        slot
                    },
                }
            }
        ),
        (any::<u64>(), any::<u64>(), any::<u16>()).prop_map(|(table_id, page_id, slot)| {
            WalRecord::Delete {
                table: common::TableId(table_id),
                rid: common::RecordId {
                    page_id: common::PageId(page_id),
                    slot
                },
            }
        }),
    ]
}


/// Property test helpers for common invariants.
pub mod properties {
    use super::*;
    use bincode::config;
    use bincode::serde::{decode_from_slice, encode_to_vec};

    /// Test that a row can be serialized and deserialized without loss.
    pub fn assert_row_roundtrip_serde(row: &Row) {
        let encoded = encode_to_vec(row, config::legacy()).expect("encode failed");
        let (decoded, _): (Row, _) =
            decode_from_slice(&encoded, config::legacy()).expect("decode failed");
        assert_eq!(row.values, decoded.values, "Row roundtrip failed");
    }

    /// Test that a value can be serialized and deserialized without loss.
    pub fn assert_value_roundtrip_serde(value: &Value) {
        let encoded = encode_to_vec(value, config::legacy()).expect("encode failed");
        let (decoded, _): (Value, _) =
            decode_from_slice(&encoded, config::legacy()).expect("decode failed");
        assert_eq!(value, &decoded, "Value roundtrip failed");
    }
}
