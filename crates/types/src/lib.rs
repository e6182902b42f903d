//! Dynamic value representation and the `Comparable` total order.
//!
//! Column cells are opaque at the storage layer: every row carries a small tagged union of
//! values (`{null, i32, i64, f64, decimal, utf8, blob, bool}`) rather than a single native Rust
//! type. `Comparable` gives these values a total order so the query compiler can emit a
//! comparison even when it cannot prove both sides share a native type at plan-construction
//! time; native-operator shortcuts (numeric upcast) are layered on top in the `expr`/`executor`
//! crates, not here.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Declared column type, independent of the value actually stored in a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int32,
    Int64,
    Float64,
    Decimal,
    Text,
    Blob,
    Bool,
}

/// Fixed-point decimal: `mantissa * 10^-scale`. Hand-rolled rather than pulled from a crate —
/// nothing in the dependency stack provides one, and the column-value arithmetic needed here
/// (compare, upcast to f64) doesn't warrant pulling one in.
#[derive(Clone, Copy, Debug, Eq, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Rescale two decimals to a common scale for comparison, without going through f64.
    fn common_scale(a: Decimal, b: Decimal) -> (i128, i128) {
        let scale = a.scale.max(b.scale);
        let am = a.mantissa * 10i128.pow(scale - a.scale);
        let bm = b.mantissa * 10i128.pow(scale - b.scale);
        (am, bm)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = Decimal::common_scale(*self, *other);
        a == b
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = Decimal::common_scale(*self, *other);
        a.cmp(&b)
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash on the normalized (scale-10 max) representation so equal decimals at different
        // scales hash identically.
        let normalized = (self.mantissa as f64 / 10f64.powi(self.scale as i32)).to_bits();
        normalized.hash(state);
    }
}

/// A dynamically-typed column value.
///
/// This is the on-the-wire, in-row representation described by the data model: every cell is
/// one of these tagged variants, never a bare native Rust type.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Null,
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for every numeric variant (used to decide whether the native-operator upcast path
    /// of the query compiler applies).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Float64(_) | Value::Decimal(_)
        )
    }

    /// Widen a numeric value to `f64`. Returns `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    /// Legacy same-type comparison, retained for call sites that already know both operands
    /// share a concrete type (e.g. index key ordering within a single column).
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|o| o == Ordering::Equal)
    }
}

/// A total order over dynamic values, used whenever the query compiler cannot prove both sides
/// of a comparison share a native type at plan-construction time (see the Query Compiler's
/// heterogeneous-value comparison rule). Numeric variants compare by value across subtypes;
/// non-numeric variants are ordered by a fixed type rank so the order is total rather than
/// partial — `Comparable::compare` never returns "incomparable".
///
/// Type rank for non-numeric/mixed comparisons: `Null < Bool < Numeric < Text < Blob`.
pub trait Comparable {
    fn compare(&self, other: &Self) -> Ordering;
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int32(_) | Value::Int64(_) | Value::Float64(_) | Value::Decimal(_) => 2,
        Value::Text(_) => 3,
        Value::Blob(_) => 4,
    }
}

/// `Value` has a total order via `Comparable` regardless of mixed numeric subtypes, so it can
/// key ordered containers (e.g. the primary-key index's `BTreeMap<Vec<Value>, RecordId>`)
/// directly.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
    }
}

impl Comparable for Value {
    fn compare(&self, other: &Value) -> Ordering {
        if self.is_numeric() && other.is_numeric() {
            // Decimal vs Decimal compares exactly; any other numeric pairing upcasts to f64,
            // matching the query compiler's widest-common-numeric-type rule.
            if let (Value::Decimal(a), Value::Decimal(b)) = (self, other) {
                return a.cmp(b);
            }
            return self
                .as_f64()
                .unwrap()
                .partial_cmp(&other.as_f64().unwrap())
                .unwrap_or(Ordering::Equal);
        }

        let (ra, rb) = (type_rank(self), type_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn cmp_same_type_works() {
        assert_eq!(Value::Int64(1).cmp_same_type(&Value::Int64(2)), Some(Less));
        assert_eq!(Value::Int64(1).cmp_same_type(&Value::Text("1".into())), None);
    }

    #[test]
    fn truthiness_is_strict() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
        assert_eq!(Value::Int64(1).as_bool(), None);
        assert_eq!(Value::Text("true".into()).as_bool(), None);
        assert_eq!(Value::Null.as_bool(), None);
    }

    #[test]
    fn comparisons_require_same_type() {
        assert_eq!(Value::Int64(1).cmp_same_type(&Value::Int64(2)), Some(Less));
        assert_eq!(
            Value::Text("a".into()).cmp_same_type(&Value::Text("a".into())),
            Some(Equal)
        );
        assert_eq!(
            Value::Bool(true).cmp_same_type(&Value::Bool(false)),
            Some(Greater)
        );
        assert_eq!(Value::Int64(1).cmp_same_type(&Value::Text("1".into())), None);
        assert_eq!(Value::Null.cmp_same_type(&Value::Int64(1)), None);
    }

    #[test]
    fn equality_requires_same_type() {
        assert_eq!(Value::Int64(1).eq_same_type(&Value::Int64(1)), Some(true));
        assert_eq!(Value::Int64(1).eq_same_type(&Value::Int64(2)), Some(false));
        assert_eq!(
            Value::Text("abc".into()).eq_same_type(&Value::Text("abc".into())),
            Some(true)
        );
        assert_eq!(
            Value::Bool(true).eq_same_type(&Value::Bool(false)),
            Some(false)
        );
        assert_eq!(Value::Text("1".into()).eq_same_type(&Value::Int64(1)), None);
    }

    #[test]
    fn serde_round_trip_stability() {
        let vals = vec![
            Value::Int32(-42),
            Value::Int64(-42),
            Value::Float64(1.5),
            Value::Decimal(Decimal::new(1234, 2)),
            Value::Text("Ada".into()),
            Value::Blob(vec![1, 2, 3]),
            Value::Bool(true),
            Value::Null,
        ];

        let json = serde_json::to_string(&vals).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();

        for (a, b) in vals.iter().zip(back.iter()) {
            assert_eq!(a.compare(b), Ordering::Equal);
        }
    }

    #[test]
    fn comparable_orders_numeric_across_subtypes() {
        assert_eq!(Value::Int32(1).compare(&Value::Int64(1)), Ordering::Equal);
        assert_eq!(Value::Int32(1).compare(&Value::Float64(1.0)), Ordering::Equal);
        assert_eq!(
            Value::Decimal(Decimal::new(150, 2)).compare(&Value::Float64(1.5)),
            Ordering::Equal
        );
        assert_eq!(Value::Int64(1).compare(&Value::Int64(2)), Ordering::Less);
    }

    #[test]
    fn comparable_is_total_across_types() {
        assert_eq!(Value::Null.compare(&Value::Bool(true)), Ordering::Less);
        assert_eq!(Value::Bool(true).compare(&Value::Int64(0)), Ordering::Less);
        assert_eq!(Value::Int64(0).compare(&Value::Text("".into())), Ordering::Less);
        assert_eq!(Value::Text("".into()).compare(&Value::Blob(vec![])), Ordering::Less);
    }

    #[test]
    fn decimal_compares_at_different_scales() {
        let a = Decimal::new(150, 2); // 1.50
        let b = Decimal::new(15, 1); // 1.5
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn order_is_antisymmetric(i in any::<i64>(), j in any::<i64>()) {
            let a = Value::Int64(i);
            let b = Value::Int64(j);
            prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
        }

        #[test]
        fn eq_reflexive(val in any::<i64>()) {
            let v = Value::Int64(val);
            prop_assert_eq!(v.compare(&v), Ordering::Equal);
        }

        #[test]
        fn text_cmp_matches_std(a in ".*", b in ".*") {
            let va = Value::Text(a.clone());
            let vb = Value::Text(b.clone());
            prop_assert_eq!(va.compare(&vb), a.cmp(&b));
        }

        #[test]
        fn numeric_upcast_matches_f64(i in any::<i32>(), f in any::<f64>()) {
            let a = Value::Int32(i);
            let b = Value::Float64(f);
            let expected = (i as f64).partial_cmp(&f).unwrap_or(Ordering::Equal);
            prop_assert_eq!(a.compare(&b), expected);
        }
    }
}
