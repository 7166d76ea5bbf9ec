//! Decoded values and the output object model.
//!
//! Every parse produces a [Record]: an ordered map from field name to
//! [Value]. Nested fields produce sub-records, arrays produce [Value::Array]
//! or, when re-keyed, [Value::Record].

use std::collections::BTreeMap;
use std::fmt;

/// A decoded output object: field name to value, in name order.
pub type Record = BTreeMap<String, Value>;

/// A value produced by decoding a field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Raw bytes copied out of the source.
    Bytes(Vec<u8>),
    Str(String),
    Array(Vec<Value>),
    /// A nested object, or an array re-keyed by an inner field.
    Record(Record),
}

impl Value {
    /// The value as a nonnegative integer, if it is one.
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Value::U64(v) => usize::try_from(*v).ok(),
            Value::I64(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Scalars render in their natural form; bytes as lowercase hex. Used
    /// for keyed-array keys and error messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U64(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Array(_) | Value::Record(_) => write!(f, "{self:?}"),
        }
    }
}

/// Inserts `value` at a `/`-free path of map keys, creating intermediate
/// records on demand. A non-record value sitting on an intermediate segment
/// is replaced.
pub(crate) fn insert_at_path(rec: &mut Record, path: &[String], value: Value) {
    debug_assert!(!path.is_empty());

    let mut cur = rec;
    for segment in &path[..path.len() - 1] {
        let slot = cur
            .entry(segment.clone())
            .or_insert_with(|| Value::Record(Record::new()));
        if !matches!(slot, Value::Record(_)) {
            *slot = Value::Record(Record::new());
        }
        match slot {
            Value::Record(inner) => cur = inner,
            _ => unreachable!(),
        }
    }

    if let Some(last) = path.last() {
        cur.insert(last.clone(), value);
    }
}
