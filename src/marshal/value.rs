use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::catalog::NativeRepr;

/// A leaf value shared by the host and wire forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Scalar {
    pub fn native(&self) -> NativeRepr {
        match self {
            Scalar::Bool(_) => NativeRepr::Bool,
            Scalar::Int16(_) => NativeRepr::Int16,
            Scalar::Int32(_) => NativeRepr::Int32,
            Scalar::Int64(_) => NativeRepr::Int64,
            Scalar::Float32(_) => NativeRepr::Float32,
            Scalar::Float64(_) => NativeRepr::Float64,
            Scalar::Text(_) => NativeRepr::Text,
            Scalar::Bytes(_) => NativeRepr::Bytes,
            Scalar::Uuid(_) => NativeRepr::Uuid,
            Scalar::Date(_) => NativeRepr::Date,
            Scalar::Time(_) => NativeRepr::Time,
            Scalar::Timestamp(_) => NativeRepr::Timestamp,
            Scalar::TimestampTz(_) => NativeRepr::TimestampTz,
            Scalar::Json(_) => NativeRepr::Json,
        }
    }

    /// Convert to `target`, allowing lossless integer and float widening
    /// and integer narrowing when the value fits.
    pub fn coerce(&self, target: NativeRepr) -> Option<Scalar> {
        if self.native() == target {
            return Some(self.clone());
        }
        let int = match self {
            Scalar::Int16(v) => Some(i64::from(*v)),
            Scalar::Int32(v) => Some(i64::from(*v)),
            Scalar::Int64(v) => Some(*v),
            _ => None,
        };
        match (int, target) {
            (Some(v), NativeRepr::Int16) => i16::try_from(v).ok().map(Scalar::Int16),
            (Some(v), NativeRepr::Int32) => i32::try_from(v).ok().map(Scalar::Int32),
            (Some(v), NativeRepr::Int64) => Some(Scalar::Int64(v)),
            (None, NativeRepr::Float64) => match self {
                Scalar::Float32(v) => Some(Scalar::Float64(f64::from(*v))),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int16(i) => i.to_string(),
            Scalar::Int32(i) => i.to_string(),
            Scalar::Int64(i) => i.to_string(),
            Scalar::Float32(f) => f.to_string(),
            Scalar::Float64(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
            Scalar::Bytes(b) => format!("[{} bytes]", b.len()),
            Scalar::Uuid(u) => u.to_string(),
            Scalar::Date(d) => d.to_string(),
            Scalar::Time(t) => t.to_string(),
            Scalar::Timestamp(dt) => dt.to_string(),
            Scalar::TimestampTz(dt) => dt.to_string(),
            Scalar::Json(j) => j.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound<T> {
    Inclusive(T),
    Exclusive(T),
    Unbounded,
}

impl<T> RangeBound<T> {
    pub fn try_map<U, E>(&self, f: impl FnOnce(&T) -> Result<U, E>) -> Result<RangeBound<U>, E> {
        Ok(match self {
            RangeBound::Inclusive(v) => RangeBound::Inclusive(f(v)?),
            RangeBound::Exclusive(v) => RangeBound::Exclusive(f(v)?),
            RangeBound::Unbounded => RangeBound::Unbounded,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeValue<T> {
    Empty,
    Bounds {
        lower: RangeBound<T>,
        upper: RangeBound<T>,
    },
}

impl<T> RangeValue<T> {
    /// Map both bounds, keeping inclusivity and emptiness as they are.
    pub fn try_map<U, E>(&self, mut f: impl FnMut(&T) -> Result<U, E>) -> Result<RangeValue<U>, E> {
        Ok(match self {
            RangeValue::Empty => RangeValue::Empty,
            RangeValue::Bounds { lower, upper } => RangeValue::Bounds {
                lower: lower.try_map(&mut f)?,
                upper: upper.try_map(&mut f)?,
            },
        })
    }
}

/// Host form of a value: what callers build parameters from and what rows
/// decode into.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Scalar(Scalar),
    /// An enum label.
    Enum(String),
    /// A domain value: a one-field wrapper around the underlying value.
    Domain(Box<Value>),
    /// A composite value as named fields.
    Record(Vec<(String, Value)>),
    Array(Vec<Value>),
    Range(Box<RangeValue<Value>>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(s) => s.native().label(),
            Value::Enum(_) => "enum",
            Value::Domain(_) => "domain",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Range(_) => "range",
        }
    }

    pub fn enum_label(label: impl Into<String>) -> Self {
        Value::Enum(label.into())
    }

    pub fn domain(inner: impl Into<Value>) -> Self {
        Value::Domain(Box::new(inner.into()))
    }

    pub fn record<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn range(range: RangeValue<Value>) -> Self {
        Value::Range(Box::new(range))
    }

    /// Field of a record value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Scalar(s) => s.display(),
            Value::Enum(label) => label.clone(),
            Value::Domain(inner) => inner.display(),
            Value::Record(fields) => {
                let items: Vec<String> = fields
                    .iter()
                    .map(|(name, v)| format!("{}: {}", name, v.display()))
                    .collect();
                format!("({})", items.join(", "))
            }
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Range(range) => display_range(range, Value::display),
        }
    }
}

/// Protocol form of a value: already shaped for binding.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Scalar(Scalar),
    Array {
        /// Unqualified name of the element type.
        element_type: String,
        elements: Vec<WireValue>,
    },
    /// Composite fields in attribute-number order.
    Record(Vec<WireValue>),
    Range(Box<RangeValue<WireValue>>),
}

impl WireValue {
    pub fn text(s: impl Into<String>) -> Self {
        WireValue::Scalar(Scalar::Text(s.into()))
    }

    pub fn label(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Scalar(s) => s.native().label(),
            WireValue::Array { .. } => "array",
            WireValue::Record(_) => "record",
            WireValue::Range(_) => "range",
        }
    }
}

fn display_range<T>(range: &RangeValue<T>, show: impl Fn(&T) -> String) -> String {
    match range {
        RangeValue::Empty => "empty".to_string(),
        RangeValue::Bounds { lower, upper } => {
            let (open, low) = match lower {
                RangeBound::Inclusive(v) => ("[", show(v)),
                RangeBound::Exclusive(v) => ("(", show(v)),
                RangeBound::Unbounded => ("(", String::new()),
            };
            let (close, high) = match upper {
                RangeBound::Inclusive(v) => ("]", show(v)),
                RangeBound::Exclusive(v) => (")", show(v)),
                RangeBound::Unbounded => (")", String::new()),
            };
            format!("{}{},{}{}", open, low, high, close)
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::$variant(v))
                }
            }

            impl From<$ty> for WireValue {
                fn from(v: $ty) -> Self {
                    WireValue::Scalar(Scalar::$variant(v))
                }
            }
        )*
    };
}

scalar_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::Scalar(Scalar::Text(s.to_string()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(Scalar::Int32(5).coerce(NativeRepr::Int64), Some(Scalar::Int64(5)));
        assert_eq!(Scalar::Int64(7).coerce(NativeRepr::Int16), Some(Scalar::Int16(7)));
        assert_eq!(Scalar::Int64(i64::MAX).coerce(NativeRepr::Int32), None);
        assert_eq!(Scalar::Float32(1.5).coerce(NativeRepr::Float64), Some(Scalar::Float64(1.5)));
        assert_eq!(Scalar::Text("1".into()).coerce(NativeRepr::Int32), None);
    }

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("a"), Value::Scalar(Scalar::Text("a".into())));
        assert_eq!(Value::from(5), Value::Scalar(Scalar::Int32(5)));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(WireValue::from(5i64), WireValue::Scalar(Scalar::Int64(5)));
    }

    #[test]
    fn test_record_field_lookup() {
        let rec = Value::record([("a", Value::from(1)), ("b", Value::Null)]);
        assert_eq!(rec.field("a"), Some(&Value::from(1)));
        assert_eq!(rec.field("b"), Some(&Value::Null));
        assert_eq!(rec.field("c"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.display(), "NULL");
        assert_eq!(Value::array([1, 2, 3]).display(), "{1, 2, 3}");
        assert_eq!(
            Value::record([("street", Value::from("Main"))]).display(),
            "(street: Main)"
        );
        let range = Value::range(RangeValue::Bounds {
            lower: RangeBound::Inclusive(Value::from(1)),
            upper: RangeBound::Exclusive(Value::from(10)),
        });
        assert_eq!(range.display(), "[1,10)");
        assert_eq!(Value::range(RangeValue::Empty).display(), "empty");
    }
}
