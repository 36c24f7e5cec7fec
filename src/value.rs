//! Value kinds, column value conversions and materialized rows.
//!
//! Every bound parameter and every materialized column travels as a
//! `sea_query::Value`. [`ColumnValue`] maps Rust field types onto those values
//! and onto the [`ValueKind`] that drives dialect-specific typing.

use crate::error::OrmError;
use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_query::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primitive kind of a mapped column or bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    DateTime,
    Boolean,
    Guid,
}

impl ValueKind {
    /// Classify a bound value.
    ///
    /// Variants without a dedicated kind are typed as strings.
    pub fn of(value: &Value) -> ValueKind {
        match value {
            Value::TinyInt(_) | Value::SmallInt(_) | Value::TinyUnsigned(_) => ValueKind::Int16,
            Value::Int(_) | Value::SmallUnsigned(_) => ValueKind::Int32,
            Value::BigInt(_) | Value::Unsigned(_) | Value::BigUnsigned(_) => ValueKind::Int64,
            Value::Float(_) | Value::Double(_) => ValueKind::Double,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::ChronoDateTime(_) => ValueKind::DateTime,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Uuid(_) => ValueKind::Guid,
            _ => ValueKind::String,
        }
    }

    /// Typed null for this kind
    pub fn null_value(self) -> Value {
        match self {
            ValueKind::String => Value::String(None),
            ValueKind::Int16 => Value::SmallInt(None),
            ValueKind::Int32 => Value::Int(None),
            ValueKind::Int64 => Value::BigInt(None),
            ValueKind::Decimal => Value::Decimal(None),
            ValueKind::Double => Value::Double(None),
            ValueKind::DateTime => Value::ChronoDateTime(None),
            ValueKind::Boolean => Value::Bool(None),
            ValueKind::Guid => Value::Uuid(None),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueKind::Int16
                | ValueKind::Int32
                | ValueKind::Int64
                | ValueKind::Decimal
                | ValueKind::Double
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Int16 => "int16",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Decimal => "decimal",
            ValueKind::Double => "double",
            ValueKind::DateTime => "datetime",
            ValueKind::Boolean => "boolean",
            ValueKind::Guid => "guid",
        };
        f.write_str(name)
    }
}

/// Whether a value is SQL NULL
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDateTime(None)
            | Value::Decimal(None)
            | Value::Uuid(None)
    )
}

/// Mapping between a Rust field type and a bound `Value`.
///
/// `Option<T>` unwraps to the kind of `T`; enum columns map through their
/// underlying integer with [`column_enum!`](crate::column_enum).
pub trait ColumnValue: Sized {
    /// Kind used for parameter typing and dialect type names
    const KIND: ValueKind;

    /// Convert to a bound value
    fn to_value(&self) -> Value;

    /// Convert from a materialized value
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParseError` on NULL (for non-optional types) or on a
    /// value of an incompatible variant.
    fn from_value(value: &Value) -> Result<Self, OrmError>;

    /// Typed null for this column type
    fn null_value() -> Value {
        Self::KIND.null_value()
    }
}

fn mismatch(expected: ValueKind, actual: &Value) -> OrmError {
    if is_null(actual) {
        OrmError::ParseError(format!("expected {expected}, found NULL"))
    } else {
        OrmError::ParseError(format!("expected {expected}, found {actual:?}"))
    }
}

/// Integral view of a value, widening the smaller integer variants.
pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(v)) => Some(i64::from(*v)),
        Value::SmallInt(Some(v)) => Some(i64::from(*v)),
        Value::Int(Some(v)) => Some(i64::from(*v)),
        Value::BigInt(Some(v)) => Some(*v),
        Value::TinyUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::Unsigned(Some(v)) => Some(i64::from(*v)),
        Value::BigUnsigned(Some(v)) => i64::try_from(*v).ok(),
        _ => None,
    }
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(Some(v)) => Some(f64::from(*v)),
        Value::Double(Some(v)) => Some(*v),
        Value::Decimal(Some(d)) => Decimal::to_f64(d),
        other => as_i64(other).map(|v| v as f64),
    }
}

pub(crate) fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(Some(d)) => Some(Decimal::clone(d)),
        Value::Float(Some(v)) => Decimal::try_from(f64::from(*v)).ok(),
        Value::Double(Some(v)) => Decimal::try_from(*v).ok(),
        other => as_i64(other).map(Decimal::from),
    }
}

/// Convert a value to another kind, as a SQL-level cast would.
///
/// # Errors
///
/// Returns `OrmError::ParseError` when the value cannot be represented in the
/// target kind (overflow, non-numeric source for a numeric target).
pub fn cast_value(value: &Value, kind: ValueKind) -> Result<Value, OrmError> {
    if is_null(value) {
        return Ok(kind.null_value());
    }
    if ValueKind::of(value) == kind && is_canonical(value, kind) {
        return Ok(value.clone());
    }
    let overflow = || OrmError::ParseError(format!("cannot convert {value:?} to {kind}"));
    match kind {
        ValueKind::Int16 => {
            let v = as_i64(value).ok_or_else(overflow)?;
            i16::try_from(v).map(|v| Value::SmallInt(Some(v))).map_err(|_| overflow())
        }
        ValueKind::Int32 => {
            let v = as_i64(value).ok_or_else(overflow)?;
            i32::try_from(v).map(|v| Value::Int(Some(v))).map_err(|_| overflow())
        }
        ValueKind::Int64 => as_i64(value).map(|v| Value::BigInt(Some(v))).ok_or_else(overflow),
        ValueKind::Double => as_f64(value).map(|v| Value::Double(Some(v))).ok_or_else(overflow),
        ValueKind::Decimal => as_decimal(value).map(Value::from).ok_or_else(overflow),
        ValueKind::String => match value {
            Value::String(Some(s)) => Ok(Value::String(Some(String::clone(s)))),
            other => Ok(Value::String(Some(display_value(other)))),
        },
        ValueKind::Boolean | ValueKind::DateTime | ValueKind::Guid => Err(overflow()),
    }
}

/// Whether `value` already uses the variant bound for `kind` columns.
/// String columns accept every text-like variant as is.
fn is_canonical(value: &Value, kind: ValueKind) -> bool {
    kind == ValueKind::String
        || std::mem::discriminant(value) == std::mem::discriminant(&kind.null_value())
}

/// Plain-text rendering used for SQL logging and string casts
pub fn display_value(value: &Value) -> String {
    if is_null(value) {
        return "NULL".to_string();
    }
    match value {
        Value::String(Some(s)) => String::clone(s),
        Value::Bool(Some(b)) => b.to_string(),
        Value::ChronoDateTime(Some(dt)) => NaiveDateTime::clone(dt).to_string(),
        Value::Decimal(Some(d)) => Decimal::clone(d).to_string(),
        Value::Uuid(Some(u)) => Uuid::clone(u).to_string(),
        other => match (as_i64(other), as_f64(other)) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => f.to_string(),
            _ => format!("{other:?}"),
        },
    }
}

macro_rules! impl_integer_column_value {
    ($type:ty, $variant:ident, $kind:ident) => {
        impl ColumnValue for $type {
            const KIND: ValueKind = ValueKind::$kind;

            fn to_value(&self) -> Value {
                Value::$variant(Some(*self))
            }

            fn from_value(value: &Value) -> Result<Self, OrmError> {
                as_i64(value)
                    .and_then(|v| <$type>::try_from(v).ok())
                    .ok_or_else(|| mismatch(Self::KIND, value))
            }
        }
    };
}

impl_integer_column_value!(i16, SmallInt, Int16);
impl_integer_column_value!(i32, Int, Int32);
impl_integer_column_value!(i64, BigInt, Int64);

impl ColumnValue for f64 {
    const KIND: ValueKind = ValueKind::Double;

    fn to_value(&self) -> Value {
        Value::Double(Some(*self))
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        as_f64(value).ok_or_else(|| mismatch(Self::KIND, value))
    }
}

impl ColumnValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn to_value(&self) -> Value {
        Value::Bool(Some(*self))
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Bool(Some(b)) => Ok(*b),
            other => match as_i64(other) {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(mismatch(Self::KIND, other)),
            },
        }
    }
}

impl ColumnValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn to_value(&self) -> Value {
        Value::String(Some(self.clone()))
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::String(Some(s)) => Ok(String::clone(s)),
            other => Err(mismatch(Self::KIND, other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    const KIND: ValueKind = ValueKind::DateTime;

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::ChronoDateTime(Some(dt)) => Ok(NaiveDateTime::clone(dt)),
            other => Err(mismatch(Self::KIND, other)),
        }
    }
}

impl ColumnValue for Decimal {
    const KIND: ValueKind = ValueKind::Decimal;

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        as_decimal(value).ok_or_else(|| mismatch(Self::KIND, value))
    }
}

impl ColumnValue for Uuid {
    const KIND: ValueKind = ValueKind::Guid;

    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Uuid(Some(u)) => Ok(Uuid::clone(u)),
            Value::String(Some(s)) => {
                Uuid::parse_str(s).map_err(|e| OrmError::ParseError(e.to_string()))
            }
            other => Err(mismatch(Self::KIND, other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => T::null_value(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, OrmError> {
        if is_null(value) {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn null_value() -> Value {
        T::null_value()
    }
}

/// Implement [`ColumnValue`] for a fieldless `Copy` enum through its `i32`
/// discriminant.
///
/// ```
/// use pingorm::column_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Status { #[default] Active = 1, Banned = 2 }
///
/// column_enum!(Status { Active, Banned });
/// ```
#[macro_export]
macro_rules! column_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::value::ColumnValue for $ty {
            const KIND: $crate::value::ValueKind = $crate::value::ValueKind::Int32;

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Int(Some(*self as i32))
            }

            fn from_value(value: &$crate::Value) -> Result<Self, $crate::OrmError> {
                let raw = <i32 as $crate::value::ColumnValue>::from_value(value)?;
                $(
                    if raw == $ty::$variant as i32 {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::OrmError::ParseError(format!(
                    "{} is not a valid {}",
                    raw,
                    stringify!($ty)
                )))
            }
        }

        impl $crate::query::ArgValue for $ty {
            fn into_bound(self) -> $crate::value::Bound {
                $crate::value::Bound::One(<$ty as $crate::value::ColumnValue>::to_value(&self))
            }
        }
    };
}

/// A captured value: one scalar or a list that expands into an IN-list
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    One(Value),
    Many(Vec<Value>),
}

impl Bound {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Bound::One(v) => Some(ValueKind::of(v)),
            Bound::Many(values) => values.first().map(ValueKind::of),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Bound::Many(_))
    }
}

/// One materialized row: column names and values in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    /// Value of a column by name (case-insensitive, like SQL identifiers)
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Read a typed column value
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ParseError` if the column is missing or has an
    /// incompatible value.
    pub fn read<T: ColumnValue>(&self, column: &str) -> Result<T, OrmError> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::ParseError(format!("column '{column}' not in row")))?;
        T::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Plan {
        Free = 0,
        Paid = 5,
    }

    crate::column_enum!(Plan { Free, Paid });

    #[test]
    fn test_kind_of_value() {
        assert_eq!(ValueKind::of(&Value::Int(Some(1))), ValueKind::Int32);
        assert_eq!(ValueKind::of(&Value::BigInt(None)), ValueKind::Int64);
        assert_eq!(ValueKind::of(&Value::Bytes(Some(vec![1]))), ValueKind::String);
        assert_eq!(ValueKind::of(&Decimal::new(15, 1).to_value()), ValueKind::Decimal);
    }

    #[test]
    fn test_option_unwraps_to_inner_kind() {
        assert_eq!(<Option<i64> as ColumnValue>::KIND, ValueKind::Int64);
        assert_eq!(None::<i64>.to_value(), Value::BigInt(None));
        assert_eq!(Option::<i32>::from_value(&Value::Int(None)).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(&Value::Int(Some(3))).unwrap(), Some(3));
    }

    #[test]
    fn test_integer_widening_and_overflow() {
        assert_eq!(i64::from_value(&Value::Int(Some(7))).unwrap(), 7);
        assert!(i16::from_value(&Value::BigInt(Some(100_000))).is_err());
        assert!(i32::from_value(&Value::Int(None)).is_err());
    }

    #[test]
    fn test_enum_maps_through_integer() {
        assert_eq!(<Plan as ColumnValue>::KIND, ValueKind::Int32);
        assert_eq!(Plan::Paid.to_value(), Value::Int(Some(5)));
        assert_eq!(Plan::from_value(&Value::Int(Some(0))).unwrap(), Plan::Free);
        assert!(Plan::from_value(&Value::Int(Some(9))).is_err());
    }

    #[test]
    fn test_cast_value() {
        assert_eq!(
            cast_value(&Value::Int(Some(4)), ValueKind::Int64).unwrap(),
            Value::BigInt(Some(4))
        );
        assert_eq!(
            cast_value(&Value::BigInt(Some(12)), ValueKind::Double).unwrap(),
            Value::Double(Some(12.0))
        );
        assert!(cast_value(&Value::BigInt(Some(i64::MAX)), ValueKind::Int32).is_err());
        assert_eq!(
            cast_value(&Value::Int(None), ValueKind::Int64).unwrap(),
            Value::BigInt(None)
        );
    }

    #[test]
    fn test_cast_value_widens_same_kind_variants() {
        assert_eq!(
            cast_value(&Value::Float(Some(1.5)), ValueKind::Double).unwrap(),
            Value::Double(Some(1.5))
        );
        assert_eq!(
            cast_value(&Value::TinyInt(Some(3)), ValueKind::Int16).unwrap(),
            Value::SmallInt(Some(3))
        );
        assert_eq!(
            cast_value(&Value::Unsigned(Some(9)), ValueKind::Int64).unwrap(),
            Value::BigInt(Some(9))
        );
        assert_eq!(
            cast_value(&Value::Double(Some(2.25)), ValueKind::Double).unwrap(),
            Value::Double(Some(2.25))
        );
    }

    #[test]
    fn test_record_lookup_is_case_insensitive() {
        let mut record = Record::new();
        record.push("first_name", Value::String(Some("Matt".to_string())));
        record.push("num_logins", Value::Int(Some(4)));
        assert_eq!(record.read::<String>("FIRST_NAME").unwrap(), "Matt");
        assert_eq!(record.read::<i32>("num_logins").unwrap(), 4);
        assert!(record.read::<i32>("missing").is_err());
        assert_eq!(record.len(), 2);
    }
}
