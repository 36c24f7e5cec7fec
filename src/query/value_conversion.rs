//! Value conversion between `sea_query::Value` and `may_postgres`.
//!
//! Parameters are converted in two passes: every value is first moved into
//! owned storage, then the closure receives references into that storage.
//! Rows come back as [`Record`]s typed by the column's Postgres type.

use crate::error::OrmError;
use crate::value::Record;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use may_postgres::types::{ToSql, Type};
use may_postgres::Row;
use rust_decimal::Decimal;
use sea_query::Value;
use uuid::Uuid;

fn to_owned_sql(value: &Value) -> Result<Box<dyn ToSql>, OrmError> {
    let boxed: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(Some(u)) => {
            let v = i64::try_from(*u).map_err(|_| {
                OrmError::Other(format!(
                    "BigUnsigned value {u} exceeds i64::MAX and cannot be bound"
                ))
            })?;
            Box::new(Some(v))
        }
        Value::BigUnsigned(None) => Box::new(None::<i64>),
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| String::clone(s))),
        Value::Bytes(v) => Box::new(v.as_ref().map(|b| Vec::<u8>::clone(b))),
        Value::Json(v) => Box::new(v.as_ref().map(|j| serde_json::Value::clone(j))),
        Value::ChronoDateTime(v) => Box::new(v.as_ref().map(|dt| NaiveDateTime::clone(dt))),
        Value::Decimal(v) => Box::new(v.as_ref().map(|d| Decimal::clone(d))),
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| Uuid::clone(u))),
        other => {
            return Err(OrmError::Other(format!(
                "Unsupported value type in query: {other:?}"
            )))
        }
    };
    Ok(boxed)
}

/// Convert values to `ToSql` parameters and run `f` with them.
///
/// NULLs keep their type (`Value::Int(None)` binds as a NULL `int4`), so the
/// server accepts them for typed columns.
///
/// # Errors
///
/// Returns `OrmError::Other` for value variants with no Postgres mapping, or
/// whatever `f` returns.
pub fn with_converted_params<F, R>(values: &[&Value], f: F) -> Result<R, OrmError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, OrmError>,
{
    let owned = values
        .iter()
        .map(|value| to_owned_sql(value))
        .collect::<Result<Vec<_>, _>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|param| &**param).collect();
    f(&params)
}

fn read<'a, T>(row: &'a Row, index: usize, wrap: impl FnOnce(Option<T>) -> Value) -> Result<Value, OrmError>
where
    T: may_postgres::types::FromSql<'a>,
{
    Ok(wrap(row.try_get::<usize, Option<T>>(index)?))
}

fn read_column(row: &Row, index: usize, ty: &Type) -> Result<Value, OrmError> {
    match *ty {
        Type::BOOL => read::<bool>(row, index, Value::Bool),
        Type::INT2 => read::<i16>(row, index, Value::SmallInt),
        Type::INT4 => read::<i32>(row, index, Value::Int),
        Type::INT8 => read::<i64>(row, index, Value::BigInt),
        Type::FLOAT4 => read::<f32>(row, index, Value::Float),
        Type::FLOAT8 => read::<f64>(row, index, Value::Double),
        Type::NUMERIC => read::<Decimal>(row, index, |v| {
            v.map_or(Value::Decimal(None), Value::from)
        }),
        Type::TIMESTAMP => read::<NaiveDateTime>(row, index, |v| {
            v.map_or(Value::ChronoDateTime(None), Value::from)
        }),
        Type::TIMESTAMPTZ => read::<DateTime<Utc>>(row, index, |v| {
            v.map_or(Value::ChronoDateTime(None), |dt| Value::from(dt.naive_utc()))
        }),
        Type::DATE => read::<NaiveDate>(row, index, |v| {
            v.and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(Value::ChronoDateTime(None), Value::from)
        }),
        Type::UUID => read::<Uuid>(row, index, |v| v.map_or(Value::Uuid(None), Value::from)),
        Type::JSON | Type::JSONB => read::<serde_json::Value>(row, index, |v| {
            v.map_or(Value::Json(None), Value::from)
        }),
        Type::BYTEA => read::<Vec<u8>>(row, index, |v| v.map_or(Value::Bytes(None), Value::from)),
        _ => read::<String>(row, index, Value::String),
    }
}

/// Materialize a row as a [`Record`]
///
/// # Errors
///
/// Returns `OrmError::PostgresError` if a column cannot be decoded.
pub fn row_to_record(row: &Row) -> Result<Record, OrmError> {
    let columns = row.columns();
    let mut record = Record::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = read_column(row, index, column.type_())?;
        record.push(column.name(), value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_typed_nulls_and_values() {
        let values = [
            Value::Int(Some(4)),
            Value::String(None),
            Value::BigInt(Some(7)),
            Value::Uuid(None),
        ];
        let refs: Vec<&Value> = values.iter().collect();
        let count = with_converted_params(&refs, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_big_unsigned_overflow_rejected() {
        let value = Value::BigUnsigned(Some(u64::MAX));
        let err = with_converted_params(&[&value], |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("exceeds i64::MAX"));
    }

    #[test]
    fn test_empty_params() {
        let called = with_converted_params(&[], |params| Ok(params.is_empty())).unwrap();
        assert!(called);
    }
}
