//! Value conversion utilities for SeaQuery to may_postgres.
//!
//! This module provides functions to convert SeaQuery `Value` enums into
//! `ToSql` trait objects that can be used with `may_postgres` queries.
//!
//! The conversion follows a two-pass pattern:
//! 1. First pass: collect all values into typed vectors
//! 2. Second pass: create references to the stored values
//!
//! This pattern ensures that references remain valid within the closure scope.

use crate::executor::LifeError;
use may_postgres::types::ToSql;
use sea_query::Value;
use uuid::Uuid;

/// Convert bound statement values to may_postgres ToSql parameters and run `f` with them.
///
/// # Errors
///
/// Returns `LifeError::Other` if an unsupported value type is encountered, or
/// whatever error `f` returns.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, LifeError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, LifeError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut bytes: Vec<Vec<u8>> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();
    let mut floats: Vec<f32> = Vec::new();
    let mut doubles: Vec<f64> = Vec::new();
    let mut uuids: Vec<Uuid> = Vec::new();
    let mut jsons: Vec<serde_json::Value> = Vec::new();

    // First pass: own every value in a typed vector
    for value in values {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::TinyInt(Some(i)) => ints.push(i32::from(*i)),
            Value::SmallInt(Some(i)) => ints.push(i32::from(*i)),
            Value::Int(Some(i)) => ints.push(*i),
            Value::TinyUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::SmallUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::Unsigned(Some(u)) => big_ints.push(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => {
                let v = i64::try_from(*u).map_err(|_| {
                    LifeError::Other(format!(
                        "BigUnsigned value {} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        u,
                        i64::MAX
                    ))
                })?;
                big_ints.push(v);
            }
            Value::Float(Some(f)) => floats.push(*f),
            Value::Double(Some(d)) => doubles.push(*d),
            Value::String(Some(s)) => strings.push(String::clone(s)),
            Value::Char(Some(c)) => strings.push(c.to_string()),
            Value::Bytes(Some(b)) => bytes.push(Vec::<u8>::clone(b)),
            Value::Uuid(Some(u)) => uuids.push(Uuid::clone(u)),
            Value::Json(Some(j)) => jsons.push(serde_json::Value::clone(j)),
            v if is_null(v) => nulls.push(None),
            _ => {
                return Err(LifeError::Other(format!(
                    "Unsupported value type in query: {:?}",
                    value
                )));
            }
        }
    }

    // Second pass: borrow in original order
    let (mut bool_idx, mut int_idx, mut big_int_idx, mut string_idx) = (0, 0, 0, 0);
    let (mut byte_idx, mut null_idx, mut float_idx, mut double_idx) = (0, 0, 0, 0);
    let (mut uuid_idx, mut json_idx) = (0, 0);

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx] as &dyn ToSql);
                bool_idx += 1;
            }
            Value::TinyInt(Some(_))
            | Value::SmallInt(Some(_))
            | Value::Int(Some(_))
            | Value::TinyUnsigned(Some(_))
            | Value::SmallUnsigned(Some(_)) => {
                params.push(&ints[int_idx] as &dyn ToSql);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) | Value::Unsigned(Some(_)) | Value::BigUnsigned(Some(_)) => {
                params.push(&big_ints[big_int_idx] as &dyn ToSql);
                big_int_idx += 1;
            }
            Value::Float(Some(_)) => {
                params.push(&floats[float_idx] as &dyn ToSql);
                float_idx += 1;
            }
            Value::Double(Some(_)) => {
                params.push(&doubles[double_idx] as &dyn ToSql);
                double_idx += 1;
            }
            Value::String(Some(_)) | Value::Char(Some(_)) => {
                params.push(&strings[string_idx] as &dyn ToSql);
                string_idx += 1;
            }
            Value::Bytes(Some(_)) => {
                params.push(&bytes[byte_idx] as &dyn ToSql);
                byte_idx += 1;
            }
            Value::Uuid(Some(_)) => {
                params.push(&uuids[uuid_idx] as &dyn ToSql);
                uuid_idx += 1;
            }
            Value::Json(Some(_)) => {
                params.push(&jsons[json_idx] as &dyn ToSql);
                json_idx += 1;
            }
            _ => {
                params.push(&nulls[null_idx] as &dyn ToSql);
                null_idx += 1;
            }
        }
    }

    f(&params)
}

/// Whether a value is SQL `NULL`, whatever its declared type.
pub(crate) fn is_null(value: &Value) -> bool {
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
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::Uuid(None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_count_matches_values() {
        let values = vec![
            Value::from(1i32),
            Value::from("Lee"),
            Value::Int(None),
            Value::from(true),
            Value::from(2i64),
        ];
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_big_unsigned_overflow_is_rejected() {
        let values = vec![Value::BigUnsigned(Some(u64::MAX))];
        let err = with_converted_params(&values, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("exceeds i64::MAX"));
    }

    #[test]
    fn test_is_null_detects_typed_nulls() {
        assert!(is_null(&Value::String(None)));
        assert!(is_null(&Value::BigInt(None)));
        assert!(!is_null(&Value::from("x")));
        assert!(!is_null(&Value::from(0i32)));
    }

    #[test]
    fn test_closure_error_passes_through() {
        let err = with_converted_params(&[], |_| -> Result<(), LifeError> {
            Err(LifeError::QueryError("boom".into()))
        })
        .unwrap_err();
        assert!(matches!(err, LifeError::QueryError(m) if m == "boom"));
    }
}
