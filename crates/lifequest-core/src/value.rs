//! Loosely-typed JSON helpers.
//!
//! Shared state is co-owned by UI code that may store numbers as strings, so
//! numeric fields go through [`coerce_number`] before they are persisted or
//! merged. [`compare_values`] gives documents a total order for `order_by`
//! queries.

use std::cmp::Ordering;

use serde_json::{Number, Value};

/// Coerce a JSON value to a number.
///
/// - numbers pass through
/// - strings are trimmed and parsed (`""` is `0`)
/// - booleans map to `1` / `0`
/// - `null`, arrays, objects and unparsable strings yield `None`
///
/// Integral results are returned as integers so `"3"` persists as `3`, not
/// `3.0`.
pub fn coerce_number(value: &Value) -> Option<Number> {
    let float = match value {
        Value::Number(n) => return Some(n.clone()),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().ok()?
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    number_from_f64(float)
}

/// Build a JSON number, preferring an integer representation.
pub fn number_from_f64(value: f64) -> Option<Number> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Some(Number::from(value as i64));
    }
    Number::from_f64(value)
}

/// Whether a value counts as "present" when picking between an incoming and a
/// current field (`null` and `false`-y empties are absent).
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Total order over JSON values used for query ordering.
///
/// Type rank: null < bool < number < string < array < object; values of the
/// same type compare naturally (arrays element-wise, objects by length).
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| compare_values(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_string_becomes_integer() {
        assert_eq!(coerce_number(&json!("3")), Some(Number::from(3)));
        assert_eq!(Value::Number(coerce_number(&json!(" 42 ")).unwrap()), json!(42));
    }

    #[test]
    fn fractional_string_stays_float() {
        let n = coerce_number(&json!("2.5")).unwrap();
        assert_eq!(n.as_f64(), Some(2.5));
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(coerce_number(&json!(50)), Some(Number::from(50)));
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(coerce_number(&json!("")), Some(Number::from(0)));
    }

    #[test]
    fn bool_maps_to_one_or_zero() {
        assert_eq!(coerce_number(&json!(true)), Some(Number::from(1)));
        assert_eq!(coerce_number(&json!(false)), Some(Number::from(0)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(coerce_number(&json!("abc")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn non_finite_is_none() {
        assert!(number_from_f64(f64::INFINITY).is_none());
        assert!(number_from_f64(f64::NAN).is_none());
    }

    #[test]
    fn presence() {
        assert!(!is_present(None));
        assert!(!is_present(Some(&json!(null))));
        assert!(!is_present(Some(&json!(""))));
        assert!(is_present(Some(&json!("x"))));
        assert!(is_present(Some(&json!(0))));
    }

    #[test]
    fn numbers_order_numerically() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
    }

    #[test]
    fn strings_order_lexically() {
        assert_eq!(compare_values(&json!("alpha"), &json!("beta")), Ordering::Less);
    }

    #[test]
    fn null_sorts_first() {
        assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!(null)), Ordering::Greater);
    }
}
