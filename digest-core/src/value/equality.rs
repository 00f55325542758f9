//! Equality Policy
//!
//! Decides whether a watched value changed between two evaluations.

use serde::{Deserialize, Serialize};

use super::Value;

/// How a watcher compares its previous and current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Scalars by value, containers by identity.
    #[default]
    Reference,

    /// Recursive structural comparison. The watcher keeps a deep copy of the
    /// last value.
    Value,
}

/// Returns `true` if `a` and `b` are the same under `comparison`.
///
/// NaN is equal to NaN in both modes, so a watch on a value that is always
/// NaN settles after its first evaluation.
pub fn are_equal(a: &Value, b: &Value, comparison: Comparison) -> bool {
    match comparison {
        Comparison::Reference => same_value(a, b),
        Comparison::Value => deep_equal(a, b),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::List(x), Value::List(y)) => x.ptr_eq(y),
        (Value::Map(x), Value::Map(y)) => x.ptr_eq(y),
        _ => false,
    }
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| deep_equal(l, r)))
        }
        _ => same_value(a, b),
    }
}

fn numbers_equal(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_equals_nan_in_both_modes() {
        let nan = Value::from(f64::NAN);
        assert!(are_equal(&nan, &Value::from(f64::NAN), Comparison::Reference));
        assert!(are_equal(&nan, &Value::from(f64::NAN), Comparison::Value));
        assert!(!are_equal(&nan, &Value::from(0.0), Comparison::Reference));
    }

    #[test]
    fn reference_mode_compares_container_identity() {
        let a = Value::list([1, 2, 3]);
        let b = Value::list([1, 2, 3]);

        assert!(are_equal(&a, &a.clone(), Comparison::Reference));
        assert!(!are_equal(&a, &b, Comparison::Reference));
    }

    #[test]
    fn value_mode_compares_structure() {
        let a = Value::map([("xs", Value::list([1, 2])), ("n", Value::from(f64::NAN))]);
        let b = Value::map([("n", Value::from(f64::NAN)), ("xs", Value::list([1, 2]))]);
        let c = Value::map([("xs", Value::list([1, 3])), ("n", Value::from(f64::NAN))]);

        assert!(are_equal(&a, &b, Comparison::Value));
        assert!(!are_equal(&a, &c, Comparison::Value));
    }

    #[test]
    fn undefined_and_null_differ() {
        assert!(!are_equal(&Value::Undefined, &Value::Null, Comparison::Reference));
        assert!(!are_equal(&Value::Undefined, &Value::Null, Comparison::Value));
    }

    #[test]
    fn strings_compare_by_content() {
        assert!(are_equal(
            &Value::from("abc"),
            &Value::from(String::from("abc")),
            Comparison::Reference
        ));
    }

    #[test]
    fn mismatched_variants_are_unequal() {
        assert!(!are_equal(&Value::from(1), &Value::from("1"), Comparison::Value));
        assert!(!are_equal(&Value::list([1]), &Value::map([("0", 1)]), Comparison::Value));
    }
}
