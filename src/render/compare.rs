use crate::{
    compile::expr::token::Operator,
    log::{Error, INCOMPATIBLE_TYPES},
};
use serde_json::Value;
use std::cmp::Ordering;

/// Return true if the given [`Value`] is truthy.
///
/// Null, false, empty strings, zero and empty collections are false.
/// Everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(bo) => *bo,
        Value::Number(nu) => nu.as_f64().map_or(true, |nu| nu != 0.0),
        Value::String(st) => !st.is_empty(),
        Value::Array(ar) => !ar.is_empty(),
        Value::Object(ob) => !ob.is_empty(),
        Value::Null => false,
    }
}

/// Return true if the two [`Value`] instances are equal.
///
/// Numbers compare by value, so `1 == 1.0`.
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => match (left.as_i64(), right.as_i64()) {
            (Some(left), Some(right)) => left == right,
            _ => left.as_f64() == right.as_f64(),
        },
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| equals(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, l)| right.get(key).is_some_and(|r| equals(l, r)))
        }
        (left, right) => left == right,
    }
}

/// Order the two [`Value`] instances.
///
/// Null sorts before everything else.
///
/// # Errors
///
/// Returns an [`Error`] if the two types cannot be ordered.
pub fn compare(left: &Value, right: &Value) -> Result<Ordering, Error> {
    let ordering = match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l
                .as_f64()
                .zip(r.as_f64())
                .and_then(|(l, r)| l.partial_cmp(&r)),
        },
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        _ => None,
    };

    ordering.ok_or_else(|| {
        Error::build(INCOMPATIBLE_TYPES).with_help(format!(
            "types `{}` and `{}` cannot be compared",
            left, right
        ))
    })
}

/// Compare the two [`Value`] instances with the given [`Operator`].
///
/// # Errors
///
/// Returns an [`Error`] if the two types cannot be compared, or the `Operator`
/// is not a comparison.
pub fn compare_values(left: &Value, operator: Operator, right: &Value) -> Result<bool, Error> {
    let result = match operator {
        Operator::Equal => equals(left, right),
        Operator::NotEqual => !equals(left, right),
        Operator::Greater => compare(left, right)?.is_gt(),
        Operator::Lesser => compare(left, right)?.is_lt(),
        Operator::GreaterOrEqual => compare(left, right)?.is_ge(),
        Operator::LesserOrEqual => compare(left, right)?.is_le(),
        unsupported => {
            return Err(Error::build(INCOMPATIBLE_TYPES)
                .with_help(format!("operator `{unsupported}` is not a comparison")))
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        let true_values = vec![
            json!("lorem"),
            json!(12),
            json!(114.4),
            json!(-12),
            json!(true),
            json!(vec!["lorem", "ipsum"]),
            json!({"lorem": "ipsum"}),
        ];
        let false_values = vec![
            json!(""),
            json!(0),
            json!(0.0),
            json!(null),
            json!(false),
            json!(vec![""; 0]),
            json!({}),
        ];

        for value in true_values {
            assert!(is_truthy(&value), "{value} should be truthy");
        }
        for value in false_values {
            assert!(!is_truthy(&value), "{value} should be falsy");
        }
    }

    #[test]
    fn test_numbers_compare_by_value() -> Result<(), Error> {
        assert!(compare_values(&json!(1), Operator::Equal, &json!(1.0))?);
        assert!(compare_values(&json!(2), Operator::Greater, &json!(1.5))?);
        assert!(compare_values(&json!("b"), Operator::GreaterOrEqual, &json!("a"))?);
        assert!(compare_values(&json!(null), Operator::Lesser, &json!(0))?);
        assert!(compare_values(&json!([1, 2]), Operator::Equal, &json!([1.0, 2]))?);
        assert!(compare_values(&json!("1"), Operator::NotEqual, &json!(1))?);

        Ok(())
    }

    #[test]
    fn test_incompatible_types() {
        let result = compare_values(&json!("hello"), Operator::Greater, &json!(true));

        assert!(result.is_err_and(|e| e.reason() == INCOMPATIBLE_TYPES));
        assert!(compare_values(&json!(1), Operator::Add, &json!(1)).is_err());
    }
}
