use super::value::Value;
use crate::query::BinaryOp;
use crate::schema::Schema;
use crate::{FossilError, FossilResult};

/// A builtin function: a type-checking rule and an evaluator.
///
/// The registry is closed; the type checker resolves names against it and
/// each entry validates its input schema into an output schema.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    /// Maps the input schema to the output schema, or a message naming the
    /// mismatch.
    pub validate: fn(&Schema) -> Result<Schema, String>,
    /// Runs the builtin over already-evaluated arguments.
    pub eval: fn(&[Value]) -> FossilResult<Value>,
}

static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "max",
        validate: validate_numeric_fold,
        eval: eval_max,
    },
    Builtin {
        name: "min",
        validate: validate_numeric_fold,
        eval: eval_min,
    },
];

/// Resolves a builtin by name.
pub fn builtin_lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

// max/min expect a tuple of numerics and return the same numeric kind
fn validate_numeric_fold(input: &Schema) -> Result<Schema, String> {
    match input {
        Schema::Array { elem, .. } if elem.is_numeric() => Ok(Schema::Type(*elem)),
        Schema::Type(t) if t.is_numeric() => Ok(Schema::Type(*t)),
        other => Err(format!("expected a tuple of numerics, got {other}")),
    }
}

fn eval_max(values: &[Value]) -> FossilResult<Value> {
    fold_extreme(values, BinaryOp::Gt)
}

fn eval_min(values: &[Value]) -> FossilResult<Value> {
    fold_extreme(values, BinaryOp::Lt)
}

fn fold_extreme(values: &[Value], keep_when: BinaryOp) -> FossilResult<Value> {
    let mut best = match values.first() {
        Some(value) if value.is_numeric() => value.clone(),
        Some(other) => {
            return Err(FossilError::Query(format!(
                "expected a tuple of numerics, got {other:?}"
            )));
        }
        None => return Err(FossilError::Query("empty argument list".to_string())),
    };
    for value in &values[1..] {
        if !value.is_numeric() {
            return Err(FossilError::Query(format!(
                "expected a tuple of numerics, got {value:?}"
            )));
        }
        if Value::binary(keep_when, value, &best)?.truthy() {
            best = value.clone();
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_closed() {
        assert!(builtin_lookup("max").is_some());
        assert!(builtin_lookup("min").is_some());
        assert!(builtin_lookup("avg").is_none());
    }

    #[test]
    fn extremes_keep_the_numeric_kind() {
        let max = eval_max(&[Value::Float(1.5), Value::Float(9.25)]).unwrap();
        assert_eq!(max, Value::Float(9.25));
        let min = eval_min(&[Value::Int(4), Value::Int(-2), Value::Int(9)]).unwrap();
        assert_eq!(min, Value::Int(-2));
    }

    #[test]
    fn non_numerics_are_rejected() {
        assert!(eval_max(&[Value::String("x".to_string())]).is_err());
    }
}
