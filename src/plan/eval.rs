use super::builtins::builtin_lookup;
use super::value::Value;
use crate::query::{Expr, Subscript, UnaryOp};
use crate::{FossilError, FossilResult};
use std::collections::{BTreeMap, HashMap};

/// The small value-kind interpreter driving pipeline stage bodies.
///
/// Symbols are the stage's bound arguments. Evaluation never panics; a bad
/// datum produces an error the stage turns into an error entry.
#[derive(Debug)]
pub(crate) struct Evaluator {
    symbols: HashMap<String, Value>,
}

impl Evaluator {
    pub fn new(symbols: HashMap<String, Value>) -> Self {
        Self { symbols }
    }

    /// Evaluates a stage body into its result slice: a syntactic tuple
    /// yields one value per element, any other body yields one value.
    pub fn eval_results(&self, body: &Expr) -> FossilResult<Vec<Value>> {
        match body {
            Expr::Tuple { elements, .. } => elements.iter().map(|e| self.eval(e)).collect(),
            other => Ok(vec![self.eval(other)?]),
        }
    }

    pub fn eval(&self, expr: &Expr) -> FossilResult<Value> {
        match expr {
            Expr::Integer { value, .. } => Ok(Value::Int(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str { value, .. } => Ok(Value::String(value.clone())),
            Expr::Ident { name, .. } => self
                .symbols
                .get(name)
                .cloned()
                .ok_or_else(|| FossilError::Query(format!("unknown symbol {name:?}"))),
            Expr::Unary { op, operand, .. } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
                    (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(-i)),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (_, other) => Err(FossilError::Query(format!(
                        "unary sign requires a number, got {other:?}"
                    ))),
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                Value::binary(*op, &left, &right)
            }
            Expr::SubValue {
                target, subscript, ..
            } => {
                let value = self.symbols.get(target).ok_or_else(|| {
                    FossilError::Query(format!("unknown symbol {target:?}"))
                })?;
                self.subscript(value, subscript)
            }
            Expr::Builtin { name, args, .. } => {
                let builtin = builtin_lookup(name)
                    .ok_or_else(|| FossilError::Query(format!("unknown builtin {name:?}")))?;
                let mut values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<FossilResult<Vec<Value>>>()?;
                // a single tuple argument spreads into the argument slice
                if values.len() == 1 {
                    if let Value::Tuple(inner) = &values[0] {
                        values = inner.clone();
                    }
                }
                (builtin.eval)(&values)
            }
            Expr::Tuple { elements, .. } => Ok(Value::Tuple(
                elements
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<FossilResult<Vec<Value>>>()?,
            )),
            Expr::Composite { keys, values, .. } => {
                let mut fields = BTreeMap::new();
                for (key, value) in keys.iter().zip(values) {
                    fields.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Composite(fields))
            }
        }
    }

    // sub-value dispatches by kind: string subscript looks up a composite,
    // integer subscript indexes a tuple
    fn subscript(&self, value: &Value, subscript: &Subscript) -> FossilResult<Value> {
        match (value, subscript) {
            (Value::Composite(fields), Subscript::Key(key)) => fields
                .get(key)
                .cloned()
                .ok_or_else(|| FossilError::Query(format!("unknown key {key:?}"))),
            (Value::Tuple(elements), Subscript::Index(idx)) => {
                let i = usize::try_from(*idx)
                    .map_err(|_| FossilError::Query(format!("negative index {idx}")))?;
                elements.get(i).cloned().ok_or_else(|| {
                    FossilError::Query(format!(
                        "index {idx} out of bounds for a tuple of {}",
                        elements.len()
                    ))
                })
            }
            (Value::Composite(_), Subscript::Index(idx)) => Err(FossilError::Query(format!(
                "composites are indexed by key, not {idx}"
            ))),
            (Value::Tuple(_), Subscript::Key(key)) => Err(FossilError::Query(format!(
                "tuples are indexed by position, not {key:?}"
            ))),
            (other, _) => Err(FossilError::Query(format!(
                "{other:?} cannot be subscripted"
            ))),
        }
    }
}
