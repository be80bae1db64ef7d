//! The static type checker.
//!
//! Walks the AST in post-order, flowing the selected topic's schema through
//! the pipeline stages and annotating each expression with a schema. Errors
//! are collected, not thrown, so one parse reports every problem found.

use super::ast::{BinaryOp, Expr, Query, Stage, StageKind, Subscript};
use super::syntax_error::SyntaxError;
use crate::plan::builtin_lookup;
use crate::schema::{ScalarType, Schema};
use std::collections::HashMap;

/// Checks a query against the schema of its selected topic.
#[derive(Debug, Default)]
pub struct TypeChecker {
    errors: Vec<SyntaxError>,
}

impl TypeChecker {
    /// Flows `input` through the pipeline, returning the schema of the
    /// final stage's output, or every collected problem.
    pub fn check(query: &Query, input: Schema) -> Result<Schema, Vec<SyntaxError>> {
        let mut checker = Self::default();
        let mut flow = input;
        for stage in &query.pipeline {
            flow = checker.check_stage(stage, flow);
        }
        if checker.errors.is_empty() {
            Ok(flow)
        } else {
            Err(checker.errors)
        }
    }

    fn error(&mut self, location: crate::query::Location, message: impl Into<String>) -> Schema {
        self.errors.push(SyntaxError::new(location, message));
        Schema::Unknown
    }

    fn check_stage(&mut self, stage: &Stage, input: Schema) -> Schema {
        let mut symbols: HashMap<String, Schema> = HashMap::new();
        match stage.kind {
            StageKind::Reduce => {
                // reduce consumes two entries of the flowing schema at a time
                if stage.args.len() != 2 {
                    self.error(stage.location, "reduce requires exactly two arguments");
                }
                for arg in &stage.args {
                    symbols.insert(arg.clone(), input.clone());
                }
            }
            StageKind::Filter | StageKind::Map => match (&input, stage.args.len()) {
                (_, 1) => {
                    symbols.insert(stage.args[0].clone(), input.clone());
                }
                (Schema::Array { length, elem }, n) if n == *length => {
                    for arg in &stage.args {
                        symbols.insert(arg.clone(), Schema::Type(*elem));
                    }
                }
                (_, n) => {
                    self.error(
                        stage.location,
                        format!("stage declares {n} arguments, which does not fit {input}"),
                    );
                    for arg in &stage.args {
                        symbols.insert(arg.clone(), Schema::Unknown);
                    }
                }
            },
        }
        let body = self.check_expr(&stage.body, &symbols);
        match stage.kind {
            // filter passes its input through unchanged
            StageKind::Filter => input,
            StageKind::Map | StageKind::Reduce => body,
        }
    }

    fn check_expr(&mut self, expr: &Expr, symbols: &HashMap<String, Schema>) -> Schema {
        match expr {
            Expr::Integer { .. } => Schema::Type(ScalarType::Int64),
            Expr::Float { .. } => Schema::Type(ScalarType::Float64),
            Expr::Str { .. } => Schema::Type(ScalarType::String),
            Expr::Ident { name, location } => match symbols.get(name) {
                Some(schema) => schema.clone(),
                None => self.error(*location, format!("unknown symbol {name:?}")),
            },
            Expr::Unary {
                operand, location, ..
            } => {
                let inner = self.check_expr(operand, symbols);
                if matches!(inner, Schema::Unknown) {
                    return Schema::Unknown;
                }
                if inner.is_numeric() {
                    inner
                } else {
                    self.error(*location, format!("unary sign requires a number, got {inner}"))
                }
            }
            Expr::Binary {
                op,
                lhs,
                rhs,
                location,
            } => self.check_binary(*op, lhs, rhs, *location, symbols),
            Expr::SubValue {
                target,
                subscript,
                location,
            } => self.check_subvalue(target, subscript, *location, symbols),
            Expr::Builtin {
                name,
                args,
                location,
            } => {
                // a single argument passes its own type; several form a tuple
                let input = if args.len() == 1 {
                    self.check_expr(&args[0], symbols)
                } else {
                    self.tuple_type(args, *location, symbols)
                };
                let Some(builtin) = builtin_lookup(name) else {
                    return self.error(*location, format!("unknown builtin {name:?}"));
                };
                match (builtin.validate)(&input) {
                    Ok(output) => output,
                    Err(message) => self.error(*location, message),
                }
            }
            Expr::Tuple {
                elements, location, ..
            } => self.tuple_type(elements, *location, symbols),
            Expr::Composite {
                keys,
                values,
                location,
            } => {
                let mut pairs: Vec<(String, Schema)> = Vec::with_capacity(keys.len());
                for (key, value) in keys.iter().zip(values) {
                    if pairs.iter().any(|(k, _)| k == key) {
                        self.error(*location, format!("duplicate composite key {key:?}"));
                        continue;
                    }
                    let schema = self.check_expr(value, symbols);
                    match schema {
                        Schema::Type(_) | Schema::Array { .. } | Schema::Unknown => {
                            pairs.push((key.clone(), schema));
                        }
                        other => {
                            self.error(
                                value.location(),
                                format!("composite values must be types or arrays, got {other}"),
                            );
                        }
                    }
                }
                pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
                let (keys, values) = pairs.into_iter().unzip();
                Schema::Composite { keys, values }
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        location: crate::query::Location,
        symbols: &HashMap<String, Schema>,
    ) -> Schema {
        let left = self.check_expr(lhs, symbols);
        let right = self.check_expr(rhs, symbols);
        if matches!(left, Schema::Unknown) || matches!(right, Schema::Unknown) {
            // already reported below this node
            return Schema::Unknown;
        }
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                // equality is restricted to scalar operands
                let comparable = match (&left, &right) {
                    (Schema::Type(a), Schema::Type(b)) => {
                        (a.is_numeric() && b.is_numeric()) || a == b
                    }
                    _ => false,
                };
                if comparable {
                    Schema::Type(ScalarType::Boolean)
                } else {
                    self.error(location, format!("cannot compare {left} with {right}"))
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if left.is_numeric() && right.is_numeric() {
                    Schema::Type(ScalarType::Boolean)
                } else {
                    self.error(location, format!("cannot order {left} against {right}"))
                }
            }
            BinaryOp::Div => {
                if left.is_numeric() && right.is_numeric() {
                    Schema::Type(ScalarType::Float64)
                } else {
                    self.error(location, format!("cannot divide {left} by {right}"))
                }
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (&left, &right) {
                (Schema::Type(a), Schema::Type(b)) if a.is_numeric() && b.is_numeric() => {
                    Schema::Type(a.widen(*b))
                }
                _ => self.error(
                    location,
                    format!("arithmetic requires numbers, got {left} and {right}"),
                ),
            },
        }
    }

    fn check_subvalue(
        &mut self,
        target: &str,
        subscript: &Subscript,
        location: crate::query::Location,
        symbols: &HashMap<String, Schema>,
    ) -> Schema {
        let Some(schema) = symbols.get(target) else {
            return self.error(location, format!("unknown symbol {target:?}"));
        };
        match (schema, subscript) {
            (Schema::Array { length, elem }, Subscript::Index(idx)) => {
                if *idx < 0 || *idx >= *length as i64 {
                    self.error(
                        location,
                        format!("index {idx} is out of bounds for {schema}"),
                    )
                } else {
                    Schema::Type(*elem)
                }
            }
            (Schema::Composite { keys, values }, Subscript::Key(key)) => {
                match keys.iter().position(|k| k == key) {
                    Some(idx) => values[idx].clone(),
                    None => self.error(location, format!("unknown key {key:?} in {schema}")),
                }
            }
            (Schema::Unknown, _) => Schema::Unknown,
            (schema, Subscript::Index(_)) => {
                self.error(location, format!("{schema} cannot be indexed by position"))
            }
            (schema, Subscript::Key(_)) => {
                self.error(location, format!("{schema} cannot be indexed by key"))
            }
        }
    }

    // Tuple elements must be mutually numeric (widened) or mutually
    // non-numeric of one type; the tuple is a fixed-length array of the
    // widened element type.
    fn tuple_type(
        &mut self,
        elements: &[Expr],
        location: crate::query::Location,
        symbols: &HashMap<String, Schema>,
    ) -> Schema {
        let types: Vec<Schema> = elements
            .iter()
            .map(|e| self.check_expr(e, symbols))
            .collect();
        if types.iter().any(|t| matches!(t, Schema::Unknown)) {
            return Schema::Unknown;
        }
        let mut scalars = Vec::with_capacity(types.len());
        for (expr, t) in elements.iter().zip(&types) {
            match t {
                Schema::Type(s) => scalars.push(*s),
                other => {
                    return self.error(
                        expr.location(),
                        format!("tuple elements must be scalars, got {other}"),
                    );
                }
            }
        }
        if scalars.is_empty() {
            return self.error(location, "empty tuple");
        }
        let elem = if scalars.iter().all(|s| s.is_numeric()) {
            scalars.iter().copied().reduce(ScalarType::widen).expect("nonempty")
        } else if scalars.iter().all(|s| *s == scalars[0]) {
            scalars[0]
        } else {
            return self.error(
                location,
                "tuple elements must be mutually numeric or mutually non-numeric",
            );
        };
        Schema::Array {
            length: scalars.len(),
            elem,
        }
    }
}
