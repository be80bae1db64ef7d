//! The abstract syntax tree produced by the query parser.
//!
//! Nodes are tagged variants; consumers pattern-match at each site rather
//! than going through a visitor.

use super::scanner::Location;
use crate::store::TimeRange;

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanosecond value of a timespan token such as `@hour`.
///
/// `@month` is 30 days and `@year` 365 days; the other spans are exact.
pub(crate) fn timespan_nanos(lexeme: &str) -> Option<i64> {
    let second = NANOS_PER_SECOND;
    Some(match lexeme {
        "@second" => second,
        "@minute" => 60 * second,
        "@hour" => 3_600 * second,
        "@day" => 86_400 * second,
        "@week" => 7 * 86_400 * second,
        "@month" => 30 * 86_400 * second,
        "@year" => 365 * 86_400 * second,
        _ => return None,
    })
}

/// A parsed query: quantifier, optional topic selector, optional time
/// predicate, and the data pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub quantifier: Quantifier,
    pub topic: Option<TopicSelector>,
    pub time: Option<TimePredicate>,
    pub pipeline: Vec<Stage>,
}

/// How much of the time dimension to keep.
#[derive(Clone, Debug, PartialEq)]
pub enum Quantifier {
    /// Every entry.
    All {
        location: Location,
    },
    /// The first entry at or after each scheduled instant, spaced by
    /// `interval` nanoseconds.
    Sample {
        interval: i64,
        location: Location,
    },
}

/// The `in <topic>` clause.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicSelector {
    pub topic: String,
    pub location: Location,
}

/// The `since`/`before`/`between` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum TimePredicate {
    Since { expr: TimeExpr, location: Location },
    Before { expr: TimeExpr, location: Location },
    Between {
        start: TimeExpr,
        end: TimeExpr,
        location: Location,
    },
}

impl TimePredicate {
    /// The concrete time range this predicate selects, with `now` supplied
    /// by the caller at execution time.
    pub fn to_range(&self, now: i64) -> TimeRange {
        match self {
            Self::Since { expr, .. } => TimeRange::since(expr.resolve(now), now),
            Self::Before { expr, .. } => TimeRange::before(expr.resolve(now)),
            Self::Between { start, end, .. } => {
                TimeRange::between(start.resolve(now), end.resolve(now))
            }
        }
    }
}

/// An anchor timestamp plus an optional signed offset, e.g.
/// `~now - 1 * @hour`. The offset is folded to nanoseconds at parse time.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeExpr {
    pub whence: Whence,
    pub offset: i64,
    pub location: Location,
}

impl TimeExpr {
    pub fn resolve(&self, now: i64) -> i64 {
        let anchor = match self.whence {
            Whence::Now => now,
            Whence::Absolute(nanos) => nanos,
        };
        anchor + self.offset
    }
}

/// The anchor of a time expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// `~now`
    Now,
    /// A parsed `~(<timestamp>)` literal.
    Absolute(i64),
}

/// A pipeline stage: `filter`/`map`/`reduce`, argument names, and a body
/// expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub kind: StageKind,
    pub args: Vec<String>,
    pub body: Expr,
    pub location: Location,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StageKind {
    Filter,
    Map,
    Reduce,
}

impl StageKind {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "filter" => Some(Self::Filter),
            "map" => Some(Self::Map),
            "reduce" => Some(Self::Reduce),
            _ => None,
        }
    }
}

/// An expression in a stage body.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Integer {
        value: i64,
        location: Location,
    },
    Float {
        value: f64,
        location: Location,
    },
    Str {
        value: String,
        location: Location,
    },
    Ident {
        name: String,
        location: Location,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        location: Location,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        location: Location,
    },
    /// `ident "[" subscript "]"`
    SubValue {
        target: String,
        subscript: Subscript,
        location: Location,
    },
    /// `ident "(" args ")"` resolved against the builtin registry.
    Builtin {
        name: String,
        args: Vec<Expr>,
        location: Location,
    },
    Tuple {
        elements: Vec<Expr>,
        location: Location,
    },
    Composite {
        keys: Vec<String>,
        values: Vec<Expr>,
        location: Location,
    },
}

impl Expr {
    pub fn location(&self) -> Location {
        match self {
            Self::Integer { location, .. }
            | Self::Float { location, .. }
            | Self::Str { location, .. }
            | Self::Ident { location, .. }
            | Self::Unary { location, .. }
            | Self::Binary { location, .. }
            | Self::SubValue { location, .. }
            | Self::Builtin { location, .. }
            | Self::Tuple { location, .. }
            | Self::Composite { location, .. } => *location,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Whether this operator yields a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

/// The index inside a `sub-value` bracket; an identifier subscript is an
/// unquoted string key.
#[derive(Clone, Debug, PartialEq)]
pub enum Subscript {
    Index(i64),
    Key(String),
}
