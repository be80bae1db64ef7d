//! The query language front-end: scanner, recursive-descent parser, AST,
//! and the static type checker over the schema system.

mod ast;
mod parser;
mod scanner;
mod syntax_error;
mod timestamp;
mod typecheck;

pub use ast::{
    BinaryOp, Expr, Quantifier, Query, Stage, StageKind, Subscript, TimeExpr, TimePredicate,
    TopicSelector, UnaryOp, Whence,
};
pub use parser::parse_query;
pub use scanner::{Location, Scanner, Token, TokenKind};
pub use syntax_error::SyntaxError;
pub use timestamp::parse_vague_timestamp;
pub use typecheck::TypeChecker;
