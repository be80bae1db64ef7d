//! The query execution plan: metadata filters over the database, the
//! expression evaluator, and the typed dataflow pipeline.

mod builtins;
mod eval;
mod filters;
mod pipeline;
mod value;

pub use builtins::{builtin_lookup, Builtin};
pub use value::Value;

use crate::query::{parse_query, TypeChecker};
use crate::schema::{ScalarType, Schema};
use crate::store::{Database, Entries};
use crate::{FossilError, FossilResult};

/// Parses, type-checks, plans and runs a query against a database,
/// returning the collected entries.
///
/// This is the same path the server drives for a `QUERY` command.
pub fn exec_query(db: &Database, text: &str) -> FossilResult<Entries> {
    let query = parse_query(text)?;

    // the starting schema is the selected topic's, defaulting to string
    let input_schema = match &query.topic {
        Some(selector) => db
            .schema_of(&selector.topic)?
            .unwrap_or(Schema::Type(ScalarType::String)),
        None => Schema::Type(ScalarType::String),
    };
    TypeChecker::check(&query, input_schema).map_err(FossilError::TypeErrors)?;

    let entries = filters::apply_metadata_filters(db, &query)?;
    if query.pipeline.is_empty() {
        return Ok(entries);
    }
    pipeline::run(&query.pipeline, entries)
}
