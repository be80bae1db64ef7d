//! Fossil is an embeddable and networked time-series database for small,
//! ordered records grouped under hierarchical topics.
//!
//! Writers append entries to topics; readers issue declarative queries that
//! combine time-range selection, topic prefix matching, sampling, and a typed
//! filter/map/reduce pipeline over schema-typed data.
//!
//! For embedded use, open a [`Database`] and call its operations directly:
//!
//! ```rust,no_run
//! use fossil::{Database, FossilResult};
//!
//! fn main() -> FossilResult<()> {
//!     let db = Database::open("default", "./data")?;
//!     db.append(b"hello", "/greetings")?;
//!     let entries = fossil::exec_query(&db, "all in /greetings")?;
//!     assert_eq!(entries.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! For networked use, run a [`Server`] and talk to it with a [`Client`]
//! connected via a `fossil://host:port[/database]` URL.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod client;
mod conn;
mod fossil_error;
mod plan;
mod protocol;
mod query;
mod schema;
mod server;
mod store;
pub mod url;
mod util;

pub use crate::client::Client;
pub use crate::conn::{ConnectParams, IntoConnectParams};
pub use crate::fossil_error::{FossilError, FossilResult};
pub use crate::plan::{exec_query, Builtin, Value};
pub use crate::protocol::{code, Command, Request, Response, ServerStats, MAX_MESSAGE_SIZE};
pub use crate::query::{
    parse_query, Location, Query, Scanner, SyntaxError, Token, TokenKind, TypeChecker,
};
pub use crate::schema::{decode_value, encode_value, ScalarType, Schema};
pub use crate::server::Server;
pub use crate::store::{
    detect_version, Database, Datum, Entries, Entry, RangeSemantics, Segment, TimeRange, Wal,
    FOSSIL_DB_VERSION, SEGMENT_SIZE,
};

/// The version string advertised in the `VERSION` handshake.
pub const FOSSIL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capacity of the bounded channels connecting pipeline stages.
///
/// Stages exchange single-entry batches; a small bound keeps memory flat
/// while still letting upstream stages run ahead of slow consumers.
pub const PIPELINE_CHANNEL_CAPACITY: usize = 64;
