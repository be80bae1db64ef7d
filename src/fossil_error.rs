use crate::query::SyntaxError;
use thiserror::Error;

/// A list specifying categories of [`FossilError`](crate::FossilError).
///
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FossilError {
    /// A segment has reached its capacity and cannot take further datums.
    #[error("Segment is full")]
    SegmentFull,

    /// A schema string or a value literal could not be processed.
    #[error("Schema error: {}", _0)]
    Schema(String),

    /// The query text could not be parsed.
    #[error(transparent)]
    Syntax {
        /// The causing Error.
        #[from]
        source: SyntaxError,
    },

    /// The query parsed, but did not type-check against the topic's schema.
    ///
    /// All problems found in one pass are collected here.
    #[error("Query did not type-check: {}", render_type_errors(_0))]
    TypeErrors(Vec<SyntaxError>),

    /// A query failed while executing, e.g. an unknown symbol or an
    /// out-of-bounds subscript at runtime.
    #[error("Query evaluation failed: {}", _0)]
    Query(String),

    /// The requested database is not known to the server.
    #[error("Unknown database: {}", _0)]
    UnknownDatabase(String),

    /// Opening an on-disk database failed while migrating it forward.
    ///
    /// The original database files are left untouched.
    #[error("Migration failed: {}", _0)]
    Migration(String),

    /// A wire frame was malformed or oversized.
    #[error("Malformed frame: {}", _0)]
    Frame(String),

    /// A wire frame carried a command outside the vocabulary.
    #[error("Unknown command: {}", _0)]
    UnknownCommand(String),

    /// A frame's payload did not decode for its command.
    #[error("Unmarshal error: {}", _0)]
    Unmarshal(String),

    /// A server reported an error over the wire; the code is one of the
    /// protocol error codes (500..=506).
    #[error("Server responded with error {code}: {message}")]
    Remote {
        /// Protocol error code.
        code: u32,
        /// Error text supplied by the server.
        message: String,
    },

    /// Erroneous connection parameters, e.g. a malformed connection URL.
    #[error("Erroneous connection parameters")]
    ConnParams {
        /// The causing Error.
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Error occured in thread synchronization.
    #[error("Error occured in thread synchronization")]
    Poison,

    /// Error occured in file or network I/O.
    #[error(transparent)]
    Io {
        /// The causing Error.
        #[from]
        source: std::io::Error,
    },

    /// A command failed, was repeated after a reconnect, and failed again.
    #[error("Error occured with a command that was repeated after a reconnect")]
    ErrorAfterReconnect {
        /// The I/O failure that broke the connection.
        source: std::io::Error,
        /// The error of the repeated attempt.
        second: Box<FossilError>,
    },

    /// Error caused by wrong usage.
    #[error("Wrong usage: {}", _0)]
    Usage(&'static str),

    /// Error caused by wrong usage.
    #[error("Wrong usage: {}", _0)]
    UsageDetailed(String),

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    Impl(&'static str),

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    ImplDetailed(String),
}

/// Abbreviation of `Result<T, FossilError>`.
pub type FossilResult<T> = std::result::Result<T, FossilError>;

impl FossilError {
    /// Returns the contained [`SyntaxError`]s, if any.
    ///
    /// Parse errors yield a single element, type-check errors all collected
    /// problems.
    #[must_use]
    pub fn syntax_errors(&self) -> Option<Vec<&SyntaxError>> {
        match self {
            Self::Syntax { source } => Some(vec![source]),
            Self::TypeErrors(errors) => Some(errors.iter().collect()),
            _ => None,
        }
    }

    /// The protocol error code this error maps to on the wire.
    #[must_use]
    pub fn wire_code(&self) -> u32 {
        match self {
            Self::UnknownCommand(_) => 501,
            Self::Frame(_) => 502,
            Self::Unmarshal(_) => 506,
            Self::Io { .. } => 503,
            Self::Syntax { .. } | Self::TypeErrors(_) | Self::Query(_) => 504,
            Self::UnknownDatabase(_) => 505,
            Self::Remote { code, .. } => *code,
            _ => 500,
        }
    }

    pub(crate) fn conn_params(error: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self::ConnParams { source: error }
    }
}

impl<G> From<std::sync::PoisonError<G>> for FossilError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

impl From<serde_json::Error> for FossilError {
    fn from(error: serde_json::Error) -> Self {
        Self::ImplDetailed(format!("serialization failed: {error}"))
    }
}

fn render_type_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
