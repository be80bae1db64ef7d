//! Constants for use in connection URLs.
//!
//! Fossil is reachable two ways, selected by the URL scheme:
//!
//! ```text
//! file://<path>                     embedded, local directory
//! <path>                            same as file://<path>
//! fossil://<host>:<port>[/<db>]     remote, over the wire protocol
//! ```
//!
//! The path-only forms select the database named `default`. Unrecognized
//! schemes are rejected.

/// Scheme for local (embedded) access.
pub const FILE: &str = "file";

/// Scheme for remote access over the wire protocol.
pub const FOSSIL: &str = "fossil";

/// The database selected when a URL names none.
pub const DEFAULT_DATABASE: &str = "default";

/// The port used when a `fossil://` URL names none.
pub const DEFAULT_PORT: u16 = 8001;
