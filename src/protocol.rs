//! The wire protocol: length-prefixed frames, the command vocabulary, and
//! request/response marshaling.
//!
//! Frame layout:
//!
//! ```text
//! +--------+--------+--------+--------+--------+ ... +--------+ ... +
//! |  length (u32 big-endian)          | command (8 ASCII) | payload |
//! +--------+--------+--------+--------+--------+ ... +--------+ ... +
//! ```
//!
//! `length` counts the command bytes plus the payload. Commands are
//! null-padded to exactly 8 bytes and uppercased on the wire. Multi-byte
//! fields are big-endian.

mod frame;
mod message;

pub use frame::{read_frame, write_frame, Command, MAX_MESSAGE_SIZE};
pub use message::{Request, Response, ServerStats};

/// Wire error codes.
pub mod code {
    /// Generic failure.
    pub const GENERIC: u32 = 500;
    /// Unknown command.
    pub const UNKNOWN_COMMAND: u32 = 501;
    /// Malformed frame.
    pub const MALFORMED: u32 = 502;
    /// Write failure.
    pub const WRITE_FAILED: u32 = 503;
    /// Query error.
    pub const QUERY_FAILED: u32 = 504;
    /// Unknown database, or no database selected.
    pub const UNKNOWN_DATABASE: u32 = 505;
    /// Unmarshal error.
    pub const UNMARSHAL: u32 = 506;
    /// The code carried by the server's `VERSION` reply.
    pub const VERSION_OK: u32 = 200;
    /// Acknowledged.
    pub const OK: u32 = 200;
    /// Database selected.
    pub const USING: u32 = 201;
}
