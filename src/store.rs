//! The storage engine: segmented append-only log, write-ahead log, atomic
//! snapshotting, crash recovery, and forward migration.

mod database;
mod datum;
mod entry;
mod migration;
mod segment;
mod wal;

pub use database::{Database, RangeSemantics, TimeRange};
pub use datum::Datum;
pub use entry::{Entries, Entry};
pub use migration::{detect_version, FOSSIL_DB_VERSION};
pub use segment::{Segment, SEGMENT_SIZE};
pub use wal::{RecordKind, Wal};
