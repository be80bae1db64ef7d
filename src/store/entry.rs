use crate::util::format_rfc3339;
use crate::FossilResult;

/// The hydrated, read-facing record materialized by the retrieve path.
///
/// Entries are never persisted; they are built from datums on the way out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// Absolute timestamp, nanoseconds since the Unix epoch.
    pub time: i64,
    /// Topic name, normalized to start with `/`.
    pub topic: String,
    /// String rendering of the topic's schema.
    pub schema: String,
    /// Value bytes, interpreted per `schema`.
    pub data: Vec<u8>,
}

/// A batch of entries in insertion order.
pub type Entries = Vec<Entry>;

impl Entry {
    /// The entry's time rendered as RFC3339 with nanosecond precision, as
    /// used on the wire.
    pub fn rfc3339_time(&self) -> FossilResult<String> {
        format_rfc3339(self.time)
    }
}
