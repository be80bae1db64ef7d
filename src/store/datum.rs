/// A stored record inside a [`Segment`](crate::Segment).
///
/// The datum's absolute timestamp is `segment.head_time + delta`. The data
/// bytes are opaque here; their interpretation is fixed by the owning
/// topic's schema.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    /// Signed nanosecond offset from the owning segment's head time.
    pub delta: i64,
    /// Index into the database's topic table.
    pub topic_id: u32,
    /// Opaque value bytes.
    pub data: Vec<u8>,
}

/// Sentinel delta: resolve to `now - head_time` at append time.
pub(crate) const DELTA_NOW: i64 = -1;

impl Datum {
    /// A datum whose delta is resolved against the segment head at append
    /// time.
    pub fn now(topic_id: u32, data: Vec<u8>) -> Self {
        Self {
            delta: DELTA_NOW,
            topic_id,
            data,
        }
    }
}
