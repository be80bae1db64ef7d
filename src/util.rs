use crate::{FossilError, FossilResult};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Current wall-clock time as nanoseconds since the Unix epoch (UTC).
///
/// All timestamps and deltas in fossil are i64 nanoseconds.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn now_nanos() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

/// Renders a nanosecond timestamp as RFC3339 with nanosecond precision.
pub(crate) fn format_rfc3339(nanos: i64) -> FossilResult<String> {
    let odt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|e| FossilError::ImplDetailed(format!("timestamp out of range: {e}")))?;
    odt.format(&Rfc3339)
        .map_err(|e| FossilError::ImplDetailed(format!("timestamp formatting failed: {e}")))
}

/// Parses an RFC3339 timestamp into nanoseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn parse_rfc3339(text: &str) -> FossilResult<i64> {
    let odt = OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|e| FossilError::UsageDetailed(format!("bad RFC3339 timestamp {text:?}: {e}")))?;
    Ok(odt.unix_timestamp_nanos() as i64)
}
