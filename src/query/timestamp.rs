//! Parsing of the vague datetime literal `~(…)`.
//!
//! A closed list of formats is tried in order; the first match wins.
//! Date-only forms resolve to midnight UTC, datetime forms without an
//! offset are taken as UTC.

use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

// RFC850 ("Monday, 02-Jan-2006 15:04:05 GMT"), Unix date output
// ("Mon Jan  2 15:04:05 UTC 2006"), and plain numeric datetimes.
const DATETIME_FORMATS: [&[FormatItem<'static>]; 4] = [
    format_description!(
        "[weekday], [day]-[month repr:short]-[year] [hour]:[minute]:[second] GMT"
    ),
    format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] UTC [year]"
    ),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
];

// Named-month dates and numeric date forms.
const DATE_FORMATS: [&[FormatItem<'static>]; 5] = [
    format_description!("[year]-[month]-[day]"),
    format_description!("[month]/[day]/[year]"),
    format_description!("[month repr:short] [day padding:none], [year]"),
    format_description!("[month repr:long] [day padding:none], [year]"),
    format_description!("[day padding:none] [month repr:short] [year]"),
];

/// Parses a vague timestamp into nanoseconds since the Unix epoch, or
/// `None` when no format in the closed list matches.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_vague_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(odt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(odt.unix_timestamp_nanos() as i64);
    }
    // covers RFC822 and RFC1123 with numeric zones
    if let Ok(odt) = OffsetDateTime::parse(text, &Rfc2822) {
        return Some(odt.unix_timestamp_nanos() as i64);
    }
    for format in DATETIME_FORMATS {
        if let Ok(pdt) = PrimitiveDateTime::parse(text, format) {
            return Some(pdt.assume_utc().unix_timestamp_nanos() as i64);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = Date::parse(text, format) {
            return Some(date.midnight().assume_utc().unix_timestamp_nanos() as i64);
        }
    }
    None
}
