//! Metadata filters: the first phase of the plan.
//!
//! The builder visits the query's quantifier, topic selector and time
//! predicate and emits a chain of entry filters over the database. The
//! first filter in the chain receives `None` and retrieves; successors
//! transform concrete entries.

use crate::query::{Quantifier, Query, TimePredicate};
use crate::store::{Database, Entries, RangeSemantics, TimeRange};
use crate::util::now_nanos;
use crate::FossilResult;

type EntryFilter<'db> = Box<dyn Fn(Option<Entries>) -> FossilResult<Entries> + 'db>;

/// Runs the metadata-filter chain for `query`.
pub(crate) fn apply_metadata_filters(db: &Database, query: &Query) -> FossilResult<Entries> {
    let mut entries = None;
    for filter in build(db, query) {
        entries = Some(filter(entries)?);
    }
    match entries {
        Some(entries) => Ok(entries),
        None => db.retrieve(None),
    }
}

fn build<'db>(db: &'db Database, query: &Query) -> Vec<EntryFilter<'db>> {
    let mut filters: Vec<EntryFilter<'db>> = Vec::new();
    let range: Option<TimeRange> = query
        .time
        .as_ref()
        .map(|predicate: &TimePredicate| predicate.to_range(now_nanos()));

    // the quantifier comes first in the chain and performs the retrieval
    match query.quantifier {
        Quantifier::All { .. } => {
            filters.push(Box::new(move |input| match input {
                Some(entries) => Ok(entries),
                None => db.retrieve(range.as_ref()),
            }));
        }
        Quantifier::Sample { interval, .. } => {
            filters.push(Box::new(move |input| {
                let entries = match input {
                    Some(entries) => entries,
                    None => db.retrieve(range.as_ref())?,
                };
                Ok(sample(entries, interval))
            }));
        }
    }

    if let Some(selector) = &query.topic {
        let topic = selector.topic.clone();
        filters.push(Box::new(move |input| {
            let entries = match input {
                Some(entries) => entries,
                None => db.retrieve(range.as_ref())?,
            };
            Ok(entries
                .into_iter()
                .filter(|e| topic_matches(&topic, &e.topic))
                .collect())
        }));
    }

    if let Some(range) = range {
        filters.push(Box::new(move |input| {
            let entries = match input {
                Some(entries) => entries,
                None => db.retrieve(Some(&range))?,
            };
            Ok(entries
                .into_iter()
                .filter(|e| match range.semantics {
                    RangeSemantics::Since => e.time >= range.start,
                    RangeSemantics::Before => e.time <= range.end,
                    RangeSemantics::Between => e.time >= range.start && e.time <= range.end,
                })
                .collect())
        }));
    }

    filters
}

// Topic selection respects path boundaries: `/foo` matches `/foo` and
// `/foo/bar` but never `/foobar`.
fn topic_matches(selector: &str, topic: &str) -> bool {
    if selector == "/" {
        return true;
    }
    topic == selector
        || (topic.len() > selector.len()
            && topic.starts_with(selector)
            && topic.as_bytes()[selector.len()] == b'/')
}

// Keep the first entry at or after each scheduled instant, instants spaced
// by `interval` from the first entry's time.
fn sample(entries: Entries, interval: i64) -> Entries {
    if interval <= 0 {
        return entries;
    }
    let mut out = Vec::new();
    let mut next: Option<i64> = None;
    for entry in entries {
        match next {
            None => {
                next = Some(entry.time + interval);
                out.push(entry);
            }
            Some(instant) => {
                if entry.time >= instant {
                    let skipped = (entry.time - instant) / interval + 1;
                    next = Some(instant + skipped * interval);
                    out.push(entry);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Entry;

    fn entry(time: i64, topic: &str) -> Entry {
        Entry {
            time,
            topic: topic.to_string(),
            schema: "string".to_string(),
            data: Vec::new(),
        }
    }

    #[test]
    fn topic_prefix_respects_path_boundaries() {
        assert!(topic_matches("/foo", "/foo"));
        assert!(topic_matches("/foo", "/foo/bar"));
        assert!(!topic_matches("/foo", "/foobar"));
        assert!(topic_matches("/", "/anything"));
    }

    #[test]
    fn sampling_keeps_first_entry_per_instant() {
        let entries: Entries = [0, 2, 4, 11, 12, 25, 26].iter().map(|&t| entry(t, "/t")).collect();
        let sampled = sample(entries, 10);
        let times: Vec<i64> = sampled.iter().map(|e| e.time).collect();
        // instants at 0, 10, 20, ...: entry 0 anchors, 11 is the first at
        // or after 10, 25 the first at or after 20
        assert_eq!(times, vec![0, 11, 25]);
    }

    #[test]
    fn sampling_with_gaps_stays_on_the_grid() {
        let entries: Entries = [0, 35].iter().map(|&t| entry(t, "/t")).collect();
        let sampled = sample(entries, 10);
        assert_eq!(sampled.len(), 2);
    }
}
