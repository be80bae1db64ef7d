//! The typed dataflow pipeline.
//!
//! Every stage runs in its own thread; stages communicate through bounded
//! channels of single-batch wrapped entries. The driver pushes one-entry
//! batches from metadata-filter output into the first stage, drops its
//! sender to finish, and waits for the collector to terminate.

use super::eval::Evaluator;
use super::value::Value;
use crate::query::{Stage, StageKind};
use crate::schema::Schema;
use crate::store::{Entries, Entry};
use crate::{FossilError, FossilResult, PIPELINE_CHANNEL_CAPACITY};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;

/// An entry paired with its cached typed value.
#[derive(Clone, Debug)]
struct WrappedEntry {
    entry: Entry,
    value: Value,
}

type Batch = Vec<WrappedEntry>;

/// Runs `entries` through the pipeline stages, collecting the tail.
pub(crate) fn run(stages: &[Stage], entries: Entries) -> FossilResult<Entries> {
    let (first_tx, mut rx) = bounded::<Batch>(PIPELINE_CHANNEL_CAPACITY);
    let mut workers = Vec::with_capacity(stages.len());
    for stage in stages {
        let (tx, next_rx) = bounded::<Batch>(PIPELINE_CHANNEL_CAPACITY);
        let stage = stage.clone();
        let stage_rx = rx;
        workers.push(std::thread::spawn(move || run_stage(&stage, &stage_rx, &tx)));
        rx = next_rx;
    }
    let collector = std::thread::spawn(move || {
        let mut out = Vec::new();
        for batch in rx {
            for wrapped in batch {
                out.push(wrapped.entry);
            }
        }
        out
    });

    for entry in entries {
        let schema = match Schema::parse(&entry.schema) {
            Ok(schema) => schema,
            Err(e) => {
                warn!("pipeline: skipping entry with unparseable schema: {e}");
                continue;
            }
        };
        match Value::from_entry(&schema, &entry.data) {
            Ok(value) => {
                if first_tx.send(vec![WrappedEntry { entry, value }]).is_err() {
                    break;
                }
            }
            Err(e) => warn!("pipeline: skipping entry that does not decode: {e}"),
        }
    }
    // finish: dropping the sender closes stage 0's input
    drop(first_tx);

    for worker in workers {
        let _ = worker.join();
    }
    collector
        .join()
        .map_err(|_| FossilError::Impl("pipeline collector panicked"))
}

fn run_stage(stage: &Stage, rx: &Receiver<Batch>, tx: &Sender<Batch>) {
    match stage.kind {
        StageKind::Filter => run_filter(stage, rx, tx),
        StageKind::Map => run_map(stage, rx, tx),
        StageKind::Reduce => run_reduce(stage, rx, tx),
    }
    // tx is dropped on return, closing the downstream channel exactly once
}

fn run_filter(stage: &Stage, rx: &Receiver<Batch>, tx: &Sender<Batch>) {
    for batch in rx.iter() {
        let symbols = match bind(&stage.args, &batch) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("filter: skipping batch: {e}");
                continue;
            }
        };
        match Evaluator::new(symbols).eval(&stage.body) {
            Ok(value) => {
                if value.truthy() && tx.send(batch).is_err() {
                    return;
                }
            }
            Err(e) => warn!("filter: skipping batch: {e}"),
        }
    }
}

fn run_map(stage: &Stage, rx: &Receiver<Batch>, tx: &Sender<Batch>) {
    for batch in rx.iter() {
        let symbols = match bind(&stage.args, &batch) {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("map: skipping batch: {e}");
                continue;
            }
        };
        let prototype = &batch[0].entry;
        let out = match Evaluator::new(symbols).eval_results(&stage.body) {
            Ok(results) => results
                .into_iter()
                .map(|value| rewrap(prototype, value))
                .collect(),
            // a bad datum becomes an error entry, the stage keeps going
            Err(e) => vec![error_entry(prototype, &e)],
        };
        if tx.send(out).is_err() {
            return;
        }
    }
}

fn run_reduce(stage: &Stage, rx: &Receiver<Batch>, tx: &Sender<Batch>) {
    let mut acc: Option<WrappedEntry> = None;
    for batch in rx.iter() {
        for wrapped in batch {
            acc = match acc {
                None => Some(wrapped),
                Some(prev) => {
                    let mut symbols = HashMap::new();
                    symbols.insert(stage.args[0].clone(), prev.value.clone());
                    symbols.insert(stage.args[1].clone(), wrapped.value.clone());
                    match Evaluator::new(symbols).eval(&stage.body) {
                        Ok(value) => Some(rewrap(&wrapped.entry, value)),
                        Err(e) => {
                            warn!("reduce: keeping accumulator, dropping pair: {e}");
                            Some(prev)
                        }
                    }
                }
            };
        }
    }
    if let Some(acc) = acc {
        let _ = tx.send(vec![acc]);
    }
}

// New wrapped entry for a stage result, copying timing and topic from the
// prototype. Values that cannot be serialized surface as a `string` entry
// carrying the error text.
fn rewrap(prototype: &Entry, value: Value) -> WrappedEntry {
    match value.encode() {
        Ok((schema, data)) => WrappedEntry {
            entry: Entry {
                time: prototype.time,
                topic: prototype.topic.clone(),
                schema,
                data,
            },
            value,
        },
        Err(e) => error_entry(prototype, &e),
    }
}

fn error_entry(prototype: &Entry, error: &FossilError) -> WrappedEntry {
    let message = error.to_string();
    WrappedEntry {
        entry: Entry {
            time: prototype.time,
            topic: prototype.topic.clone(),
            schema: "string".to_string(),
            data: message.clone().into_bytes(),
        },
        value: Value::String(message),
    }
}

// Argument binding against a batch: one argument binds the whole value (a
// multi-entry batch binds as a tuple), N arguments bind N batch entries or
// the N elements of a single tuple-valued entry.
fn bind(args: &[String], batch: &Batch) -> FossilResult<HashMap<String, Value>> {
    let mut symbols = HashMap::new();
    if args.len() == batch.len() {
        for (arg, wrapped) in args.iter().zip(batch) {
            symbols.insert(arg.clone(), wrapped.value.clone());
        }
        return Ok(symbols);
    }
    if args.len() == 1 {
        let value = Value::Tuple(batch.iter().map(|w| w.value.clone()).collect());
        symbols.insert(args[0].clone(), value);
        return Ok(symbols);
    }
    if batch.len() == 1 {
        if let Value::Tuple(elements) = &batch[0].value {
            if elements.len() == args.len() {
                for (arg, value) in args.iter().zip(elements) {
                    symbols.insert(arg.clone(), value.clone());
                }
                return Ok(symbols);
            }
        }
    }
    Err(FossilError::Query(format!(
        "{} arguments do not fit a batch of {}",
        args.len(),
        batch.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn wrapped(value: Value) -> WrappedEntry {
        let (schema, data) = value.encode().unwrap();
        WrappedEntry {
            entry: Entry {
                time: 1,
                topic: "/t".to_string(),
                schema,
                data,
            },
            value,
        }
    }

    fn stages(query: &str) -> Vec<Stage> {
        parse_query(query).unwrap().pipeline
    }

    fn int_entries(values: &[i64]) -> Entries {
        values
            .iter()
            .map(|&v| {
                let (schema, data) = Value::Int(v).encode().unwrap();
                Entry {
                    time: v,
                    topic: "/n".to_string(),
                    schema,
                    data,
                }
            })
            .collect()
    }

    #[test]
    fn filter_forwards_matching_batches() {
        let stages = stages("all | filter v -> v > 2");
        let out = run(&stages, int_entries(&[1, 2, 3, 4])).unwrap();
        let values: Vec<i64> = out
            .iter()
            .map(|e| i64::from_le_bytes(e.data.as_slice().try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![3, 4]);
    }

    #[test]
    fn map_rewrites_values_and_preserves_order() {
        let stages = stages("all | map v -> v * 10");
        let out = run(&stages, int_entries(&[1, 2, 3])).unwrap();
        let values: Vec<i64> = out
            .iter()
            .map(|e| i64::from_le_bytes(e.data.as_slice().try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(out[0].time, 1, "timing is copied from the prototype");
    }

    #[test]
    fn reduce_collapses_to_a_single_entry() {
        let stages = stages("all | reduce a, b -> a + b");
        let out = run(&stages, int_entries(&[1, 2, 3, 4])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            i64::from_le_bytes(out[0].data.as_slice().try_into().unwrap()),
            10
        );
    }

    #[test]
    fn map_tuple_body_fans_out_then_binds_elementwise() {
        let stages = stages("all | map v -> v, v * 2 | map a, b -> a + b");
        let out = run(&stages, int_entries(&[5])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            i64::from_le_bytes(out[0].data.as_slice().try_into().unwrap()),
            15
        );
    }

    #[test]
    fn binding_destructures_a_stored_tuple() {
        let batch = vec![wrapped(Value::Tuple(vec![Value::Int(1), Value::Int(2)]))];
        let symbols = bind(&["a".to_string(), "b".to_string()], &batch).unwrap();
        assert_eq!(symbols["a"], Value::Int(1));
        assert_eq!(symbols["b"], Value::Int(2));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let stages = stages("all | map v -> v");
        assert!(run(&stages, Vec::new()).unwrap().is_empty());
    }
}
