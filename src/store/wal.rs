use super::datum::Datum;
use crate::FossilResult;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// File name of the write-ahead log inside a database directory.
pub(crate) const WAL_FILE: &str = "wal.log";

/// Stable numeric codes of the three WAL record kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordKind {
    /// A datum appended to the current segment.
    AddEvent = 0,
    /// A new segment opened with a recorded head time.
    AddSegment = 1,
    /// A topic inserted into the topic table.
    AddTopic = 2,
}

impl RecordKind {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::AddEvent),
            1 => Some(Self::AddSegment),
            2 => Some(Self::AddTopic),
            _ => None,
        }
    }
}

/// A decoded WAL record.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Record {
    Event(Datum),
    Segment { head_time: i64 },
    Topic { name: String, schema: String },
}

/// The write-ahead log of a single database directory.
///
/// Stateless between calls: the value wraps the file path and opens the file
/// in append mode per write. Records are `kind ';' base64(payload) '\n'`
/// lines; every public mutating operation of the database writes here
/// before updating in-memory structures.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
}

impl Wal {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(WAL_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Removes the log file; called after a successful snapshot.
    pub fn delete(&self) -> FossilResult<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    pub(crate) fn add_event(&self, datum: &Datum) -> FossilResult<()> {
        self.append(RecordKind::AddEvent, &serde_json::to_vec(datum)?)
    }

    pub(crate) fn add_segment(&self, head_time: i64) -> FossilResult<()> {
        self.append(RecordKind::AddSegment, &serde_json::to_vec(&head_time)?)
    }

    pub(crate) fn add_topic(&self, name: &str, schema: &str) -> FossilResult<()> {
        self.append(RecordKind::AddTopic, format!("{name}:{schema}").as_bytes())
    }

    fn append(&self, kind: RecordKind, payload: &[u8]) -> FossilResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = format!("{};{}\n", kind as u8, BASE64.encode(payload));
        file.write_all(line.as_bytes())?;
        file.flush()?;
        trace!("WAL {:?}: appended {kind:?} record", self.path);
        Ok(())
    }

    /// Reads all records in order. A record that fails to decode is skipped
    /// with a warning; the log is treated as possibly truncated or partially
    /// corrupt and replay never aborts because of one bad line.
    pub(crate) fn records(&self) -> FossilResult<Vec<Record>> {
        let file = std::fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match decode_record(&line) {
                Some(record) => records.push(record),
                None => {
                    warn!(
                        "WAL {:?}: skipping undecodable record on line {}",
                        self.path,
                        lineno + 1
                    );
                }
            }
        }
        Ok(records)
    }
}

fn decode_record(line: &str) -> Option<Record> {
    let (kind, payload) = line.split_once(';')?;
    let kind = RecordKind::from_code(kind.parse().ok()?)?;
    let payload = BASE64.decode(payload).ok()?;
    match kind {
        RecordKind::AddEvent => Some(Record::Event(serde_json::from_slice(&payload).ok()?)),
        RecordKind::AddSegment => Some(Record::Segment {
            head_time: serde_json::from_slice(&payload).ok()?,
        }),
        RecordKind::AddTopic => {
            let text = String::from_utf8(payload).ok()?;
            // absent schema implies string
            let (name, schema) = match text.split_once(':') {
                Some((name, schema)) => (name.to_string(), schema.to_string()),
                None => (text, "string".to_string()),
            };
            Some(Record::Topic { name, schema })
        }
    }
}
