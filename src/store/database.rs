use super::datum::Datum;
use super::entry::{Entries, Entry};
use super::migration::{self, PersistedDatabase, BACKUP_FILE, DATABASE_FILE, FOSSIL_DB_VERSION};
use super::segment::{Segment, SEGMENT_SIZE};
use super::wal::{Record, Wal};
use crate::schema::Schema;
use crate::util::now_nanos;
use crate::{FossilError, FossilResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

/// How the ends of a [`TimeRange`] bind to entry timestamps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeSemantics {
    /// Everything at or before `end`.
    Before,
    /// Everything at or after `start`.
    Since,
    /// Everything between `start` and `end`, both ends inclusive.
    Between,
}

/// A time-range selection over the retrieve path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeRange {
    /// Range start, nanoseconds since the Unix epoch.
    pub start: i64,
    /// Range end, nanoseconds since the Unix epoch.
    pub end: i64,
    /// Boundary behavior.
    pub semantics: RangeSemantics,
}

impl TimeRange {
    pub fn since(start: i64, now: i64) -> Self {
        Self {
            start,
            end: now,
            semantics: RangeSemantics::Since,
        }
    }

    pub fn before(end: i64) -> Self {
        Self {
            start: 0,
            end,
            semantics: RangeSemantics::Before,
        }
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            semantics: RangeSemantics::Between,
        }
    }
}

// Segment list and the append counter, guarded by one RwLock: appends and
// snapshots take the write half, retrieval the read half.
#[derive(Debug)]
struct Store {
    segments: Vec<Segment>,
    current: usize,
    append_count: usize,
}

// Topic registry: name → dense id, with the parallel reverse lookups.
#[derive(Debug, Default)]
struct TopicTable {
    topics: HashMap<String, u32>,
    topic_lookup: Vec<String>,
    schema_lookup: Vec<Schema>,
}

impl TopicTable {
    fn insert(&mut self, name: String, schema: Schema) -> u32 {
        let id = self.topic_lookup.len() as u32;
        self.topics.insert(name.clone(), id);
        self.topic_lookup.push(name);
        self.schema_lookup.push(schema);
        id
    }
}

/// The database aggregate: topic registry, segment list, WAL, snapshot.
///
/// All mutating operations go through `&self`; appends are serialized by an
/// exclusive write lock, the topic table sits under its own reader-writer
/// lock so topic reads during an append do not block. Snapshotting holds
/// the write lock, so a retrieval never observes a half-written snapshot.
#[derive(Debug)]
pub struct Database {
    name: String,
    dir: PathBuf,
    wal: Wal,
    store: RwLock<Store>,
    topics: RwLock<TopicTable>,
    append_lock: Mutex<()>,
}

impl Database {
    /// Opens or creates the database `name` under `directory`.
    ///
    /// Loads the snapshot if present (migrating old formats forward first),
    /// replays the WAL on top, or initializes a fresh database with the
    /// root topic `/` and one empty segment.
    pub fn open(name: &str, directory: impl AsRef<Path>) -> FossilResult<Self> {
        let dir = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        // a backup without a matching rename is a crashed snapshot
        let backup = dir.join(BACKUP_FILE);
        if backup.exists() {
            warn!("{name}: discarding stale snapshot backup {backup:?}");
            std::fs::remove_file(&backup)?;
        }

        let version = migration::detect_version(&dir)?;
        let snapshot_present = dir.join(DATABASE_FILE).exists();
        if snapshot_present && version < FOSSIL_DB_VERSION {
            migration::migrate(&dir, version)?;
        }

        let wal = Wal::new(&dir);
        let mut store = Store {
            segments: Vec::new(),
            current: 0,
            append_count: 0,
        };
        let mut table = TopicTable::default();

        if snapshot_present {
            let persisted = migration::load_current(&dir)?;
            store.segments = persisted.segments;
            store.current = persisted.current;
            for (name, schema) in persisted
                .topic_lookup
                .into_iter()
                .zip(persisted.schema_lookup)
            {
                let schema = Schema::parse(&schema)?;
                table.insert(name, schema);
            }
            debug!(
                "{name}: loaded snapshot with {} segments, {} topics",
                store.segments.len(),
                table.topic_lookup.len()
            );
        }

        if wal.exists() {
            let records = wal.records()?;
            debug!("{name}: replaying {} WAL records", records.len());
            for record in records {
                apply_record(&mut store, &mut table, record);
            }
        }

        let db = Self {
            name: name.to_string(),
            dir,
            wal,
            store: RwLock::new(store),
            topics: RwLock::new(table),
            append_lock: Mutex::new(()),
        };

        if db.store.read()?.segments.is_empty() {
            db.bootstrap()?;
        }
        Ok(db)
    }

    // Fresh database: journal and apply the root topic and first segment.
    fn bootstrap(&self) -> FossilResult<()> {
        info!("{}: initializing fresh database in {:?}", self.name, self.dir);
        self.add_topic("/", "string")?;
        let now = now_nanos();
        self.wal.add_segment(now)?;
        let mut store = self.store.write()?;
        store.segments.push(Segment::new(now));
        store.current = 0;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Ensures a topic exists, returning its id.
    ///
    /// Idempotent: an existing topic keeps its schema and the requested one
    /// is ignored. Names are normalized by prepending `/` when absent; an
    /// empty schema string means `string`.
    pub fn add_topic(&self, name: &str, schema: &str) -> FossilResult<u32> {
        let name = normalize_topic(name);
        if let Some(&id) = self.topics.read()?.topics.get(&name) {
            return Ok(id);
        }
        let schema = if schema.is_empty() { "string" } else { schema };
        let schema = Schema::parse(schema)?;

        let mut table = self.topics.write()?;
        // raced with another writer between the locks
        if let Some(&id) = table.topics.get(&name) {
            return Ok(id);
        }
        self.wal.add_topic(&name, &schema.to_string())?;
        let id = table.insert(name.clone(), schema);
        debug!("{}: topic {name} assigned id {id}", self.name);
        Ok(id)
    }

    /// Appends `data` to `topic`, stamping it with the current time.
    ///
    /// The topic is created with the default `string` schema when missing.
    /// The WAL record is written before the in-memory segment is touched;
    /// the caller's buffer is copied before the write lock is taken.
    pub fn append(&self, data: &[u8], topic: &str) -> FossilResult<()> {
        let now = now_nanos();
        let topic_id = self.add_topic(topic, "")?;
        let data = data.to_vec();
        {
            let _guard = self.append_lock.lock()?;
            let mut store = self.store.write()?;
            if store.segments[store.current].is_full() {
                self.wal.add_segment(now)?;
                store.segments.push(Segment::new(now));
                store.current += 1;
            }
            let current = store.current;
            let head_time = store.segments[current].head_time();
            let datum = Datum {
                delta: now - head_time,
                topic_id,
                data,
            };
            self.wal.add_event(&datum)?;
            store.segments[current].append(datum)?;
            store.append_count += 1;
        }
        self.maybe_snapshot()
    }

    /// Returns entries matching the optional time range, in insertion
    /// order. Without a range, all entries across all segments.
    pub fn retrieve(&self, range: Option<&TimeRange>) -> FossilResult<Entries> {
        let store = self.store.read()?;
        let table = self.topics.read()?;

        let Some(range) = range else {
            let mut out = Vec::new();
            for segment in &store.segments {
                for datum in segment.datums() {
                    out.push(hydrate(&table, segment, datum)?);
                }
            }
            return Ok(out);
        };

        // largest segment whose head time is not after range.start,
        // falling back to the current segment
        let mut start_seg = store.current;
        for i in (0..store.segments.len()).rev() {
            if store.segments[i].head_time() <= range.start {
                start_seg = i;
                break;
            }
        }
        // largest segment whose head time is not after range.end
        let mut end_seg = None;
        for i in (0..store.segments.len()).rev() {
            if store.segments[i].head_time() <= range.end {
                end_seg = Some(i);
                break;
            }
        }
        let Some(end_seg) = end_seg else {
            return Ok(Vec::new());
        };
        if start_seg > end_seg {
            return Ok(Vec::new());
        }

        let mut start_idx = store.segments[start_seg].find_approx(range.start);
        let mut end_idx = store.segments[end_seg].find_approx(range.end) as isize;

        // boundary correction; the end sub-index is inclusive
        if matches!(
            range.semantics,
            RangeSemantics::Since | RangeSemantics::Between
        ) {
            let segment = &store.segments[start_seg];
            while start_idx < segment.len()
                && segment.head_time() + segment.datums()[start_idx].delta < range.start
            {
                start_idx += 1;
            }
        }
        if matches!(
            range.semantics,
            RangeSemantics::Before | RangeSemantics::Between
        ) {
            let segment = &store.segments[end_seg];
            while end_idx >= 0
                && segment.head_time() + segment.datums()[end_idx as usize].delta > range.end
            {
                end_idx -= 1;
            }
        }

        let mut out = Vec::new();
        for i in start_seg..=end_seg {
            let segment = &store.segments[i];
            if segment.is_empty() {
                continue;
            }
            let lo = if i == start_seg { start_idx } else { 0 };
            let hi = if i == end_seg {
                end_idx
            } else {
                segment.len() as isize - 1
            };
            if hi < 0 || lo as isize > hi {
                continue;
            }
            for datum in &segment.datums()[lo..=hi as usize] {
                out.push(hydrate(&table, segment, datum)?);
            }
        }
        Ok(out)
    }

    /// Serializes the aggregate to disk and truncates the WAL.
    ///
    /// Sequence: write `database.bak`, rename it over `database`, write
    /// `metadata`, delete `wal.log`. Runs under the write lock, so no
    /// append or retrieval overlaps the snapshot.
    pub fn snapshot(&self) -> FossilResult<()> {
        let _guard = self.append_lock.lock()?;
        let mut store = self.store.write()?;
        let table = self.topics.read()?;
        let persisted = PersistedDatabase {
            version: FOSSIL_DB_VERSION,
            name: self.name.clone(),
            segments: store.segments.clone(),
            current: store.current,
            topic_lookup: table.topic_lookup.clone(),
            schema_lookup: table.schema_lookup.iter().map(ToString::to_string).collect(),
            topics: table.topics.clone(),
        };
        migration::store_current(&self.dir, &persisted)?;
        if self.wal.exists() {
            self.wal.delete()?;
        }
        store.append_count = 0;
        info!(
            "{}: snapshot complete ({} segments)",
            self.name,
            store.segments.len()
        );
        Ok(())
    }

    fn maybe_snapshot(&self) -> FossilResult<()> {
        let due = self.store.read()?.append_count > SEGMENT_SIZE;
        if due {
            self.snapshot()?;
        }
        Ok(())
    }

    /// The declared schema of a topic, if the topic exists.
    pub fn schema_of(&self, topic: &str) -> FossilResult<Option<Schema>> {
        let name = normalize_topic(topic);
        let table = self.topics.read()?;
        Ok(table
            .topics
            .get(&name)
            .map(|&id| table.schema_lookup[id as usize].clone()))
    }

    /// All topic names, in id order.
    pub fn topic_names(&self) -> FossilResult<Vec<String>> {
        Ok(self.topics.read()?.topic_lookup.clone())
    }

    /// `name:schema` renderings of all topics, in id order.
    pub fn schema_listing(&self) -> FossilResult<Vec<String>> {
        let table = self.topics.read()?;
        Ok(table
            .topic_lookup
            .iter()
            .zip(&table.schema_lookup)
            .map(|(name, schema)| format!("{name}:{schema}"))
            .collect())
    }

    pub fn topic_count(&self) -> FossilResult<usize> {
        Ok(self.topics.read()?.topic_lookup.len())
    }

    pub fn segment_count(&self) -> FossilResult<usize> {
        Ok(self.store.read()?.segments.len())
    }

    /// Sizes of all segments, in order.
    pub fn segment_sizes(&self) -> FossilResult<Vec<usize>> {
        Ok(self.store.read()?.segments.iter().map(Segment::len).collect())
    }
}

// WAL replay into the in-memory state. Assumes record order: a segment
// record precedes the events stored in it. Anomalies are logged and
// skipped, never fatal.
fn apply_record(store: &mut Store, table: &mut TopicTable, record: Record) {
    match record {
        Record::Topic { name, schema } => {
            if table.topics.contains_key(&name) {
                return;
            }
            match Schema::parse(&schema) {
                Ok(schema) => {
                    table.insert(name, schema);
                }
                Err(e) => warn!("replay: skipping topic {name} with bad schema: {e}"),
            }
        }
        Record::Segment { head_time } => {
            store.segments.push(Segment::new(head_time));
            if store.segments.len() > 1 {
                store.current += 1;
            }
        }
        Record::Event(datum) => {
            let current = store.current;
            match store.segments.get_mut(current) {
                Some(segment) => {
                    if let Err(e) = segment.append(datum) {
                        warn!("replay: skipping event: {e}");
                    }
                }
                None => warn!("replay: event before any segment record"),
            }
        }
    }
}

fn hydrate(table: &TopicTable, segment: &Segment, datum: &Datum) -> FossilResult<Entry> {
    let idx = datum.topic_id as usize;
    let (topic, schema) = match (table.topic_lookup.get(idx), table.schema_lookup.get(idx)) {
        (Some(topic), Some(schema)) => (topic.clone(), schema.to_string()),
        _ => {
            return Err(FossilError::ImplDetailed(format!(
                "datum references unknown topic id {}",
                datum.topic_id
            )));
        }
    };
    Ok(Entry {
        time: segment.head_time() + datum.delta,
        topic,
        schema,
        data: datum.data.clone(),
    })
}

/// Normalizes a topic name so it always begins with `/`.
pub(crate) fn normalize_topic(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_topic_names() {
        assert_eq!(normalize_topic("/a/b"), "/a/b");
        assert_eq!(normalize_topic("a/b"), "/a/b");
        assert_eq!(normalize_topic(""), "/");
    }

    #[test]
    fn fresh_database_has_root_topic_and_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open("default", dir.path()).unwrap();
        assert_eq!(db.topic_names().unwrap(), vec!["/"]);
        assert_eq!(db.segment_count().unwrap(), 1);
        assert_eq!(db.schema_of("/").unwrap().unwrap().to_string(), "string");
    }

    #[test]
    fn add_topic_is_idempotent_and_dense() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open("default", dir.path()).unwrap();
        let a = db.add_topic("/a", "int32").unwrap();
        let b = db.add_topic("b", "").unwrap();
        assert_eq!((a, b), (1, 2));
        // existing topic keeps its schema, requested one is ignored
        assert_eq!(db.add_topic("/a", "float64").unwrap(), 1);
        assert_eq!(db.schema_of("/a").unwrap().unwrap().to_string(), "int32");
        assert_eq!(db.topic_names().unwrap(), vec!["/", "/a", "/b"]);
    }

    #[test]
    fn append_and_retrieve_all() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open("default", dir.path()).unwrap();
        db.append(b"one", "/t").unwrap();
        db.append(b"two", "/t").unwrap();
        let entries = db.retrieve(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data, b"one");
        assert_eq!(entries[1].data, b"two");
        assert!(entries[0].time <= entries[1].time);
        assert_eq!(entries[0].topic, "/t");
        assert_eq!(entries[0].schema, "string");
    }

    #[test]
    fn retrieve_with_range_clamps_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open("default", dir.path()).unwrap();
        for data in [b"a", b"b", b"c"] {
            db.append(data, "/t").unwrap();
        }
        let entries = db.retrieve(None).unwrap();
        let (t0, t2) = (entries[0].time, entries[2].time);

        let since = db
            .retrieve(Some(&TimeRange::since(entries[1].time, t2 + 1)))
            .unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].data, b"b");

        let before = db.retrieve(Some(&TimeRange::before(entries[1].time))).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[1].data, b"b");

        let between = db
            .retrieve(Some(&TimeRange::between(t0, entries[1].time)))
            .unwrap();
        assert_eq!(between.len(), 2);

        // an end before all data yields nothing
        assert!(db.retrieve(Some(&TimeRange::before(t0 - 10))).unwrap().is_empty());
    }
}
