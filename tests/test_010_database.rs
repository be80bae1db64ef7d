
use fossil::{Database, Entries, FossilResult, TimeRange};
use log::info;
use std::path::Path;

// cargo test test_010_database -- --nocapture
#[test]
fn test_010_database() -> FossilResult<()> {
    let _log_handle = test_utils::init_logger();
    let start = std::time::Instant::now();
    let base = tempfile::tempdir()?;

    append_survives_reopen(base.path())?;
    times_survive_reopen(base.path())?;
    snapshot_is_idempotent(base.path())?;
    range_retrieval(base.path())?;

    test_utils::closing_info(start);
    Ok(())
}

// Open an empty directory, append, close, re-open: retrieve(all) returns
// exactly the appended entry.
fn append_survives_reopen(base: &Path) -> FossilResult<()> {
    info!("append, drop, re-open, retrieve");
    let dir = base.join("db_test");
    {
        let db = Database::open("db_test", &dir)?;
        db.append(b"hi", "/greetings")?;
    }
    let db = Database::open("db_test", &dir)?;
    let entries = db.retrieve(None)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].topic, "/greetings");
    assert_eq!(entries[0].data, b"hi");
    assert_eq!(entries[0].schema, "string");
    Ok(())
}

// WAL replay reconstructs segment head times, so absolute entry times are
// identical after a crash-and-reopen.
fn times_survive_reopen(base: &Path) -> FossilResult<()> {
    info!("entry times are stable across re-open");
    let dir = base.join("times");
    let before: Entries;
    {
        let db = Database::open("times", &dir)?;
        for data in [b"a", b"b", b"c"] {
            db.append(data, "/t")?;
        }
        before = db.retrieve(None)?;
    }
    let db = Database::open("times", &dir)?;
    assert_eq!(db.retrieve(None)?, before);
    Ok(())
}

fn snapshot_is_idempotent(base: &Path) -> FossilResult<()> {
    info!("snapshot, then re-open twice");
    let dir = base.join("snap");
    let before: Entries;
    {
        let db = Database::open("snap", &dir)?;
        db.add_topic("/counted", "int64")?;
        db.append(&7i64.to_le_bytes(), "/counted")?;
        db.snapshot()?;
        before = db.retrieve(None)?;
    }
    assert!(!dir.join("wal.log").exists(), "snapshot truncates the WAL");
    assert!(dir.join("database").exists());

    // opening the snapshot produces the same logical state, repeatedly
    for _ in 0..2 {
        let db = Database::open("snap", &dir)?;
        assert_eq!(db.retrieve(None)?, before);
        assert_eq!(db.schema_of("/counted")?.unwrap().to_string(), "int64");
    }
    Ok(())
}

fn range_retrieval(base: &Path) -> FossilResult<()> {
    info!("since/before/between boundary behavior");
    let db = Database::open("ranges", base.join("ranges"))?;
    for data in [b"a", b"b", b"c", b"d"] {
        db.append(data, "/r")?;
    }
    let all = db.retrieve(None)?;
    let (t1, t2) = (all[1].time, all[2].time);

    let since = db.retrieve(Some(&TimeRange::since(t1, all[3].time)))?;
    assert_eq!(since.first().unwrap().data, b"b");

    let before = db.retrieve(Some(&TimeRange::before(t2)))?;
    assert_eq!(before.last().unwrap().data, b"c");

    let between = db.retrieve(Some(&TimeRange::between(t1, t2)))?;
    assert_eq!(between.len(), 2);
    assert_eq!(between[0].data, b"b");
    assert_eq!(between[1].data, b"c");
    Ok(())
}
