
use fossil::{detect_version, Database, FossilResult, FOSSIL_DB_VERSION};
use log::info;
use std::path::Path;

// Crash recovery and forward migration: corrupt WAL records, stale
// snapshot backups, and old on-disk formats.
//
// cargo test test_050_recovery -- --nocapture
#[test]
fn test_050_recovery() -> FossilResult<()> {
    let _log_handle = test_utils::init_logger();
    let start = std::time::Instant::now();
    let base = tempfile::tempdir()?;

    corrupt_wal_records_are_skipped(base.path())?;
    stale_backup_is_discarded(base.path())?;
    v1_database_migrates_forward(base.path())?;

    test_utils::closing_info(start);
    Ok(())
}

// A truncated or garbled WAL line loses that record and nothing else.
fn corrupt_wal_records_are_skipped(base: &Path) -> FossilResult<()> {
    info!("corrupt WAL record");
    let dir = base.join("corrupt");
    {
        let db = Database::open("corrupt", &dir)?;
        db.append(b"kept-1", "/t")?;
        db.append(b"lost", "/t")?;
        db.append(b"kept-2", "/t")?;
    }

    // garble the second event record (skipping the bootstrap topic and
    // segment records)
    let wal_path = dir.join("wal.log");
    let contents = std::fs::read_to_string(&wal_path)?;
    let mut lines: Vec<String> = contents.lines().map(ToString::to_string).collect();
    assert_eq!(lines.len(), 6, "topic, segment, topic, three events");
    lines[4] = "0;!!!not-base64!!!".to_string();
    std::fs::write(&wal_path, lines.join("\n") + "\n")?;

    let db = Database::open("corrupt", &dir)?;
    let entries = db.retrieve(None)?;
    let data: Vec<&[u8]> = entries.iter().map(|e| e.data.as_slice()).collect();
    assert_eq!(data, vec![b"kept-1".as_slice(), b"kept-2".as_slice()]);
    Ok(())
}

// database.bak without a completed rename is a crashed snapshot; open
// discards it and recovers from the previous snapshot plus the WAL.
fn stale_backup_is_discarded(base: &Path) -> FossilResult<()> {
    info!("stale snapshot backup");
    let dir = base.join("bak");
    {
        let db = Database::open("bak", &dir)?;
        db.append(b"before-crash", "/t")?;
    }
    std::fs::write(dir.join("database.bak"), b"half-written garbage")?;

    let db = Database::open("bak", &dir)?;
    assert!(!dir.join("database.bak").exists());
    let entries = db.retrieve(None)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, b"before-crash");
    Ok(())
}

// A version 1 directory (unprefixed snapshot, no metadata file) is
// migrated forward on open; the logical state survives and the current
// version is recorded.
fn v1_database_migrates_forward(base: &Path) -> FossilResult<()> {
    info!("v1 migration");
    let dir = base.join("v1");
    {
        let db = Database::open("v1", &dir)?;
        db.add_topic("/m", "{\"x\": int32, \"y\": int32,}")?;
        db.append(b"payload", "/t")?;
        db.snapshot()?;
    }

    // rewrite the directory as version 1: strip the 4-byte version prefix
    // from the snapshot and drop the metadata file
    let snapshot = std::fs::read(dir.join("database"))?;
    std::fs::write(dir.join("database"), &snapshot[4..])?;
    std::fs::remove_file(dir.join("metadata"))?;
    assert_eq!(detect_version(&dir)?, 1);

    let db = Database::open("v1", &dir)?;
    assert_eq!(detect_version(&dir)?, FOSSIL_DB_VERSION);
    let entries = db.retrieve(None)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, b"payload");
    assert_eq!(
        db.schema_of("/m")?.unwrap().to_string(),
        "{\"x\": int32,\"y\": int32,}"
    );
    Ok(())
}
