
use fossil::{Database, FossilResult, FOSSIL_DB_VERSION, SEGMENT_SIZE};
use log::info;

// The segment-overflow and snapshot scenario: after SEGMENT_SIZE + 1
// appends a fresh database holds exactly two segments of sizes
// SEGMENT_SIZE and 1, the WAL is gone (a snapshot ran) and `metadata`
// carries the current version bytes.
//
// cargo test test_020_segments -- --nocapture
#[test]
fn test_020_segments() -> FossilResult<()> {
    let _log_handle = test_utils::init_logger();
    let start = std::time::Instant::now();
    let base = tempfile::tempdir()?;
    let dir = base.path().join("overflow");

    info!("appending {} entries", SEGMENT_SIZE + 1);
    let db = Database::open("overflow", &dir)?;
    for i in 0..=SEGMENT_SIZE {
        db.append(format!("m{i}").as_bytes(), "/m")?;
    }

    assert_eq!(db.segment_sizes()?, vec![SEGMENT_SIZE, 1]);
    assert!(!dir.join("wal.log").exists(), "the snapshot deleted the WAL");
    assert!(!dir.join("database.bak").exists());
    let metadata = std::fs::read(dir.join("metadata"))?;
    assert_eq!(metadata, FOSSIL_DB_VERSION.to_le_bytes());

    // appends after the snapshot go to a fresh WAL
    db.append(b"after", "/m")?;
    assert!(dir.join("wal.log").exists());

    info!("re-opening and comparing logical state");
    drop(db);
    let db = Database::open("overflow", &dir)?;
    let entries = db.retrieve(None)?;
    assert_eq!(entries.len(), SEGMENT_SIZE + 2);
    assert_eq!(entries[0].data, b"m0");
    assert_eq!(entries[SEGMENT_SIZE].data, format!("m{SEGMENT_SIZE}").as_bytes());
    assert_eq!(entries[SEGMENT_SIZE + 1].data, b"after");

    info!("range retrieval across the segment boundary");
    let straddle = db.retrieve(Some(&fossil::TimeRange::since(
        entries[SEGMENT_SIZE - 1].time,
        entries[SEGMENT_SIZE + 1].time,
    )))?;
    assert_eq!(straddle.len(), 3);
    assert_eq!(straddle[0].data, format!("m{}", SEGMENT_SIZE - 1).as_bytes());
    assert_eq!(straddle[2].data, b"after");

    test_utils::closing_info(start);
    Ok(())
}
