//! On-disk format versioning and forward migration.
//!
//! A database directory carries its format version in `metadata` (4
//! little-endian bytes). Version 0 is a pre-snapshot database living in the
//! WAL only; version 1 serialized the aggregate without a version prefix;
//! the current version prefixes the snapshot with the same 4-byte code that
//! is written to `metadata`.

use super::segment::Segment;
use crate::{FossilError, FossilResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Current on-disk format version.
pub const FOSSIL_DB_VERSION: u32 = 2;

pub(crate) const METADATA_FILE: &str = "metadata";
pub(crate) const DATABASE_FILE: &str = "database";
pub(crate) const BACKUP_FILE: &str = "database.bak";

/// The serialized form of the database aggregate.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedDatabase {
    pub version: u32,
    pub name: String,
    pub segments: Vec<Segment>,
    pub current: usize,
    pub topic_lookup: Vec<String>,
    pub schema_lookup: Vec<String>,
    pub topics: HashMap<String, u32>,
}

/// Determines the on-disk version of a database directory.
pub fn detect_version(dir: &Path) -> FossilResult<u32> {
    let metadata = dir.join(METADATA_FILE);
    if metadata.exists() {
        let mut file = std::fs::File::open(metadata)?;
        return Ok(file.read_u32::<LittleEndian>()?);
    }
    if dir.join(DATABASE_FILE).exists() {
        return Ok(1);
    }
    Ok(0)
}

/// Loads a current-version snapshot: 4-byte LE version prefix, then JSON.
pub(crate) fn load_current(dir: &Path) -> FossilResult<PersistedDatabase> {
    let mut file = std::fs::File::open(dir.join(DATABASE_FILE))?;
    let version = file.read_u32::<LittleEndian>()?;
    if version != FOSSIL_DB_VERSION {
        return Err(FossilError::Migration(format!(
            "snapshot carries version {version}, expected {FOSSIL_DB_VERSION}"
        )));
    }
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Atomically serializes a snapshot: write `database.bak`, rename it over
/// `database`, then record the version in `metadata`. The rename is the
/// atomicity boundary; a crash before it leaves the previous snapshot
/// intact.
pub(crate) fn store_current(dir: &Path, state: &PersistedDatabase) -> FossilResult<()> {
    let backup = dir.join(BACKUP_FILE);
    {
        let mut file = std::fs::File::create(&backup)?;
        file.write_u32::<LittleEndian>(FOSSIL_DB_VERSION)?;
        serde_json::to_writer(&mut file, state)?;
        file.sync_all()?;
    }
    std::fs::rename(&backup, dir.join(DATABASE_FILE))?;
    let mut metadata = std::fs::File::create(dir.join(METADATA_FILE))?;
    metadata.write_u32::<LittleEndian>(FOSSIL_DB_VERSION)?;
    metadata.sync_all()?;
    Ok(())
}

// One step of the migration chain, indexed by source version.
struct MigrationStep {
    from: u32,
    deserialize: fn(&Path) -> FossilResult<PersistedDatabase>,
    migrate: fn(PersistedDatabase) -> FossilResult<PersistedDatabase>,
    cleanup: fn(&Path) -> FossilResult<()>,
}

fn registry() -> Vec<MigrationStep> {
    vec![MigrationStep {
        from: 1,
        deserialize: deserialize_v1,
        migrate: migrate_v1,
        cleanup: cleanup_v1,
    }]
}

/// Runs the migration chain from `from` up to [`FOSSIL_DB_VERSION`].
///
/// Each step must succeed before the next runs; the final structure is
/// serialized and the per-version cleanups run afterwards. On failure the
/// original database files are left untouched.
pub(crate) fn migrate(dir: &Path, from: u32) -> FossilResult<()> {
    debug!("migrating {dir:?} from version {from} to {FOSSIL_DB_VERSION}");
    let steps = registry();
    let mut version = from;
    let mut state: Option<PersistedDatabase> = None;
    let mut cleanups: Vec<fn(&Path) -> FossilResult<()>> = Vec::new();
    while version < FOSSIL_DB_VERSION {
        let step = steps.iter().find(|s| s.from == version).ok_or_else(|| {
            FossilError::Migration(format!("no migration registered for version {version}"))
        })?;
        let current = match state.take() {
            Some(state) => state,
            None => (step.deserialize)(dir)?,
        };
        state = Some((step.migrate)(current)?);
        cleanups.push(step.cleanup);
        version += 1;
    }
    if let Some(state) = state {
        store_current(dir, &state)?;
        for cleanup in cleanups {
            cleanup(dir)?;
        }
    }
    Ok(())
}

// v1 stored the JSON aggregate without a version prefix and kept no
// metadata file.
fn deserialize_v1(dir: &Path) -> FossilResult<PersistedDatabase> {
    let buf = std::fs::read(dir.join(DATABASE_FILE))?;
    let mut state: PersistedDatabase = serde_json::from_slice(&buf)
        .map_err(|e| FossilError::Migration(format!("version 1 snapshot unreadable: {e}")))?;
    state.version = 1;
    Ok(state)
}

fn migrate_v1(mut state: PersistedDatabase) -> FossilResult<PersistedDatabase> {
    state.version = 2;
    Ok(state)
}

fn cleanup_v1(_dir: &Path) -> FossilResult<()> {
    // the rename in store_current already replaced the unprefixed snapshot
    Ok(())
}
