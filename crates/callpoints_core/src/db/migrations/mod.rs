//! Ordered schema scripts for the store database.
//!
//! The schema version lives in `PRAGMA user_version`. Opening a file runs
//! every script above that version inside one transaction, so a half-applied
//! upgrade is never left behind.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// Schema scripts, oldest first. Versions start at 1 and increase by one.
const SCRIPTS: &[(u32, &str)] = &[
    (1, include_str!("0001_emergencies.sql")),
    (2, include_str!("0002_settings.sql")),
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    SCRIPTS.last().map_or(0, |(version, _)| *version)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file is ahead of this build.
/// - `Migration` naming the script that failed; the whole batch rolls back.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }
    if from_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, script) in SCRIPTS.iter().filter(|(version, _)| *version > from_version) {
        tx.execute_batch(script)
            .and_then(|()| tx.pragma_update(None, "user_version", version))
            .map_err(|source| DbError::Migration {
                version: *version,
                source,
            })?;
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}
