//! Persisted scalar settings: reset marker and manual point entries.
//!
//! # Invariants
//! - Settings are read from storage on every call; nothing is cached.
//! - The manual entries document carries an explicit schema version and
//!   unknown versions are rejected rather than guessed at.

use crate::model::points::ManualPointEntry;
use crate::repo::emergency_repo::{millis_to_datetime, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const LAST_RESET_KEY: &str = "last_reset_ms";
const MANUAL_ENTRIES_KEY: &str = "manual_point_entries";
const MANUAL_ENTRIES_VERSION: u32 = 1;

/// Repository interface for store-wide settings.
pub trait SettingsRepository {
    /// `None` when points were never reset.
    fn last_reset(&self) -> RepoResult<Option<DateTime<Utc>>>;
    fn set_last_reset(&self, at: DateTime<Utc>) -> RepoResult<()>;
    /// Manual entries in the order they were added.
    fn manual_point_entries(&self) -> RepoResult<Vec<ManualPointEntry>>;
    fn replace_manual_point_entries(&self, entries: &[ManualPointEntry]) -> RepoResult<()>;
}

/// SQLite-backed settings repository over the `settings` key/value table.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_value(&self, key: &str, value: &str) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn last_reset(&self) -> RepoResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.get_value(LAST_RESET_KEY)? else {
            return Ok(None);
        };
        let millis = raw.parse::<i64>().map_err(|_| {
            RepoError::InvalidData(format!("invalid {LAST_RESET_KEY} setting `{raw}`"))
        })?;
        millis_to_datetime(millis, LAST_RESET_KEY).map(Some)
    }

    fn set_last_reset(&self, at: DateTime<Utc>) -> RepoResult<()> {
        self.put_value(LAST_RESET_KEY, &at.timestamp_millis().to_string())
    }

    fn manual_point_entries(&self) -> RepoResult<Vec<ManualPointEntry>> {
        match self.get_value(MANUAL_ENTRIES_KEY)? {
            Some(raw) => decode_manual_entries(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn replace_manual_point_entries(&self, entries: &[ManualPointEntry]) -> RepoResult<()> {
        let encoded = encode_manual_entries(entries)?;
        self.put_value(MANUAL_ENTRIES_KEY, &encoded)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManualEntriesDocument {
    version: u32,
    entries: Vec<StoredManualEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredManualEntry {
    date_added_ms: i64,
    points: u32,
}

fn encode_manual_entries(entries: &[ManualPointEntry]) -> RepoResult<String> {
    let document = ManualEntriesDocument {
        version: MANUAL_ENTRIES_VERSION,
        entries: entries
            .iter()
            .map(|entry| StoredManualEntry {
                date_added_ms: entry.date_added.timestamp_millis(),
                points: entry.points,
            })
            .collect(),
    };
    serde_json::to_string(&document)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode manual entries: {err}")))
}

fn decode_manual_entries(raw: &str) -> RepoResult<Vec<ManualPointEntry>> {
    let document: ManualEntriesDocument = serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("malformed manual entries: {err}")))?;
    if document.version != MANUAL_ENTRIES_VERSION {
        return Err(RepoError::InvalidData(format!(
            "unsupported manual entries version {}",
            document.version
        )));
    }

    document
        .entries
        .into_iter()
        .map(|entry| -> RepoResult<ManualPointEntry> {
            Ok(ManualPointEntry {
                date_added: millis_to_datetime(entry.date_added_ms, MANUAL_ENTRIES_KEY)?,
                points: entry.points,
            })
        })
        .collect()
}
