//! Transactional response store.
//!
//! # Responsibility
//! - Expose every emergency/response/settings mutation as one SQLite
//!   transaction behind a single lock.
//! - Answer points and export queries from fresh reads.
//! - Map repository failures to caller-facing error kinds.
//!
//! # Invariants
//! - A failed operation leaves storage untouched (the transaction is dropped
//!   uncommitted).
//! - Settings are re-read on every call, never cached in memory.
//! - Only this type mutates entities; points and export are read-only.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, StoreConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::export::csv::{export_csv_file, write_csv, CsvFormat, CsvSnapshot, ExportError};
use crate::model::emergency::{
    stored_precision, Emergency, EmergencyId, Response, ResponseDraft, ResponseId,
};
use crate::model::points::{ManualPointEntry, Points};
use crate::points::{dataset_points, emergency_points, rank_by_current_month, PeriodWindows};
use crate::repo::emergency_repo::{
    EmergencyRepository, RepoError, RepoResult, SqliteEmergencyRepository,
};
use crate::repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Caller-facing failure kinds.
///
/// Every kind implies the operation had no effect.
#[derive(Debug)]
pub enum StoreError {
    /// Category name collides with an existing one (case-sensitive).
    AlreadyExists(String),
    ReadFailed(RepoError),
    WriteFailed(RepoError),
    ClearFailed(RepoError),
    ExportFailed(ExportError),
    /// Store construction was given unusable settings.
    InvalidConfig(ConfigError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists(kind) => write!(f, "emergency type `{kind}` already exists"),
            Self::ReadFailed(err) => write!(f, "read failed: {err}"),
            Self::WriteFailed(err) => write!(f, "write failed: {err}"),
            Self::ClearFailed(err) => write!(f, "clear failed: {err}"),
            Self::ExportFailed(err) => write!(f, "export failed: {err}"),
            Self::InvalidConfig(err) => write!(f, "invalid store config: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyExists(_) => None,
            Self::ReadFailed(err) | Self::WriteFailed(err) | Self::ClearFailed(err) => Some(err),
            Self::ExportFailed(err) => Some(err),
            Self::InvalidConfig(err) => Some(err),
        }
    }
}

impl StoreError {
    /// Short stable code for logs and caller-side message lookup.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "already_exists",
            Self::ReadFailed(_) => "read_failed",
            Self::WriteFailed(_) => "write_failed",
            Self::ClearFailed(_) => "clear_failed",
            Self::ExportFailed(_) => "export_failed",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
    Clear,
}

impl Access {
    fn behavior(self) -> TransactionBehavior {
        match self {
            Self::Read => TransactionBehavior::Deferred,
            Self::Write | Self::Clear => TransactionBehavior::Immediate,
        }
    }

    fn fail(self, err: RepoError) -> StoreError {
        match (self, err) {
            (_, RepoError::DuplicateType(kind)) => StoreError::AlreadyExists(kind),
            (Self::Read, err) => StoreError::ReadFailed(err),
            (Self::Write, err) => StoreError::WriteFailed(err),
            (Self::Clear, err) => StoreError::ClearFailed(err),
        }
    }
}

/// Durable store for emergencies, responses, manual credits and the reset
/// marker.
///
/// Build one per process and hand out references; all calls are serialized
/// on an internal lock.
pub struct ResponseStore<C: Clock = SystemClock> {
    conn: Mutex<Connection>,
    clock: C,
    config: StoreConfig,
    offset: FixedOffset,
}

impl ResponseStore<SystemClock> {
    /// Opens (or creates) the store database at `path`.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let conn = open_db(path).map_err(db_open_failed)?;
        Self::from_connection(conn, config, SystemClock)
    }
}

impl<C: Clock> ResponseStore<C> {
    /// Opens a private in-memory store.
    pub fn open_in_memory(config: StoreConfig, clock: C) -> StoreResult<Self> {
        let conn = open_db_in_memory().map_err(db_open_failed)?;
        Self::from_connection(conn, config, clock)
    }

    /// Wraps an already migrated connection (see `db::open_db`).
    pub fn from_connection(conn: Connection, config: StoreConfig, clock: C) -> StoreResult<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;
        let offset = config.utc_offset().map_err(StoreError::InvalidConfig)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            config,
            offset,
        })
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Lists all categories, busiest current month first.
    ///
    /// Ties keep insertion order. Points are recomputed for every category.
    pub fn list_emergencies(&self) -> StoreResult<Vec<Emergency>> {
        let ranked = self.run("list_emergencies", Access::Read, |tx| {
            let windows = self.windows(tx)?;
            let emergencies = SqliteEmergencyRepository::new(tx).list_emergencies()?;
            Ok(rank_by_current_month(emergencies, &windows))
        })?;
        Ok(ranked.into_iter().map(|(emergency, _)| emergency).collect())
    }

    /// Lists categories with their points, in the same order as
    /// `list_emergencies`.
    pub fn list_emergency_points(&self) -> StoreResult<Vec<(Emergency, Points)>> {
        self.run("list_emergency_points", Access::Read, |tx| {
            let windows = self.windows(tx)?;
            let emergencies = SqliteEmergencyRepository::new(tx).list_emergencies()?;
            Ok(rank_by_current_month(emergencies, &windows))
        })
    }

    pub fn get_emergency(&self, id: EmergencyId) -> StoreResult<Option<Emergency>> {
        self.run("get_emergency", Access::Read, |tx| {
            SqliteEmergencyRepository::new(tx).get_emergency(id)
        })
    }

    /// Creates a category, optionally seeded with responses.
    ///
    /// # Errors
    /// - `AlreadyExists` when `kind` matches an existing category exactly.
    /// - `WriteFailed` for an empty name or storage faults.
    pub fn add_emergency(
        &self,
        kind: &str,
        responses: Vec<ResponseDraft>,
    ) -> StoreResult<Emergency> {
        let mut emergency = Emergency::new(kind);
        emergency.responses = responses.into_iter().map(Response::from_draft).collect();

        self.run("add_emergency", Access::Write, |tx| {
            SqliteEmergencyRepository::new(tx).insert_emergency(&emergency)
        })?;
        Ok(emergency)
    }

    /// Renames a category in place.
    ///
    /// # Errors
    /// - `AlreadyExists` when another category already uses `new_name`.
    /// - `WriteFailed` for an empty name, a missing category or storage faults.
    pub fn rename_emergency(&self, id: EmergencyId, new_name: &str) -> StoreResult<()> {
        self.run("rename_emergency", Access::Write, |tx| {
            SqliteEmergencyRepository::new(tx).rename_emergency(id, new_name)
        })
    }

    /// Deletes a category and every response it owns.
    pub fn delete_emergency(&self, id: EmergencyId) -> StoreResult<()> {
        self.run("delete_emergency", Access::Clear, |tx| {
            SqliteEmergencyRepository::new(tx).delete_emergency(id)
        })
    }

    /// Appends a response to the end of `to`'s sequence.
    pub fn add_response(&self, draft: ResponseDraft, to: EmergencyId) -> StoreResult<Response> {
        let response = Response::from_draft(draft);
        self.run("add_response", Access::Write, |tx| {
            SqliteEmergencyRepository::new(tx).insert_response(to, &response)
        })?;
        Ok(response)
    }

    /// Detaches and deletes a response. No-op when `from` does not own it.
    pub fn remove_response(&self, response: ResponseId, from: EmergencyId) -> StoreResult<()> {
        let removed = self.run("remove_response", Access::Clear, |tx| {
            SqliteEmergencyRepository::new(tx).delete_response(from, response)
        })?;
        if !removed {
            info!("event=remove_response module=store status=noop reason=not_owned");
        }
        Ok(())
    }

    /// Overwrites incident number, details and date, keeping identity.
    pub fn update_response(
        &self,
        response: ResponseId,
        values: ResponseDraft,
    ) -> StoreResult<Response> {
        self.run("update_response", Access::Write, |tx| {
            let repo = SqliteEmergencyRepository::new(tx);
            let mut current = repo
                .get_response(response)?
                .ok_or(RepoError::NotFound(response))?;
            current.apply(values);
            repo.update_response(&current)?;
            Ok(current)
        })
    }

    /// Most recently added response across all categories.
    pub fn last_response(&self) -> StoreResult<Option<Response>> {
        self.run("last_response", Access::Read, |tx| {
            SqliteEmergencyRepository::new(tx).last_response()
        })
    }

    /// Records a manual credit dated now. Entries are never merged.
    pub fn add_manual_points(&self, points: u32) -> StoreResult<ManualPointEntry> {
        let entry = ManualPointEntry {
            date_added: self.now(),
            points,
        };
        self.run("add_manual_points", Access::Write, |tx| {
            let settings = SqliteSettingsRepository::new(tx);
            let mut entries = settings.manual_point_entries()?;
            entries.push(entry);
            settings.replace_manual_point_entries(&entries)
        })?;
        Ok(entry)
    }

    /// Drops manual credits and moves the reset marker to now.
    ///
    /// Responses stay in storage; windows simply stop counting older ones.
    pub fn clear_points(&self) -> StoreResult<()> {
        let now = self.now();
        self.run("clear_points", Access::Clear, |tx| {
            let settings = SqliteSettingsRepository::new(tx);
            settings.replace_manual_point_entries(&[])?;
            settings.set_last_reset(now)
        })
    }

    /// Removes every category, response and manual credit, and moves the
    /// reset marker to now.
    pub fn clear_all_data(&self) -> StoreResult<()> {
        let now = self.now();
        self.run("clear_all_data", Access::Clear, |tx| {
            SqliteEmergencyRepository::new(tx).delete_all()?;
            let settings = SqliteSettingsRepository::new(tx);
            settings.replace_manual_point_entries(&[])?;
            settings.set_last_reset(now)
        })
    }

    pub fn last_reset(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.run("last_reset", Access::Read, |tx| {
            SqliteSettingsRepository::new(tx).last_reset()
        })
    }

    pub fn manual_point_entries(&self) -> StoreResult<Vec<ManualPointEntry>> {
        self.run("manual_point_entries", Access::Read, |tx| {
            SqliteSettingsRepository::new(tx).manual_point_entries()
        })
    }

    /// Points for one category's own responses.
    ///
    /// `previous_month` is always 0 at this level.
    pub fn emergency_points(&self, id: EmergencyId) -> StoreResult<Points> {
        self.run("emergency_points", Access::Read, |tx| {
            let windows = self.windows(tx)?;
            let emergency = SqliteEmergencyRepository::new(tx)
                .get_emergency(id)?
                .ok_or(RepoError::NotFound(id))?;
            Ok(emergency_points(&emergency, &windows))
        })
    }

    /// Points across all responses plus manual credits.
    pub fn dataset_points(&self) -> StoreResult<Points> {
        self.run("dataset_points", Access::Read, |tx| {
            let windows = self.windows(tx)?;
            let emergencies = SqliteEmergencyRepository::new(tx).list_emergencies()?;
            let manual = SqliteSettingsRepository::new(tx).manual_point_entries()?;
            Ok(dataset_points(&emergencies, &manual, &windows))
        })
    }

    /// Writes the CSV export to `path`, atomically replacing it.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let snapshot = self.csv_snapshot()?;
        export_csv_file(path.as_ref(), &snapshot, &self.csv_format())
            .map_err(export_failed)
    }

    /// Streams the CSV export into `writer` and hands it back.
    pub fn export_csv_to_writer<W: Write>(&self, writer: W) -> StoreResult<W> {
        let snapshot = self.csv_snapshot()?;
        write_csv(writer, &snapshot, &self.csv_format()).map_err(export_failed)
    }

    fn csv_snapshot(&self) -> StoreResult<CsvSnapshot> {
        self.run("csv_snapshot", Access::Read, |tx| {
            let windows = self.windows(tx)?;
            let emergencies = SqliteEmergencyRepository::new(tx).list_emergencies()?;
            let settings = SqliteSettingsRepository::new(tx);
            Ok(CsvSnapshot {
                emergencies: rank_by_current_month(emergencies, &windows)
                    .into_iter()
                    .map(|(emergency, _)| emergency)
                    .collect(),
                manual_entries: settings.manual_point_entries()?,
                last_reset: windows.floor,
            })
        })
    }

    fn csv_format(&self) -> CsvFormat<'_> {
        CsvFormat {
            date_format: &self.config.csv_date_format,
            offset: self.offset,
        }
    }

    fn windows(&self, conn: &Connection) -> RepoResult<PeriodWindows> {
        let last_reset = SqliteSettingsRepository::new(conn).last_reset()?;
        Ok(PeriodWindows::resolve(
            self.clock.now(),
            last_reset,
            self.offset,
        ))
    }

    fn now(&self) -> DateTime<Utc> {
        stored_precision(self.clock.now())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic inside `run` drops its transaction uncommitted, so the
        // connection behind a poisoned lock is still consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T>(
        &self,
        operation: &'static str,
        access: Access,
        body: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let mut conn = self.lock();
        match in_transaction(&mut conn, access.behavior(), body) {
            Ok(value) => {
                if matches!(access, Access::Read) {
                    debug!(
                        "event={operation} module=store status=ok duration_ms={}",
                        started_at.elapsed().as_millis()
                    );
                } else {
                    info!(
                        "event={operation} module=store status=ok duration_ms={}",
                        started_at.elapsed().as_millis()
                    );
                }
                Ok(value)
            }
            Err(err) => {
                let failure = access.fail(err);
                error!(
                    "event={operation} module=store status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    failure.code(),
                    failure
                );
                Err(failure)
            }
        }
    }
}

fn in_transaction<T>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    body: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    let tx = conn.transaction_with_behavior(behavior)?;
    let value = body(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn export_failed(err: ExportError) -> StoreError {
    error!("event=csv_export module=store status=error error={err}");
    StoreError::ExportFailed(err)
}

fn db_open_failed(err: DbError) -> StoreError {
    StoreError::ReadFailed(RepoError::Db(err))
}
