//! Emergency/response repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over `emergencies` and `responses`.
//! - Keep category and response ordering rules inside the persistence boundary.
//!
//! # Invariants
//! - Category names are unique, compared case-sensitively.
//! - Listing order is insertion order (`seq ASC`) for both tables.
//! - Deleting a category removes all of its responses.

use crate::db::DbError;
use crate::model::emergency::{
    validate_emergency_type, Emergency, EmergencyId, EmergencyValidationError, Response,
    ResponseId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RESPONSE_SELECT_SQL: &str = "SELECT
    uuid,
    emergency_uuid,
    incident_number,
    details,
    date_ms
FROM responses";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for store persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(EmergencyValidationError),
    Db(DbError),
    /// Another category already uses this exact name.
    DuplicateType(String),
    NotFound(Uuid),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::DuplicateType(kind) => write!(f, "emergency type already exists: `{kind}`"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::DuplicateType(_) | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<EmergencyValidationError> for RepoError {
    fn from(value: EmergencyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for emergency categories and their responses.
pub trait EmergencyRepository {
    /// Inserts a category together with its initial responses.
    fn insert_emergency(&self, emergency: &Emergency) -> RepoResult<()>;
    fn rename_emergency(&self, id: EmergencyId, new_kind: &str) -> RepoResult<()>;
    /// Deletes a category; responses go with it.
    fn delete_emergency(&self, id: EmergencyId) -> RepoResult<()>;
    fn get_emergency(&self, id: EmergencyId) -> RepoResult<Option<Emergency>>;
    /// Lists all categories in insertion order, responses included.
    fn list_emergencies(&self) -> RepoResult<Vec<Emergency>>;
    /// Appends a response to the end of a category's sequence.
    fn insert_response(&self, emergency_id: EmergencyId, response: &Response) -> RepoResult<()>;
    fn update_response(&self, response: &Response) -> RepoResult<()>;
    /// Deletes a response owned by `emergency_id`. Returns whether a row went away.
    fn delete_response(&self, emergency_id: EmergencyId, id: ResponseId) -> RepoResult<bool>;
    fn get_response(&self, id: ResponseId) -> RepoResult<Option<Response>>;
    /// Most recently inserted response across every category.
    fn last_response(&self) -> RepoResult<Option<Response>>;
    fn delete_all(&self) -> RepoResult<()>;
}

/// SQLite-backed emergency repository.
pub struct SqliteEmergencyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEmergencyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn type_taken_by_other(&self, kind: &str, except: Option<EmergencyId>) -> RepoResult<bool> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid FROM emergencies WHERE type = ?1;",
                [kind],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match (owner, except) {
            (None, _) => false,
            (Some(owner), Some(except)) => owner != except.to_string(),
            (Some(_), None) => true,
        })
    }

    fn emergency_exists(&self, id: EmergencyId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM emergencies WHERE uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn next_seq(&self, table: &'static str) -> RepoResult<i64> {
        let next = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(seq), 0) + 1 FROM {table};"),
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    fn load_responses(&self, emergency_id: &str) -> RepoResult<Vec<Response>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RESPONSE_SELECT_SQL}
             WHERE emergency_uuid = ?1
             ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([emergency_id])?;
        let mut responses = Vec::new();
        while let Some(row) = rows.next()? {
            responses.push(parse_response_row(row)?);
        }
        Ok(responses)
    }
}

impl EmergencyRepository for SqliteEmergencyRepository<'_> {
    fn insert_emergency(&self, emergency: &Emergency) -> RepoResult<()> {
        emergency.validate()?;
        if self.type_taken_by_other(&emergency.kind, None)? {
            return Err(RepoError::DuplicateType(emergency.kind.clone()));
        }

        let seq = self.next_seq("emergencies")?;
        self.conn.execute(
            "INSERT INTO emergencies (uuid, type, seq) VALUES (?1, ?2, ?3);",
            params![emergency.id.to_string(), emergency.kind.as_str(), seq],
        )?;

        for response in &emergency.responses {
            self.insert_response(emergency.id, response)?;
        }

        Ok(())
    }

    fn rename_emergency(&self, id: EmergencyId, new_kind: &str) -> RepoResult<()> {
        validate_emergency_type(new_kind)?;
        if self.type_taken_by_other(new_kind, Some(id))? {
            return Err(RepoError::DuplicateType(new_kind.to_string()));
        }

        let changed = self.conn.execute(
            "UPDATE emergencies SET type = ?2 WHERE uuid = ?1;",
            params![id.to_string(), new_kind],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn delete_emergency(&self, id: EmergencyId) -> RepoResult<()> {
        let id_text = id.to_string();
        // Connections opened outside `db::open_db` may lack `foreign_keys=ON`.
        self.conn.execute(
            "DELETE FROM responses WHERE emergency_uuid = ?1;",
            [id_text.as_str()],
        )?;
        let changed = self
            .conn
            .execute("DELETE FROM emergencies WHERE uuid = ?1;", [id_text.as_str()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn get_emergency(&self, id: EmergencyId) -> RepoResult<Option<Emergency>> {
        let id_text = id.to_string();
        let kind: Option<String> = self
            .conn
            .query_row(
                "SELECT type FROM emergencies WHERE uuid = ?1;",
                [id_text.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match kind {
            Some(kind) => Ok(Some(Emergency {
                id,
                kind,
                responses: self.load_responses(&id_text)?,
            })),
            None => Ok(None),
        }
    }

    fn list_emergencies(&self) -> RepoResult<Vec<Emergency>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, type FROM emergencies ORDER BY seq ASC;")?;
        let mut rows = stmt.query([])?;
        let mut emergencies = Vec::new();
        let mut index_by_id = HashMap::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            let id = parse_uuid(&uuid_text, "emergencies.uuid")?;
            index_by_id.insert(id, emergencies.len());
            emergencies.push(Emergency {
                id,
                kind: row.get("type")?,
                responses: Vec::new(),
            });
        }

        let mut stmt = self
            .conn
            .prepare(&format!("{RESPONSE_SELECT_SQL} ORDER BY seq ASC;"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let owner_text: String = row.get("emergency_uuid")?;
            let owner = parse_uuid(&owner_text, "responses.emergency_uuid")?;
            let index = index_by_id.get(&owner).copied().ok_or_else(|| {
                RepoError::InvalidData(format!("response references unknown emergency {owner}"))
            })?;
            emergencies[index].responses.push(parse_response_row(row)?);
        }

        Ok(emergencies)
    }

    fn insert_response(&self, emergency_id: EmergencyId, response: &Response) -> RepoResult<()> {
        if !self.emergency_exists(emergency_id)? {
            return Err(RepoError::NotFound(emergency_id));
        }

        let seq = self.next_seq("responses")?;
        self.conn.execute(
            "INSERT INTO responses (
                uuid,
                emergency_uuid,
                incident_number,
                details,
                date_ms,
                seq
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                response.id.to_string(),
                emergency_id.to_string(),
                response.incident_number.as_str(),
                response.details.as_str(),
                response.date.timestamp_millis(),
                seq,
            ],
        )?;

        Ok(())
    }

    fn update_response(&self, response: &Response) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE responses
             SET
                incident_number = ?2,
                details = ?3,
                date_ms = ?4
             WHERE uuid = ?1;",
            params![
                response.id.to_string(),
                response.incident_number.as_str(),
                response.details.as_str(),
                response.date.timestamp_millis(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(response.id));
        }

        Ok(())
    }

    fn delete_response(&self, emergency_id: EmergencyId, id: ResponseId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM responses WHERE uuid = ?1 AND emergency_uuid = ?2;",
            params![id.to_string(), emergency_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn get_response(&self, id: ResponseId) -> RepoResult<Option<Response>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESPONSE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_response_row(row)?));
        }
        Ok(None)
    }

    fn last_response(&self) -> RepoResult<Option<Response>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESPONSE_SELECT_SQL} ORDER BY seq DESC LIMIT 1;"))?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_response_row(row)?));
        }
        Ok(None)
    }

    fn delete_all(&self) -> RepoResult<()> {
        self.conn
            .execute_batch("DELETE FROM responses; DELETE FROM emergencies;")?;
        Ok(())
    }
}

fn parse_response_row(row: &Row<'_>) -> RepoResult<Response> {
    let uuid_text: String = row.get("uuid")?;
    let date_ms: i64 = row.get("date_ms")?;
    Ok(Response {
        id: parse_uuid(&uuid_text, "responses.uuid")?,
        incident_number: row.get("incident_number")?,
        details: row.get("details")?,
        date: millis_to_datetime(date_ms, "responses.date_ms")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

/// Converts stored epoch milliseconds back to a UTC timestamp.
pub(crate) fn millis_to_datetime(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("timestamp `{value}` out of range in {column}"))
    })
}
