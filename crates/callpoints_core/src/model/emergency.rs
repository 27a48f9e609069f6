//! Emergency category and response records.
//!
//! # Responsibility
//! - Define the category record (`Emergency`) and its owned `Response` list.
//! - Provide the input shape (`ResponseDraft`) for create/update paths.
//!
//! # Invariants
//! - `Emergency::kind` is non-empty and unique (case-sensitive) across the store.
//! - `responses` keeps entry order, which is not necessarily date order.
//! - A response belongs to exactly one emergency for its whole lifetime.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an emergency category.
pub type EmergencyId = Uuid;

/// Stable identifier for a recorded response.
pub type ResponseId = Uuid;

/// One recorded incident response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Store-assigned identity, unchanged by edits.
    pub id: ResponseId,
    pub incident_number: String,
    pub details: String,
    /// Moment the incident happened (not when it was entered).
    pub date: DateTime<Utc>,
}

impl Response {
    /// Builds a response from draft values under a fresh identity.
    pub fn from_draft(draft: ResponseDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_number: draft.incident_number,
            details: draft.details,
            date: stored_precision(draft.date),
        }
    }

    /// Overwrites every editable field, keeping identity.
    pub fn apply(&mut self, draft: ResponseDraft) {
        self.incident_number = draft.incident_number;
        self.details = draft.details;
        self.date = stored_precision(draft.date);
    }
}

/// Caller-supplied field values for a new or edited response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDraft {
    pub incident_number: String,
    pub details: String,
    pub date: DateTime<Utc>,
}

impl ResponseDraft {
    pub fn new(
        incident_number: impl Into<String>,
        details: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            incident_number: incident_number.into(),
            details: details.into(),
            date,
        }
    }
}

/// A named class of call ("Fire", "Medical", ...) and its responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emergency {
    pub id: EmergencyId,
    /// Serialized as `type` to match the category naming used by callers.
    #[serde(rename = "type")]
    pub kind: String,
    /// Entry order.
    pub responses: Vec<Response>,
}

impl Emergency {
    /// Creates an empty category with a generated stable ID.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            responses: Vec::new(),
        }
    }

    /// Validates the category name.
    ///
    /// # Errors
    /// - `EmptyType` when the name is empty or whitespace only.
    pub fn validate(&self) -> Result<(), EmergencyValidationError> {
        validate_emergency_type(&self.kind)
    }
}

/// Truncates a timestamp to the millisecond resolution kept in storage.
///
/// Every instant entering the store passes through here so values handed
/// back to callers equal what later reads return.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Checks a category name before it is written.
pub fn validate_emergency_type(kind: &str) -> Result<(), EmergencyValidationError> {
    if kind.trim().is_empty() {
        return Err(EmergencyValidationError::EmptyType);
    }
    Ok(())
}

/// Invariant violations detectable without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyValidationError {
    EmptyType,
}

impl Display for EmergencyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyType => write!(f, "emergency type cannot be empty"),
        }
    }
}

impl Error for EmergencyValidationError {}
