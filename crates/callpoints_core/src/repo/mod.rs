//! Repository layer over the SQLite schema.
//!
//! # Responsibility
//! - Own every SQL statement touching emergencies, responses and settings.
//! - Translate rows to model values and reject corrupt persisted state.
//!
//! # Invariants
//! - Repositories never open transactions themselves; callers hand them a
//!   `Transaction` (which derefs to `Connection`) so one store operation maps
//!   to exactly one commit.

pub mod emergency_repo;
pub mod settings_repo;
