//! Entity model for emergency categories, responses and point credits.
//!
//! # Responsibility
//! - Define plain value types owned and mutated only through the store.
//! - Keep field-level invariants close to the data they guard.
//!
//! # Invariants
//! - Every emergency and response is identified by a store-assigned UUID.
//! - `Points` is derived on demand and never persisted.

pub mod emergency;
pub mod points;
