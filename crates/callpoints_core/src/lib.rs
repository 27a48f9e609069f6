//! Persistence and points-aggregation core for emergency call responses.
//!
//! Categories own their responses; manual credits and the reset marker live
//! in settings. Every mutation goes through `ResponseStore`, and points and
//! CSV export are computed fresh from storage on each call.

pub mod clock;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod points;
pub mod repo;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LoggingConfig, StoreConfig};
pub use export::csv::{ExportError, DEFAULT_CSV_DATE_FORMAT};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::emergency::{
    Emergency, EmergencyId, EmergencyValidationError, Response, ResponseDraft, ResponseId,
};
pub use model::points::{ManualPointEntry, Points};
pub use points::PeriodWindows;
pub use repo::emergency_repo::{RepoError, RepoResult};
pub use store::{ResponseStore, StoreError, StoreResult};
