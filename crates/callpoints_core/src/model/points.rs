//! Point credit records and derived totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Out-of-band point credit not tied to any response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPointEntry {
    pub date_added: DateTime<Utc>,
    pub points: u32,
}

/// Period totals snapshot. Recomputed for every query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Points {
    pub current_month: u64,
    pub current_year: u64,
    pub previous_month: u64,
    pub all: u64,
}
