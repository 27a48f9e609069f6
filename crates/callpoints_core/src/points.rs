//! Period-bounded point aggregation.
//!
//! # Responsibility
//! - Resolve calendar windows (year, month, previous month) for one instant.
//! - Count responses and manual credits that fall in each window.
//! - Rank categories by current-month activity.
//!
//! # Invariants
//! - Every window start is clamped to the last reset, so nothing older than
//!   the reset is ever counted, `all` included.
//! - Per-category `previous_month` is always reported as 0.
//! - Totals are recomputed from records on every call; nothing is cached.

use crate::model::emergency::{Emergency, Response};
use crate::model::points::{ManualPointEntry, Points};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc};
use std::cmp::Reverse;
use std::ops::AddAssign;

/// Window lower bounds resolved for one instant, already reset-clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindows {
    pub year_start: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
    pub previous_month_start: DateTime<Utc>,
    /// Last reset; bounds `all`.
    pub floor: Option<DateTime<Utc>>,
}

impl PeriodWindows {
    /// Resolves windows for `now` using calendar boundaries in `offset`.
    pub fn resolve(
        now: DateTime<Utc>,
        last_reset: Option<DateTime<Utc>>,
        offset: FixedOffset,
    ) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        let month_first = today.with_day(1).unwrap_or(today);
        let year_first = today.with_ordinal(1).unwrap_or(today);
        let previous_month_first = month_first
            .checked_sub_months(Months::new(1))
            .unwrap_or(month_first);

        let clamp = |start: DateTime<Utc>| match last_reset {
            Some(reset) if reset > start => reset,
            _ => start,
        };

        Self {
            year_start: clamp(local_midnight(year_first, offset)),
            month_start: clamp(local_midnight(month_first, offset)),
            previous_month_start: clamp(local_midnight(previous_month_first, offset)),
            floor: last_reset,
        }
    }

    fn counts_toward_all(&self, at: DateTime<Utc>) -> bool {
        self.floor.map_or(true, |floor| at >= floor)
    }

    /// `previous_month_start <= at < month_start`. Empty once a reset lands
    /// inside the current month.
    fn in_previous_month(&self, at: DateTime<Utc>) -> bool {
        at >= self.previous_month_start && at < self.month_start
    }

    fn tally(&self, at: DateTime<Utc>, amount: u64) -> Points {
        if !self.counts_toward_all(at) {
            return Points::default();
        }
        let within = |start: DateTime<Utc>| if at >= start { amount } else { 0 };
        Points {
            current_month: within(self.month_start),
            current_year: within(self.year_start),
            previous_month: if self.in_previous_month(at) { amount } else { 0 },
            all: amount,
        }
    }
}

impl AddAssign for Points {
    fn add_assign(&mut self, rhs: Self) {
        self.current_month += rhs.current_month;
        self.current_year += rhs.current_year;
        self.previous_month += rhs.previous_month;
        self.all += rhs.all;
    }
}

/// Points for one category, counting only its own responses.
pub fn emergency_points(emergency: &Emergency, windows: &PeriodWindows) -> Points {
    let mut points = tally_responses(&emergency.responses, windows);
    // Not computed per category.
    points.previous_month = 0;
    points
}

/// Points across every category plus manual credits.
pub fn dataset_points<'a>(
    emergencies: impl IntoIterator<Item = &'a Emergency>,
    manual_entries: &[ManualPointEntry],
    windows: &PeriodWindows,
) -> Points {
    let mut points = Points::default();
    for emergency in emergencies {
        points += tally_responses(&emergency.responses, windows);
    }
    for entry in manual_entries {
        points += windows.tally(entry.date_added, u64::from(entry.points));
    }
    points
}

/// Orders categories by descending current-month points.
///
/// The sort is stable, so ties keep the incoming (store) order.
pub fn rank_by_current_month(
    emergencies: Vec<Emergency>,
    windows: &PeriodWindows,
) -> Vec<(Emergency, Points)> {
    let mut ranked: Vec<(Emergency, Points)> = emergencies
        .into_iter()
        .map(|emergency| {
            let points = emergency_points(&emergency, windows);
            (emergency, points)
        })
        .collect();
    ranked.sort_by_key(|(_, points)| Reverse(points.current_month));
    ranked
}

fn tally_responses(responses: &[Response], windows: &PeriodWindows) -> Points {
    let mut points = Points::default();
    for response in responses {
        points += windows.tally(response.date, 1);
    }
    points
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
        - Duration::seconds(i64::from(offset.local_minus_utc()))
}

#[cfg(test)]
mod tests {
    use super::{dataset_points, emergency_points, rank_by_current_month, PeriodWindows};
    use crate::model::emergency::{Emergency, Response, ResponseDraft};
    use crate::model::points::{ManualPointEntry, Points};
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn emergency_with(kind: &str, dates: &[DateTime<Utc>]) -> Emergency {
        let mut emergency = Emergency::new(kind);
        emergency.responses = dates
            .iter()
            .map(|date| Response::from_draft(ResponseDraft::new("n", "d", *date)))
            .collect();
        emergency
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn resolve_handles_january_rollover() {
        let windows = PeriodWindows::resolve(at(2024, 1, 15), None, utc());
        assert_eq!(
            windows.previous_month_start,
            Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            windows.year_start,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(windows.month_start, windows.year_start);
    }

    #[test]
    fn resolve_uses_configured_offset_for_boundaries() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        // 23:30 UTC on Jan 31 is already Feb 1 at +02:00.
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        let windows = PeriodWindows::resolve(now, None, plus_two);
        assert_eq!(
            windows.month_start,
            Utc.with_ymd_and_hms(2024, 1, 31, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn resolve_clamps_every_start_to_reset() {
        let reset = at(2024, 3, 10);
        let windows = PeriodWindows::resolve(at(2024, 3, 20), Some(reset), utc());
        assert_eq!(windows.year_start, reset);
        assert_eq!(windows.month_start, reset);
        assert_eq!(windows.previous_month_start, reset);
    }

    #[test]
    fn category_points_count_windows_and_zero_previous_month() {
        let windows = PeriodWindows::resolve(at(2024, 3, 20), None, utc());
        let fire = emergency_with(
            "Fire",
            &[at(2023, 12, 5), at(2024, 2, 10), at(2024, 3, 1), at(2024, 3, 19)],
        );

        let points = emergency_points(&fire, &windows);
        assert_eq!(
            points,
            Points {
                current_month: 2,
                current_year: 3,
                previous_month: 0,
                all: 4,
            }
        );
    }

    #[test]
    fn dataset_points_include_previous_month_and_manual_sums() {
        let windows = PeriodWindows::resolve(at(2024, 3, 20), None, utc());
        let fire = emergency_with("Fire", &[at(2024, 2, 10), at(2024, 3, 2)]);
        let medical = emergency_with("Medical", &[at(2024, 2, 28)]);
        let manual = [
            ManualPointEntry {
                date_added: at(2024, 2, 1),
                points: 4,
            },
            ManualPointEntry {
                date_added: at(2024, 3, 3),
                points: 5,
            },
        ];

        let points = dataset_points([&fire, &medical], &manual, &windows);
        assert_eq!(points.previous_month, 2 + 4);
        assert_eq!(points.current_month, 1 + 5);
        assert_eq!(points.current_year, 3 + 9);
        assert_eq!(points.all, 3 + 9);
    }

    #[test]
    fn reset_excludes_older_records_from_all_windows() {
        let reset = at(2024, 3, 10);
        let windows = PeriodWindows::resolve(at(2024, 3, 20), Some(reset), utc());
        let fire = emergency_with("Fire", &[at(2024, 2, 10), at(2024, 3, 5), at(2024, 3, 15)]);

        let points = dataset_points([&fire], &[], &windows);
        assert_eq!(
            points,
            Points {
                current_month: 1,
                current_year: 1,
                previous_month: 0,
                all: 1,
            }
        );
    }

    #[test]
    fn ranking_is_descending_and_stable_on_ties() {
        let windows = PeriodWindows::resolve(at(2024, 3, 20), None, utc());
        let quiet = emergency_with("Quiet", &[]);
        let busy = emergency_with("Busy", &[at(2024, 3, 2), at(2024, 3, 3)]);
        let also_quiet = emergency_with("AlsoQuiet", &[at(2023, 3, 3)]);

        let ranked = rank_by_current_month(vec![quiet, busy, also_quiet], &windows);
        let order: Vec<&str> = ranked.iter().map(|(e, _)| e.kind.as_str()).collect();
        assert_eq!(order, ["Busy", "Quiet", "AlsoQuiet"]);
        assert_eq!(ranked[0].1.current_month, 2);
    }
}
