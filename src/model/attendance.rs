use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::ApiError;

/// Hours beyond this in a single record count as overtime.
pub const REGULAR_HOURS_CAP: f64 = 8.0;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[derive(Display, EnumString, AsRefStr, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Approved,
    Rejected,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        raw.parse().map_err(|_| {
            tracing::error!(status = raw, "Unknown attendance status stored");
            ApiError::Internal
        })
    }

    /// Only a pending record can be decided, and only once.
    pub fn ensure_transition(self, next: AttendanceStatus) -> Result<(), ApiError> {
        use AttendanceStatus::*;
        if self == next || matches!((self, next), (Pending, Approved) | (Pending, Rejected)) {
            Ok(())
        } else {
            Err(ApiError::conflict(format!(
                "Cannot move a {self} attendance record to {next}"
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 12)]
    pub user_id: u64,
    #[schema(example = 3)]
    pub business_id: u64,
    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(example = "2026-01-05T09:00:00", value_type = String, format = "date-time")]
    pub start_time: NaiveDateTime,
    #[schema(example = "2026-01-05T18:30:00", value_type = Option<String>, format = "date-time")]
    pub end_time: Option<NaiveDateTime>,
    #[schema(example = 8.0)]
    pub regular_units: f64,
    #[schema(example = 1.5)]
    pub overtime_units: f64,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(nullable = true)]
    pub notes: Option<String>,
    #[schema(nullable = true)]
    pub approved_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

/// Regular/overtime split derived from a start/end pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorkUnits {
    pub regular: f64,
    pub overtime: f64,
}

impl WorkUnits {
    /// Elapsed whole minutes, split at the 8-hour cap. `end <= start` yields zeros.
    pub fn between(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let minutes = (end - start).num_minutes();
        if minutes <= 0 {
            return Self::default();
        }
        let hours = minutes as f64 / 60.0;

        WorkUnits {
            regular: round2(hours.min(REGULAR_HOURS_CAP)),
            overtime: round2((hours - REGULAR_HOURS_CAP).max(0.0)),
        }
    }

    /// Open records (no end yet) carry no units.
    pub fn for_interval(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Self {
        end.map(|end| Self::between(start, end)).unwrap_or_default()
    }

    pub fn total(&self) -> f64 {
        round2(self.regular + self.overtime)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One row of the per-user, per-day rollup.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailySummary {
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    pub entries: u32,
    pub regular_units: f64,
    pub overtime_units: f64,
    pub total_units: f64,
}

/// Per-user, per-day sums as the database aggregates them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyTotals {
    pub user_id: u64,
    pub work_date: NaiveDate,
    pub entries: i64,
    pub regular_units: f64,
    pub overtime_units: f64,
}

impl From<DailyTotals> for DailySummary {
    fn from(totals: DailyTotals) -> Self {
        let regular_units = round2(totals.regular_units);
        let overtime_units = round2(totals.overtime_units);
        DailySummary {
            user_id: totals.user_id,
            work_date: totals.work_date,
            entries: u32::try_from(totals.entries).unwrap_or(u32::MAX),
            regular_units,
            overtime_units,
            total_units: round2(regular_units + overtime_units),
        }
    }
}

/// Rounds aggregated rows into the rollup, keeping their order.
pub fn summarize(rows: Vec<DailyTotals>) -> Vec<DailySummary> {
    rows.into_iter().map(DailySummary::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn totals(user_id: u64, day: u32, entries: i64, regular: f64, overtime: f64) -> DailyTotals {
        DailyTotals {
            user_id,
            work_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            entries,
            regular_units: regular,
            overtime_units: overtime,
        }
    }

    #[test]
    fn short_shift_is_all_regular() {
        let units = WorkUnits::between(at(9, 0), at(13, 30));
        assert_eq!(units, WorkUnits { regular: 4.5, overtime: 0.0 });
    }

    #[test]
    fn exactly_eight_hours_has_no_overtime() {
        let units = WorkUnits::between(at(9, 0), at(17, 0));
        assert_eq!(units, WorkUnits { regular: 8.0, overtime: 0.0 });
    }

    #[test]
    fn long_shift_splits_at_eight_hours() {
        let units = WorkUnits::between(at(8, 0), at(18, 45));
        assert_eq!(units, WorkUnits { regular: 8.0, overtime: 2.75 });
        assert_eq!(units.total(), 10.75);
    }

    #[test]
    fn overnight_shift_counts_across_midnight() {
        let start = at(22, 0);
        let end = start + Duration::hours(9);
        assert_eq!(WorkUnits::between(start, end), WorkUnits { regular: 8.0, overtime: 1.0 });
    }

    #[test]
    fn units_round_to_two_decimals() {
        // 7h 20m = 7.333.. hours
        let units = WorkUnits::between(at(9, 0), at(16, 20));
        assert_eq!(units.regular, 7.33);

        // 8h 10m = 0.1666.. overtime
        let units = WorkUnits::between(at(9, 0), at(17, 10));
        assert_eq!(units.overtime, 0.17);
    }

    #[test]
    fn non_positive_interval_yields_zero() {
        assert_eq!(WorkUnits::between(at(9, 0), at(9, 0)), WorkUnits::default());
        assert_eq!(WorkUnits::between(at(17, 0), at(9, 0)), WorkUnits::default());
    }

    #[test]
    fn seconds_below_a_minute_are_ignored() {
        let start = at(9, 0);
        let end = start + Duration::seconds(59);
        assert_eq!(WorkUnits::between(start, end), WorkUnits::default());
    }

    #[test]
    fn open_record_has_no_units() {
        assert_eq!(WorkUnits::for_interval(at(9, 0), None), WorkUnits::default());
        assert_eq!(
            WorkUnits::for_interval(at(9, 0), Some(at(10, 0))),
            WorkUnits { regular: 1.0, overtime: 0.0 }
        );
    }

    #[test]
    fn split_sums_back_to_elapsed_hours() {
        for minutes in [1i64, 59, 480, 481, 600, 725, 1439] {
            let start = at(0, 0);
            let units = WorkUnits::between(start, start + Duration::minutes(minutes));
            let hours = minutes as f64 / 60.0;
            assert!((units.total() - hours).abs() <= 0.011, "minutes = {minutes}");
            assert!(units.regular <= REGULAR_HOURS_CAP);
            assert!(units.overtime >= 0.0);
        }
    }

    #[test]
    fn summary_rounds_database_sums() {
        let summary = summarize(vec![
            totals(1, 5, 2, 8.0000000001, 1.25),
            totals(1, 6, 1, 8.0, 0.0),
            totals(2, 5, 3, 1.111 + 1.111 + 1.111, 0.0),
        ]);

        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].user_id, 1);
        assert_eq!(summary[0].entries, 2);
        assert_eq!(summary[0].regular_units, 8.0);
        assert_eq!(summary[0].overtime_units, 1.25);
        assert_eq!(summary[0].total_units, 9.25);
        assert_eq!(summary[1].work_date, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
        assert_eq!(summary[2].user_id, 2);
        assert_eq!(summary[2].entries, 3);
        assert_eq!(summary[2].total_units, 3.33);
    }

    #[test]
    fn status_names_are_lowercase() {
        assert_eq!(AttendanceStatus::Approved.as_ref(), "approved");
        assert_eq!("rejected".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Rejected);
        assert!("paid".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn decisions_are_final() {
        use AttendanceStatus::*;
        assert!(Pending.ensure_transition(Approved).is_ok());
        assert!(Pending.ensure_transition(Rejected).is_ok());
        assert!(Approved.ensure_transition(Approved).is_ok());
        assert!(Approved.ensure_transition(Rejected).is_err());
        assert!(Rejected.ensure_transition(Pending).is_err());
        assert!(Approved.ensure_transition(Pending).is_err());
    }
}
