//! Recurrence computation for calendar-style schedules.
//!
//! Pure functions, no state. Calendar fields are evaluated in the task's
//! stored IANA timezone and the result is converted back to UTC.
//! [`next_run`] advances an existing task past its current trigger;
//! [`first_run`] computes the initial trigger for a task being created
//! (the store requires the caller to provide it).
//!
//! Local times that fall into a DST gap are skipped to the next
//! candidate rather than guessed at.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use super::store::{ScheduledTask, ScheduleKind};

/// Fallback time of day when a calendar task has none stored.
const DEFAULT_TIME_OF_DAY: &str = "09:00";

/// Forward-scan window for `weekly_on`, in days.
const WEEKLY_SCAN_DAYS: u64 = 14;

/// Forward-scan window for `monthly_on`, in months.
const MONTHLY_SCAN_MONTHS: u32 = 24;

// ---------------------------------------------------------------------------
// Next trigger
// ---------------------------------------------------------------------------

/// Compute the trigger after `task.next_run_at_utc`, or `None` when the
/// schedule is terminal (one-time) or cannot produce another run.
pub fn next_run(task: &ScheduledTask) -> Option<DateTime<Utc>> {
    let tz = parse_timezone(&task.timezone);
    let current_local = task.next_run_at_utc.with_timezone(&tz);

    match task.schedule_kind {
        ScheduleKind::OneTime => None,

        ScheduleKind::EveryN => {
            let interval = task.interval_seconds.unwrap_or(0);
            if interval <= 0 {
                return None;
            }
            task.next_run_at_utc.checked_add_signed(TimeDelta::seconds(interval))
        }

        ScheduleKind::DailyAt => {
            let (hh, mm) = parse_hhmm(task.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            // The next calendar day, strictly after the current trigger.
            // Extra shifts only cover DST gaps.
            for shift in 1..=3u64 {
                let date = current_local.date_naive().checked_add_days(Days::new(shift))?;
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    return Some(utc);
                }
            }
            None
        }

        ScheduleKind::WeeklyOn => {
            let weekdays = parse_weekday_mask(task.weekday_mask.as_deref());
            if weekdays.is_empty() {
                return None;
            }
            let (hh, mm) = parse_hhmm(task.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            let base = current_local.date_naive();
            for shift in 1..=WEEKLY_SCAN_DAYS {
                let date = base.checked_add_days(Days::new(shift))?;
                if !weekdays.contains(&date.weekday().num_days_from_monday()) {
                    continue;
                }
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    return Some(utc);
                }
            }
            None
        }

        ScheduleKind::MonthlyOn => {
            let day = task
                .day_of_month
                .and_then(|d| u32::try_from(d).ok())
                .unwrap_or(1)
                .clamp(1, 31);
            let (hh, mm) = parse_hhmm(task.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            let mut year = current_local.year();
            let mut month = current_local.month();
            for _ in 0..MONTHLY_SCAN_MONTHS {
                (year, month) = inc_month(year, month);
                // Clamp to the month's length: day=31 in February lands
                // on the 28th (29th in a leap year).
                let use_day = day.min(days_in_month(year, month));
                let Some(date) = NaiveDate::from_ymd_opt(year, month, use_day) else {
                    continue;
                };
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    return Some(utc);
                }
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// First trigger
// ---------------------------------------------------------------------------

/// Inputs for computing a schedule's first trigger.
#[derive(Debug, Clone, Default)]
pub struct FirstRunSpec {
    /// Run once after this many seconds (`one_time`).
    pub delay_seconds: Option<i64>,
    /// Run once at this timestamp (`one_time`; RFC 3339 or naive local).
    pub execute_at: Option<String>,
    /// Interval for `every_n`.
    pub interval_seconds: Option<i64>,
    /// `HH:MM` local time for calendar schedules.
    pub time_of_day: Option<String>,
    /// Weekday numbers (0 = Monday) for `weekly_on`.
    pub weekdays: Vec<u32>,
    /// Day of month (1..=31) for `monthly_on`.
    pub day_of_month: Option<u32>,
}

/// Compute the first trigger for a schedule being created, or `None`
/// when the parameters cannot produce one.
///
/// Unlike [`next_run`], `monthly_on` does not clamp here: a first run
/// lands on the exact requested day, skipping months that lack it.
pub fn first_run(
    kind: ScheduleKind,
    spec: &FirstRunSpec,
    tz: Tz,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let now_local = now.with_timezone(&tz);

    match kind {
        ScheduleKind::OneTime => {
            if let Some(delay) = spec.delay_seconds {
                if delay >= 0 {
                    return now.checked_add_signed(TimeDelta::seconds(delay));
                }
            }
            let execute_at = spec.execute_at.as_deref()?;
            parse_execute_at(execute_at, tz)
        }

        ScheduleKind::EveryN => {
            let interval = spec.interval_seconds.unwrap_or(0);
            if interval <= 0 {
                return None;
            }
            now.checked_add_signed(TimeDelta::seconds(interval))
        }

        ScheduleKind::DailyAt => {
            let (hh, mm) = parse_hhmm(spec.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            for shift in 0..=3u64 {
                let date = now_local.date_naive().checked_add_days(Days::new(shift))?;
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    if utc > now {
                        return Some(utc);
                    }
                }
            }
            None
        }

        ScheduleKind::WeeklyOn => {
            let weekdays: BTreeSet<u32> =
                spec.weekdays.iter().copied().filter(|d| *d <= 6).collect();
            if weekdays.is_empty() {
                return None;
            }
            let (hh, mm) = parse_hhmm(spec.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            for shift in 0..WEEKLY_SCAN_DAYS {
                let date = now_local.date_naive().checked_add_days(Days::new(shift))?;
                if !weekdays.contains(&date.weekday().num_days_from_monday()) {
                    continue;
                }
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    if utc > now {
                        return Some(utc);
                    }
                }
            }
            None
        }

        ScheduleKind::MonthlyOn => {
            let day = spec.day_of_month?;
            if !(1..=31).contains(&day) {
                return None;
            }
            let (hh, mm) = parse_hhmm(spec.time_of_day.as_deref().unwrap_or(DEFAULT_TIME_OF_DAY));
            let mut year = now_local.year();
            let mut month = now_local.month();
            for i in 0..MONTHLY_SCAN_MONTHS {
                if i > 0 {
                    (year, month) = inc_month(year, month);
                }
                let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };
                if let Some(utc) = resolve_local(tz, date, hh, mm) {
                    if utc > now {
                        return Some(utc);
                    }
                }
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve an IANA timezone name, defaulting to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(Tz::UTC)
}

/// Parse `HH:MM`, clamping fields into valid ranges instead of erroring.
pub(crate) fn parse_hhmm(value: &str) -> (u32, u32) {
    let mut parts = value.splitn(2, ':');
    let hours = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let minutes = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    match (hours, minutes) {
        (Some(h), Some(m)) => (h.min(23), m.min(59)),
        _ => (9, 0),
    }
}

/// Parse a comma-separated weekday mask (`"0,2,4"`, 0 = Monday).
pub(crate) fn parse_weekday_mask(value: Option<&str>) -> BTreeSet<u32> {
    let Some(value) = value else {
        return BTreeSet::new();
    };
    value
        .split(',')
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .filter(|day| *day <= 6)
        .collect()
}

/// Resolve a local wall-clock time to UTC, preferring the earlier
/// instant when DST makes it ambiguous; `None` in a DST gap.
fn resolve_local(tz: Tz, date: NaiveDate, hh: u32, mm: u32) -> Option<DateTime<Utc>> {
    match tz.with_ymd_and_hms(date.year(), date.month(), date.day(), hh, mm, 0) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Parse an explicit one-time execution timestamp.
///
/// Accepts RFC 3339; naive timestamps are interpreted in `tz`.
fn parse_execute_at(value: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
                LocalResult::None => None,
            };
        }
    }
    None
}

fn inc_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year.saturating_add(1), 1)
    } else {
        (year, month.saturating_add(1))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = inc_month(year, month);
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1);
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1);
    match (first_of_this, first_of_next) {
        (Some(this), Some(next)) => {
            u32::try_from(next.signed_duration_since(this).num_days()).unwrap_or(30)
        }
        _ => 30,
    }
}
