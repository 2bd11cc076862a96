//! Recurrence engine tests: next and first triggers, timezone handling.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use straylight::scheduler::engine::{first_run, next_run, FirstRunSpec};
use straylight::scheduler::store::{ScheduledTask, ScheduleKind, TaskStatus};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    utc_s(y, mo, d, h, mi, 0)
}

fn utc_s(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().expect("valid instant")
}

fn task(kind: ScheduleKind, next_run_at_utc: DateTime<Utc>) -> ScheduledTask {
    ScheduledTask {
        id: 1,
        user_key: "alice".to_owned(),
        tool_name: "echo".to_owned(),
        args: serde_json::Map::new(),
        schedule_kind: kind,
        interval_seconds: None,
        time_of_day: None,
        weekday_mask: None,
        day_of_month: None,
        timezone: "UTC".to_owned(),
        next_run_at_utc,
        status: TaskStatus::Active,
        created_at: String::new(),
        updated_at: String::new(),
        last_error: None,
        run_count: 0,
    }
}

// ---------- next_run ----------

#[test]
fn one_time_is_terminal() {
    let t = task(ScheduleKind::OneTime, utc(2026, 1, 1, 9, 0));
    assert_eq!(next_run(&t), None);
}

#[test]
fn every_n_adds_the_interval() {
    let mut t = task(ScheduleKind::EveryN, utc(2026, 1, 1, 9, 0));
    t.interval_seconds = Some(3600);
    assert_eq!(next_run(&t), Some(utc(2026, 1, 1, 10, 0)));
}

#[test]
fn every_n_rejects_nonpositive_intervals() {
    let mut t = task(ScheduleKind::EveryN, utc(2026, 1, 1, 9, 0));
    t.interval_seconds = Some(0);
    assert_eq!(next_run(&t), None);
    t.interval_seconds = Some(-5);
    assert_eq!(next_run(&t), None);
    t.interval_seconds = None;
    assert_eq!(next_run(&t), None);
}

#[test]
fn daily_at_advances_to_the_next_local_day() {
    // Current trigger: 2025-06-15 10:00 Lisbon (= 09:00 UTC, summer).
    let mut t = task(ScheduleKind::DailyAt, utc(2025, 6, 15, 9, 0));
    t.timezone = "Europe/Lisbon".to_owned();
    t.time_of_day = Some("09:00".to_owned());

    // Next: 2025-06-16 09:00 Lisbon = 08:00 UTC.
    assert_eq!(next_run(&t), Some(utc(2025, 6, 16, 8, 0)));
}

#[test]
fn daily_at_clamps_out_of_range_times() {
    let mut t = task(ScheduleKind::DailyAt, utc(2026, 1, 1, 9, 0));
    t.time_of_day = Some("25:99".to_owned());
    assert_eq!(next_run(&t), Some(utc(2026, 1, 2, 23, 59)));
}

#[test]
fn daily_at_defaults_time_when_missing() {
    let t = {
        let mut t = task(ScheduleKind::DailyAt, utc(2026, 1, 1, 15, 0));
        t.time_of_day = None;
        t
    };
    assert_eq!(next_run(&t), Some(utc(2026, 1, 2, 9, 0)));
}

#[test]
fn weekly_on_finds_the_next_selected_weekday() {
    // 2026-01-01 is a Thursday (weekday 3).
    let mut t = task(ScheduleKind::WeeklyOn, utc(2026, 1, 1, 9, 0));
    t.weekday_mask = Some("0,4".to_owned()); // Monday, Friday
    t.time_of_day = Some("09:00".to_owned());

    // Friday 2026-01-02 09:00 UTC.
    assert_eq!(next_run(&t), Some(utc(2026, 1, 2, 9, 0)));
}

#[test]
fn weekly_on_with_empty_set_is_terminal() {
    let mut t = task(ScheduleKind::WeeklyOn, utc(2026, 1, 1, 9, 0));
    t.weekday_mask = Some(String::new());
    assert_eq!(next_run(&t), None);
    t.weekday_mask = None;
    assert_eq!(next_run(&t), None);
}

#[test]
fn weekly_on_ignores_invalid_mask_tokens() {
    let mut t = task(ScheduleKind::WeeklyOn, utc(2026, 1, 1, 9, 0));
    t.weekday_mask = Some("9,notaday,4".to_owned());
    assert_eq!(next_run(&t), Some(utc(2026, 1, 2, 9, 0)));
}

#[test]
fn monthly_on_clamps_into_february() {
    let mut t = task(ScheduleKind::MonthlyOn, utc(2025, 1, 31, 9, 0));
    t.day_of_month = Some(31);
    t.time_of_day = Some("09:00".to_owned());

    // 2025 is not a leap year.
    assert_eq!(next_run(&t), Some(utc(2025, 2, 28, 9, 0)));
}

#[test]
fn monthly_on_clamps_into_leap_february() {
    let mut t = task(ScheduleKind::MonthlyOn, utc(2024, 1, 31, 9, 0));
    t.day_of_month = Some(31);
    t.time_of_day = Some("09:00".to_owned());

    assert_eq!(next_run(&t), Some(utc(2024, 2, 29, 9, 0)));
}

#[test]
fn monthly_on_rolls_over_the_year() {
    let mut t = task(ScheduleKind::MonthlyOn, utc(2025, 12, 15, 9, 0));
    t.day_of_month = Some(15);
    t.time_of_day = Some("09:00".to_owned());

    assert_eq!(next_run(&t), Some(utc(2026, 1, 15, 9, 0)));
}

#[test]
fn unknown_timezone_falls_back_to_utc() {
    let mut t = task(ScheduleKind::DailyAt, utc(2026, 1, 1, 9, 0));
    t.timezone = "Atlantis/Lost".to_owned();
    t.time_of_day = Some("09:00".to_owned());
    assert_eq!(next_run(&t), Some(utc(2026, 1, 2, 9, 0)));
}

// ---------- first_run ----------

#[test]
fn first_run_one_time_with_delay() {
    let now = utc(2026, 1, 1, 12, 0);
    let spec = FirstRunSpec {
        delay_seconds: Some(90),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::OneTime, &spec, Tz::UTC, now),
        Some(utc_s(2026, 1, 1, 12, 1, 30)),
    );
}

#[test]
fn first_run_one_time_with_execute_at() {
    let now = utc(2026, 1, 1, 12, 0);
    let spec = FirstRunSpec {
        execute_at: Some("2026-02-03T08:30:00Z".to_owned()),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::OneTime, &spec, Tz::UTC, now),
        Some(utc(2026, 2, 3, 8, 30)),
    );
}

#[test]
fn first_run_one_time_naive_timestamp_uses_the_timezone() {
    let now = utc(2026, 6, 1, 12, 0);
    let tz: Tz = "Europe/Lisbon".parse().expect("valid tz");
    let spec = FirstRunSpec {
        execute_at: Some("2026-06-02 09:00".to_owned()),
        ..FirstRunSpec::default()
    };
    // 09:00 Lisbon summer time = 08:00 UTC.
    assert_eq!(
        first_run(ScheduleKind::OneTime, &spec, tz, now),
        Some(utc(2026, 6, 2, 8, 0)),
    );
}

#[test]
fn first_run_one_time_without_parameters_is_none() {
    let now = utc(2026, 1, 1, 12, 0);
    assert_eq!(
        first_run(ScheduleKind::OneTime, &FirstRunSpec::default(), Tz::UTC, now),
        None,
    );
}

#[test]
fn first_run_every_n_starts_one_interval_out() {
    let now = utc(2026, 1, 1, 12, 0);
    let spec = FirstRunSpec {
        interval_seconds: Some(600),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::EveryN, &spec, Tz::UTC, now),
        Some(utc(2026, 1, 1, 12, 10)),
    );
}

#[test]
fn first_run_daily_today_when_still_ahead() {
    let now = utc(2026, 1, 1, 8, 0);
    let spec = FirstRunSpec {
        time_of_day: Some("09:00".to_owned()),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::DailyAt, &spec, Tz::UTC, now),
        Some(utc(2026, 1, 1, 9, 0)),
    );
}

#[test]
fn first_run_daily_tomorrow_when_already_past() {
    let now = utc(2026, 1, 1, 10, 0);
    let spec = FirstRunSpec {
        time_of_day: Some("09:00".to_owned()),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::DailyAt, &spec, Tz::UTC, now),
        Some(utc(2026, 1, 2, 9, 0)),
    );
}

#[test]
fn first_run_weekly_requires_weekdays() {
    let now = utc(2026, 1, 1, 10, 0);
    let spec = FirstRunSpec {
        time_of_day: Some("09:00".to_owned()),
        ..FirstRunSpec::default()
    };
    assert_eq!(first_run(ScheduleKind::WeeklyOn, &spec, Tz::UTC, now), None);
}

#[test]
fn first_run_weekly_picks_the_nearest_future_slot() {
    // Thursday 2026-01-01, 10:00 UTC; Thursday at 09:00 already passed.
    let now = utc(2026, 1, 1, 10, 0);
    let spec = FirstRunSpec {
        time_of_day: Some("09:00".to_owned()),
        weekdays: vec![3], // Thursday
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::WeeklyOn, &spec, Tz::UTC, now),
        Some(utc(2026, 1, 8, 9, 0)),
    );
}

#[test]
fn first_run_monthly_skips_short_months() {
    // Unlike next_run, the first run lands on the exact requested day.
    let now = utc(2025, 2, 1, 10, 0);
    let spec = FirstRunSpec {
        time_of_day: Some("09:00".to_owned()),
        day_of_month: Some(31),
        ..FirstRunSpec::default()
    };
    assert_eq!(
        first_run(ScheduleKind::MonthlyOn, &spec, Tz::UTC, now),
        Some(utc(2025, 3, 31, 9, 0)),
    );
}
