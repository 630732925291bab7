use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::domain::{Ledger, day_bounds_utc, normalize_tag, saturating_add};
use crate::settings::Goals;

pub fn daily_total(ledger: &Ledger, day: NaiveDate) -> Duration {
    ledger
        .entries()
        .iter()
        .filter(|entry| entry.day() == day)
        .fold(Duration::zero(), |acc, entry| saturating_add(acc, entry.lap_duration))
}

pub fn tag_daily_total(ledger: &Ledger, tag: &str, day: NaiveDate) -> Duration {
    let tag = normalize_tag(tag);
    ledger
        .entries()
        .iter()
        .filter(|entry| entry.tag == tag && entry.day() == day)
        .fold(Duration::zero(), |acc, entry| saturating_add(acc, entry.lap_duration))
}

/// Sum over `[week_start, week_start + 7 days)` in local wall-clock time.
pub fn weekly_total(ledger: &Ledger, week_start: NaiveDate) -> Duration {
    let (start, _) = day_bounds_utc(week_start);
    let (end, _) = day_bounds_utc(week_start + Duration::days(7));
    ledger
        .entries()
        .iter()
        .filter(|entry| entry.timestamp >= start && entry.timestamp < end)
        .fold(Duration::zero(), |acc, entry| saturating_add(acc, entry.lap_duration))
}

/// The Monday on or before `day`.
pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    let days_from_monday = day.weekday().num_days_from_monday() as i64;
    day - Duration::days(days_from_monday)
}

/// Fraction of a goal reached, clamped to `[0, 1]`. A goal that is not a
/// positive number of hours counts as met.
pub fn goal_ratio(total: Duration, goal_hours: f64) -> f64 {
    if !goal_hours.is_finite() || goal_hours <= 0.0 {
        return 1.0;
    }
    let seconds = total.num_milliseconds().max(0) as f64 / 1000.0;
    (seconds / (goal_hours * 3600.0)).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    /// Consecutive qualifying days ending today; zero when today falls short.
    pub current: u32,
    /// Length of the newest run of qualifying days, wherever it ends.
    pub latest_run: u32,
}

/// Totals per local day, built in one pass over the ledger.
pub fn daily_totals(ledger: &Ledger) -> BTreeMap<NaiveDate, Duration> {
    let mut totals = BTreeMap::new();
    for entry in ledger.entries() {
        let bucket = totals.entry(entry.day()).or_insert_with(Duration::zero);
        *bucket = saturating_add(*bucket, entry.lap_duration);
    }
    totals
}

/// Finds the newest day on or before `today` that meets the daily goal and
/// counts the consecutive qualifying days ending there.
/// `live` is unlogged time from a running timer and only counts toward today.
pub fn streak(ledger: &Ledger, today: NaiveDate, daily_goal_hours: f64, live: Duration) -> Streak {
    let mut totals = daily_totals(ledger);
    let today_total = totals.entry(today).or_insert_with(Duration::zero);
    *today_total = saturating_add(*today_total, live);

    let qualifies = |day: &NaiveDate| {
        totals
            .get(day)
            .is_some_and(|total| meets_goal(*total, daily_goal_hours))
    };

    let Some(newest) = totals.range(..=today).rev().map(|(day, _)| *day).find(|day| qualifies(day)) else {
        return Streak {
            current: 0,
            latest_run: 0,
        };
    };

    let mut run = 0u32;
    let mut cursor = Some(newest);
    while let Some(day) = cursor.filter(|day| qualifies(day)) {
        run += 1;
        cursor = day.pred_opt();
    }

    Streak {
        current: if newest == today { run } else { 0 },
        latest_run: run,
    }
}

fn meets_goal(total: Duration, daily_goal_hours: f64) -> bool {
    total > Duration::zero() && goal_ratio(total, daily_goal_hours) >= 1.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalProgress {
    pub today: Duration,
    pub week: Duration,
    pub all_time: Duration,
    pub daily_ratio: f64,
    pub weekly_ratio: f64,
    pub global_ratio: f64,
}

pub fn goal_progress(ledger: &Ledger, goals: &Goals, today: NaiveDate, live: Duration) -> GoalProgress {
    let today_total = saturating_add(daily_total(ledger, today), live);
    let week_total = saturating_add(weekly_total(ledger, start_of_week(today)), live);
    let all_time = saturating_add(ledger.all_time_total(), live);
    GoalProgress {
        today: today_total,
        week: week_total,
        all_time,
        daily_ratio: goal_ratio(today_total, goals.daily),
        weekly_ratio: goal_ratio(week_total, goals.weekly),
        global_ratio: goal_ratio(all_time, goals.global),
    }
}
