use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, Local, NaiveDate, Timelike};

use crate::domain::{Ledger, saturating_add, seconds_f64};
use crate::goals::{daily_total, start_of_week};

pub const HISTOGRAM_DAYS: i64 = 14;
pub const TREND_TAGS: usize = 5;
pub const TREND_WEEKS: i64 = 4;

/// Hours per `[weekday][hour]`, weekday 0 being Monday, in local time.
pub type Heatmap = [[f64; 24]; 7];

/// One bucket per calendar day, oldest first, ending with `today`.
pub fn daily_histogram(ledger: &Ledger, today: NaiveDate, days: i64) -> Vec<(NaiveDate, Duration)> {
    (0..days.max(0))
        .rev()
        .map(|offset| {
            let day = today - Duration::days(offset);
            (day, daily_total(ledger, day))
        })
        .collect()
}

/// All-time totals per tag.
pub fn tag_distribution(ledger: &Ledger) -> BTreeMap<String, Duration> {
    let mut totals = BTreeMap::new();
    for entry in ledger.entries() {
        let bucket = totals.entry(entry.tag.clone()).or_insert_with(Duration::zero);
        *bucket = saturating_add(*bucket, entry.lap_duration);
    }
    totals
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagShare {
    pub tag: String,
    pub total: Duration,
    pub share: f64,
}

/// Tag totals largest first, with each tag's share of the overall total.
pub fn tag_shares(ledger: &Ledger) -> Vec<TagShare> {
    let totals = tag_distribution(ledger);
    let overall = totals
        .values()
        .fold(Duration::zero(), |acc, value| saturating_add(acc, *value));
    let overall_seconds = seconds_f64(overall);

    let mut rows = totals
        .into_iter()
        .map(|(tag, total)| TagShare {
            share: if overall_seconds > 0.0 {
                seconds_f64(total) / overall_seconds
            } else {
                0.0
            },
            tag,
            total,
        })
        .collect::<Vec<_>>();
    rows.sort_by(|left, right| right.total.cmp(&left.total).then_with(|| left.tag.cmp(&right.tag)));
    rows
}

pub fn heatmap(ledger: &Ledger) -> Heatmap {
    let mut cells = [[0.0; 24]; 7];
    for entry in ledger.entries() {
        let local = entry.timestamp.with_timezone(&Local);
        let weekday = local.weekday().num_days_from_monday() as usize;
        let hour = local.hour() as usize;
        cells[weekday][hour] += seconds_f64(entry.lap_duration) / 3600.0;
    }
    cells
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagTrend {
    pub tag: String,
    /// Oldest week first.
    pub points: Vec<Duration>,
}

/// Week starts (Mondays) of the `weeks` most recent weeks, oldest first,
/// the last one being the week containing `today`.
pub fn trend_weeks(today: NaiveDate, weeks: i64) -> Vec<NaiveDate> {
    let current = start_of_week(today);
    (0..weeks.max(0))
        .rev()
        .map(|offset| current - Duration::weeks(offset))
        .collect()
}

/// Per-week totals for the `top_n` tags with the most all-time time.
pub fn weekly_trends(ledger: &Ledger, today: NaiveDate, top_n: usize, weeks: i64) -> Vec<TagTrend> {
    let week_starts = trend_weeks(today, weeks);
    tag_shares(ledger)
        .into_iter()
        .take(top_n)
        .map(|share| {
            let points = week_starts
                .iter()
                .map(|week_start| {
                    let week_end = *week_start + Duration::days(7);
                    ledger
                        .entries()
                        .iter()
                        .filter(|entry| entry.tag == share.tag)
                        .filter(|entry| {
                            let day = entry.day();
                            day >= *week_start && day < week_end
                        })
                        .fold(Duration::zero(), |acc, entry| saturating_add(acc, entry.lap_duration))
                })
                .collect();
            TagTrend {
                tag: share.tag,
                points,
            }
        })
        .collect()
}

/// Headline numbers shown above the charts.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub today: Duration,
    pub yesterday: Duration,
    pub week: Duration,
    pub week_daily_average: Duration,
    pub all_time: Duration,
    pub entry_count: usize,
    pub active_days: usize,
    pub active_day_average: Duration,
}

pub fn overview(ledger: &Ledger, today: NaiveDate) -> Overview {
    let week = crate::goals::weekly_total(ledger, start_of_week(today));
    let all_time = ledger.all_time_total();
    let active_days = ledger
        .entries()
        .iter()
        .map(|entry| entry.day())
        .collect::<HashSet<_>>()
        .len();

    Overview {
        today: daily_total(ledger, today),
        yesterday: daily_total(ledger, today - Duration::days(1)),
        week,
        week_daily_average: week / 7,
        all_time,
        entry_count: ledger.len(),
        active_days,
        active_day_average: all_time / active_days.max(1) as i32,
    }
}
