use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::error::EngineError;

pub const DEFAULT_TASK: &str = "Unnamed Task";
pub const DEFAULT_TAG: &str = "General";

pub fn min_loggable() -> Duration {
    Duration::seconds(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: usize,
    pub task: String,
    pub tag: String,
    pub lap_duration: Duration,
    pub tag_total_at_log: Duration,
    pub session_total_at_log: Duration,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
}

impl LogEntry {
    pub fn day(&self) -> NaiveDate {
        day_for_timestamp(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    Task,
    Tag,
}

impl Display for EntryField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryField::Task => write!(f, "task"),
            EntryField::Tag => write!(f, "tag"),
        }
    }
}

impl FromStr for EntryField {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "task" => Ok(EntryField::Task),
            "tag" => Ok(EntryField::Tag),
            other => Err(EngineError::Validation(format!(
                "unknown entry field: {other} (expected task or tag)"
            ))),
        }
    }
}

/// Ordered log of laps plus the per-tag running totals derived from it.
///
/// `tag_index[tag]` always equals the sum of `lap_duration` over the entries
/// carrying that tag; tags with nothing logged have no bucket.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LogEntry>,
    tag_index: BTreeMap<String, Duration>,
    total_logged: Duration,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from stored entries. Ids are re-assigned densely in
    /// the given order and the tag index is replayed from the laps.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let mut ledger = Ledger::new();
        for (index, mut entry) in entries.into_iter().enumerate() {
            entry.id = index + 1;
            deposit(&mut ledger.tag_index, &entry.tag, entry.lap_duration);
            ledger.entries.push(entry);
        }
        ledger.total_logged = ledger
            .entries
            .last()
            .map(|entry| entry.session_total_at_log)
            .unwrap_or_else(Duration::zero);
        ledger
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, id: usize) -> Option<&LogEntry> {
        id.checked_sub(1).and_then(|index| self.entries.get(index))
    }

    pub fn tag_index(&self) -> &BTreeMap<String, Duration> {
        &self.tag_index
    }

    pub fn tag_total(&self, tag: &str) -> Duration {
        self.tag_index
            .get(&normalize_tag(tag))
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    /// Running total carried into the next entry's `session_total_at_log`.
    pub fn total_logged(&self) -> Duration {
        self.total_logged
    }

    pub fn log_lap(
        &mut self,
        task: &str,
        tag: &str,
        lap: Duration,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<LogEntry, EngineError> {
        if lap < min_loggable() {
            return Err(EngineError::InvalidDuration {
                seconds: seconds_f64(lap),
            });
        }

        let tag = normalize_tag(tag);
        let (Some(tag_total), Some(total_logged)) = (
            self.tag_total(&tag).checked_add(&lap),
            self.total_logged.checked_add(&lap),
        ) else {
            return Err(EngineError::InvalidDuration {
                seconds: seconds_f64(lap),
            });
        };
        self.tag_index.insert(tag.clone(), tag_total);
        self.total_logged = total_logged;

        let entry = LogEntry {
            id: self.entries.len() + 1,
            task: normalize_task(task),
            tag,
            lap_duration: lap,
            tag_total_at_log: tag_total,
            session_total_at_log: self.total_logged,
            timestamp,
            note: note.and_then(|note| optional_text(&note)),
        };
        debug!(id = entry.id, tag = %entry.tag, "appended ledger entry");
        self.entries.push(entry.clone());
        Ok(entry)
    }

    pub fn undo_last(&mut self) -> Result<LogEntry, EngineError> {
        let entry = self.entries.pop().ok_or(EngineError::EmptyLedger)?;
        self.forget(&entry);
        Ok(entry)
    }

    /// Removes an entry and shifts every later id down by one.
    pub fn delete_entry(&mut self, id: usize) -> Result<LogEntry, EngineError> {
        let index = self.index_of(id)?;
        let entry = self.entries.remove(index);
        for later in &mut self.entries[index..] {
            later.id -= 1;
        }
        self.forget(&entry);
        Ok(entry)
    }

    pub fn edit_entry(&mut self, id: usize, field: EntryField, value: &str) -> Result<(), EngineError> {
        let index = self.index_of(id)?;
        match field {
            EntryField::Task => {
                self.entries[index].task = normalize_task(value);
            }
            EntryField::Tag => {
                let new_tag = normalize_tag(value);
                let entry = &mut self.entries[index];
                if entry.tag == new_tag {
                    return Ok(());
                }
                let old_tag = std::mem::replace(&mut entry.tag, new_tag.clone());
                let lap = entry.lap_duration;
                withdraw(&mut self.tag_index, &old_tag, lap);
                deposit(&mut self.tag_index, &new_tag, lap);
            }
        }
        Ok(())
    }

    /// Entries newest first, optionally restricted to one tag.
    pub fn filtered_entries(&self, tag: Option<&str>) -> Vec<&LogEntry> {
        let wanted = tag.map(normalize_tag);
        self.entries
            .iter()
            .rev()
            .filter(|entry| wanted.as_ref().is_none_or(|tag| &entry.tag == tag))
            .collect()
    }

    pub fn all_time_total(&self) -> Duration {
        self.entries
            .iter()
            .fold(Duration::zero(), |acc, entry| saturating_add(acc, entry.lap_duration))
    }

    fn index_of(&self, id: usize) -> Result<usize, EngineError> {
        if id == 0 || id > self.entries.len() {
            return Err(EngineError::NotFound { id });
        }
        Ok(id - 1)
    }

    fn forget(&mut self, entry: &LogEntry) {
        withdraw(&mut self.tag_index, &entry.tag, entry.lap_duration);
        self.total_logged = (self.total_logged - entry.lap_duration).max(Duration::zero());
    }
}

fn deposit(index: &mut BTreeMap<String, Duration>, tag: &str, amount: Duration) {
    let bucket = index.entry(tag.to_string()).or_insert_with(Duration::zero);
    *bucket = saturating_add(*bucket, amount);
}

fn withdraw(index: &mut BTreeMap<String, Duration>, tag: &str, amount: Duration) {
    if let Some(bucket) = index.get_mut(tag) {
        *bucket -= amount;
        if *bucket <= Duration::zero() {
            index.remove(tag);
        }
    }
}

/// Trims and title-cases a tag: the first letter of every word is upper
/// case, the rest lower case. Empty input maps to the default tag.
pub fn normalize_tag(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_TAG.to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut previous_is_letter = false;
    for ch in trimmed.chars() {
        if ch.is_alphabetic() {
            if previous_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(ch);
            previous_is_letter = false;
        }
    }
    out
}

pub fn normalize_task(raw: &str) -> String {
    optional_text(raw).unwrap_or_else(|| DEFAULT_TASK.to_string())
}

pub fn optional_text(input: &str) -> Option<String> {
    let value = input.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn day_for_timestamp(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}

pub fn day_bounds_utc(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_naive = day.and_time(chrono::NaiveTime::MIN);
    let end_naive = start_naive + Duration::days(1);
    (
        local_naive_to_utc_resolved(start_naive),
        local_naive_to_utc_resolved(end_naive),
    )
}

/// Resolves a local wall-clock time to UTC. Ambiguous times take the
/// earlier instant; times skipped by a DST jump move forward to the first
/// minute that exists.
pub fn local_naive_to_utc_resolved(naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(timestamp) = local_naive_to_utc(naive) {
        return timestamp;
    }

    let mut cursor = naive;
    for _ in 0..180 {
        cursor += Duration::minutes(1);
        if let Some(timestamp) = local_naive_to_utc(cursor) {
            return timestamp;
        }
    }

    Utc.from_utc_datetime(&naive)
}

fn local_naive_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(local_datetime) => Some(local_datetime.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => Some(first.min(second).with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

pub fn seconds_f64(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

/// Millisecond-precision duration, or `None` when the value is not finite or
/// does not fit.
pub fn duration_from_seconds(seconds: f64) -> Option<Duration> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

pub fn saturating_add(left: Duration, right: Duration) -> Duration {
    left.checked_add(&right).unwrap_or_else(|| {
        if right < Duration::zero() {
            Duration::min_value()
        } else {
            Duration::max_value()
        }
    })
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// `HH:MM:SS.d`, truncated to the decisecond.
pub fn format_duration_precise(duration: Duration) -> String {
    let deciseconds = (duration.num_milliseconds().max(0) % 1000) / 100;
    format!("{}.{deciseconds}", format_duration(duration))
}

pub fn format_hours_short(duration: Duration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, Duration, NaiveDate, Utc};

    use super::{
        EntryField, Ledger, duration_from_seconds, format_duration, format_duration_precise,
        local_naive_to_utc_resolved, normalize_tag,
    };
    use crate::error::EngineError;

    pub(crate) fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap();
        local_naive_to_utc_resolved(naive)
    }

    fn assert_index_matches_entries(ledger: &Ledger) {
        for (tag, total) in ledger.tag_index() {
            let summed = ledger
                .entries()
                .iter()
                .filter(|entry| &entry.tag == tag)
                .fold(Duration::zero(), |acc, entry| acc + entry.lap_duration);
            assert_eq!(*total, summed, "tag index drifted for {tag}");
            assert!(*total > Duration::zero());
        }
        for entry in ledger.entries() {
            assert!(ledger.tag_index().contains_key(&entry.tag));
        }
    }

    fn assert_dense_ids(ledger: &Ledger) {
        for (index, entry) in ledger.entries().iter().enumerate() {
            assert_eq!(entry.id, index + 1);
        }
    }

    #[test]
    fn normalizes_tags_to_title_case() {
        assert_eq!(normalize_tag("  deep work "), "Deep Work");
        assert_eq!(normalize_tag("STUDY"), "Study");
        assert_eq!(normalize_tag("side-project"), "Side-Project");
        assert_eq!(normalize_tag("   "), "General");
    }

    #[test]
    fn accumulates_tag_totals_per_tag() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        ledger.log_lap("draft", "work", Duration::seconds(3600), None, at).unwrap();
        ledger.log_lap("review", "Work", Duration::seconds(3600), None, at).unwrap();
        let third = ledger
            .log_lap("", "study", Duration::seconds(3600), Some("  ".to_string()), at)
            .unwrap();

        assert_eq!(ledger.tag_total("Work"), Duration::seconds(7200));
        assert_eq!(ledger.tag_total("study"), Duration::seconds(3600));
        assert_eq!(ledger.tag_index().len(), 2);
        assert_eq!(third.id, 3);
        assert_eq!(third.task, "Unnamed Task");
        assert_eq!(third.note, None);
        assert_eq!(third.tag_total_at_log, Duration::seconds(3600));
        assert_eq!(third.session_total_at_log, Duration::seconds(10800));
    }

    #[test]
    fn rejects_laps_under_one_second_without_mutation() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        ledger.log_lap("a", "Work", Duration::seconds(5), None, at).unwrap();

        let result = ledger.log_lap("b", "Work", Duration::milliseconds(999), None, at);
        assert!(matches!(result, Err(EngineError::InvalidDuration { .. })));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tag_total("Work"), Duration::seconds(5));
        assert_eq!(ledger.total_logged(), Duration::seconds(5));
    }

    #[test]
    fn refuses_laps_that_would_overflow_the_totals() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        let huge = duration_from_seconds(9e15).unwrap();
        ledger.log_lap("a", "Work", huge, None, at).unwrap();

        let result = ledger.log_lap("b", "Study", huge, None, at);
        assert!(matches!(result, Err(EngineError::InvalidDuration { .. })));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tag_total("Study"), Duration::zero());
        assert_eq!(ledger.total_logged(), huge);
    }

    #[test]
    fn converts_seconds_within_range_only() {
        assert_eq!(duration_from_seconds(1.5), Some(Duration::milliseconds(1_500)));
        assert_eq!(duration_from_seconds(1e300), None);
        assert_eq!(duration_from_seconds(f64::NAN), None);
        assert_eq!(duration_from_seconds(f64::INFINITY), None);
    }

    #[test]
    fn undo_removes_only_the_newest_entry() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        assert!(matches!(ledger.undo_last(), Err(EngineError::EmptyLedger)));

        ledger.log_lap("a", "Work", Duration::seconds(60), None, at).unwrap();
        ledger.log_lap("b", "Play", Duration::seconds(30), None, at).unwrap();

        let undone = ledger.undo_last().unwrap();
        assert_eq!(undone.task, "b");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tag_total("Play"), Duration::zero());
        assert!(!ledger.tag_index().contains_key("Play"));
        assert_eq!(ledger.total_logged(), Duration::seconds(60));
    }

    #[test]
    fn delete_keeps_ids_dense() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        for task in ["a", "b", "c", "d"] {
            ledger.log_lap(task, "Work", Duration::seconds(10), None, at).unwrap();
        }

        let removed = ledger.delete_entry(2).unwrap();
        assert_eq!(removed.task, "b");
        assert_dense_ids(&ledger);
        assert_eq!(ledger.entry(2).map(|entry| entry.task.as_str()), Some("c"));
        assert_eq!(ledger.tag_total("Work"), Duration::seconds(30));

        assert!(matches!(ledger.delete_entry(0), Err(EngineError::NotFound { id: 0 })));
        assert!(matches!(ledger.delete_entry(4), Err(EngineError::NotFound { id: 4 })));
    }

    #[test]
    fn retagging_moves_the_lap_between_buckets() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        ledger.log_lap("a", "Work", Duration::seconds(600), None, at).unwrap();
        ledger.log_lap("b", "Work", Duration::seconds(900), None, at).unwrap();

        ledger.edit_entry(1, EntryField::Tag, "play").unwrap();
        assert_eq!(ledger.tag_total("Work"), Duration::seconds(900));
        assert_eq!(ledger.tag_total("Play"), Duration::seconds(600));

        ledger.edit_entry(2, EntryField::Tag, "Play").unwrap();
        assert!(!ledger.tag_index().contains_key("Work"));
        assert_eq!(ledger.tag_total("Play"), Duration::seconds(1500));

        ledger.edit_entry(1, EntryField::Task, "  ").unwrap();
        assert_eq!(ledger.entry(1).unwrap().task, "Unnamed Task");
        assert!(matches!(
            ledger.edit_entry(3, EntryField::Task, "x"),
            Err(EngineError::NotFound { id: 3 })
        ));
        assert_index_matches_entries(&ledger);
    }

    #[test]
    fn tag_index_survives_mixed_operations() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        let tags = ["Work", "Study", "Play"];
        for round in 0..12i64 {
            let tag = tags[(round % 3) as usize];
            ledger
                .log_lap("task", tag, Duration::milliseconds(1_000 + round * 1_337), None, at)
                .unwrap();
            assert_index_matches_entries(&ledger);

            match round % 4 {
                1 => {
                    ledger.delete_entry(1).unwrap();
                }
                2 => {
                    let last = ledger.len();
                    ledger.edit_entry(last, EntryField::Tag, tags[(round as usize + 1) % 3]).unwrap();
                }
                3 => {
                    ledger.undo_last().unwrap();
                }
                _ => {}
            }
            assert_index_matches_entries(&ledger);
            assert_dense_ids(&ledger);
        }
    }

    #[test]
    fn filters_newest_first() {
        let mut ledger = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        ledger.log_lap("a", "Work", Duration::seconds(10), None, at).unwrap();
        ledger.log_lap("b", "Study", Duration::seconds(10), None, at).unwrap();
        ledger.log_lap("c", "Work", Duration::seconds(10), None, at).unwrap();

        let all = ledger.filtered_entries(None);
        assert_eq!(all.iter().map(|entry| entry.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        let work = ledger.filtered_entries(Some("work"));
        assert_eq!(work.iter().map(|entry| entry.task.as_str()).collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn rebuilds_index_and_running_total_from_entries() {
        let mut source = Ledger::new();
        let at = local(2026, 3, 4, 10, 0);
        source.log_lap("a", "Work", Duration::seconds(100), None, at).unwrap();
        source.log_lap("b", "Study", Duration::seconds(50), None, at).unwrap();

        let mut entries = source.entries().to_vec();
        entries[0].id = 40;
        entries[1].id = 41;
        let rebuilt = Ledger::from_entries(entries);
        assert_dense_ids(&rebuilt);
        assert_eq!(rebuilt.tag_index(), source.tag_index());
        assert_eq!(rebuilt.total_logged(), Duration::seconds(150));
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::seconds(3725)), "01:02:05");
        assert_eq!(format_duration_precise(Duration::milliseconds(3_725_870)), "01:02:05.8");
    }
}
