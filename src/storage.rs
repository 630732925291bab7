use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    Ledger, LogEntry, day_for_timestamp, duration_from_seconds, local_naive_to_utc_resolved, normalize_tag,
    normalize_task, optional_text, seconds_f64,
};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML settings: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to encode TOML settings: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("failed to parse record on line {line}: {source}")]
    JsonDecode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("invalid record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
    #[error("no table rows found")]
    EmptyTable,
}

/// One ledger entry as it is written to disk, one JSON object per line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryRecord {
    datetime: RecordTime,
    #[serde(default, alias = "date_str")]
    date: Option<String>,
    tag: String,
    task: String,
    duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_total: Option<f64>,
}

/// Timestamps are written as RFC 3339 but may also be stored as local
/// wall-clock time with no offset.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RecordTime {
    Zoned(DateTime<Utc>),
    Local(NaiveDateTime),
}

impl RecordTime {
    fn to_utc(&self) -> DateTime<Utc> {
        match self {
            RecordTime::Zoned(timestamp) => *timestamp,
            RecordTime::Local(naive) => local_naive_to_utc_resolved(*naive),
        }
    }
}

impl EntryRecord {
    fn from_entry(entry: &LogEntry) -> Self {
        Self {
            datetime: RecordTime::Zoned(entry.timestamp),
            date: Some(day_for_timestamp(entry.timestamp).format("%Y-%m-%d").to_string()),
            tag: entry.tag.clone(),
            task: entry.task.clone(),
            duration: seconds_f64(entry.lap_duration),
            note: entry.note.clone(),
            tag_total: Some(seconds_f64(entry.tag_total_at_log)),
            session_total: Some(seconds_f64(entry.session_total_at_log)),
        }
    }
}

pub fn load_ledger(path: &Path) -> Result<Ledger, StorageError> {
    match read_optional(path)? {
        Some(raw) => Ok(Ledger::from_entries(decode_records(&raw)?)),
        None => Ok(Ledger::new()),
    }
}

pub fn save_ledger(path: &Path, ledger: &Ledger) -> Result<(), StorageError> {
    let encoded = encode_records(ledger)?;
    write_atomic(path, encoded.as_bytes())?;
    debug!(path = %path.display(), entries = ledger.len(), "saved ledger");
    Ok(())
}

pub fn encode_records(ledger: &Ledger) -> Result<String, StorageError> {
    let mut out = String::new();
    for entry in ledger.entries() {
        let line = serde_json::to_string(&EntryRecord::from_entry(entry)).map_err(StorageError::JsonEncode)?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Parses a JSON Lines ledger, or a single JSON array of the same records.
/// Running totals missing from a record are recomputed from the records
/// before it.
pub fn decode_records(raw: &str) -> Result<Vec<LogEntry>, StorageError> {
    let records = if raw.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<EntryRecord>>(raw)
            .map_err(|source| StorageError::JsonDecode {
                line: source.line(),
                source,
            })?
            .into_iter()
            .enumerate()
            .map(|(index, record)| (index + 1, record))
            .collect::<Vec<_>>()
    } else {
        let mut records = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<EntryRecord>(line).map_err(|source| StorageError::JsonDecode {
                line: index + 1,
                source,
            })?;
            records.push((index + 1, record));
        }
        records
    };

    let mut entries = Vec::new();
    let mut tag_totals: HashMap<String, Duration> = HashMap::new();
    let mut session_total = Duration::zero();

    for (line_number, record) in records {
        let lap = checked_seconds(record.duration, line_number, "duration")?;
        let tag = normalize_tag(&record.tag);

        let bucket = tag_totals.entry(tag.clone()).or_insert_with(Duration::zero);
        let (Some(replayed_tag_total), Some(replayed_session_total)) =
            (bucket.checked_add(&lap), session_total.checked_add(&lap))
        else {
            return Err(StorageError::InvalidRecord {
                line: line_number,
                reason: "running total out of range".to_string(),
            });
        };
        *bucket = replayed_tag_total;
        session_total = replayed_session_total;

        let tag_total_at_log = match record.tag_total {
            Some(seconds) => checked_seconds(seconds, line_number, "tag_total")?,
            None => replayed_tag_total,
        };
        let session_total_at_log = match record.session_total {
            Some(seconds) => checked_seconds(seconds, line_number, "session_total")?,
            None => session_total,
        };

        entries.push(LogEntry {
            id: entries.len() + 1,
            task: normalize_task(&record.task),
            tag,
            lap_duration: lap,
            tag_total_at_log,
            session_total_at_log,
            timestamp: record.datetime.to_utc(),
            note: record.note.as_deref().and_then(optional_text),
        });
    }

    Ok(entries)
}

fn checked_seconds(seconds: f64, line: usize, field: &str) -> Result<Duration, StorageError> {
    if seconds.is_finite() && seconds >= 0.0 {
        if let Some(duration) = duration_from_seconds(seconds) {
            return Ok(duration);
        }
    }
    Err(StorageError::InvalidRecord {
        line,
        reason: format!("{field} must be a non-negative number of seconds in range, got {seconds}"),
    })
}

pub fn load_settings(path: &Path) -> Result<Settings, StorageError> {
    match read_optional(path)? {
        Some(raw) => {
            let settings: Settings = toml::from_str(&raw)?;
            Ok(settings.sanitized())
        }
        None => Ok(Settings::default()),
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), StorageError> {
    let encoded = toml::to_string_pretty(settings)?;
    write_atomic(path, encoded.as_bytes())?;
    debug!(path = %path.display(), "saved settings");
    Ok(())
}

/// Reads a whole file; a missing or blank file is `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StorageError::Io(err)),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(raw))
}

/// Writes through a sibling staging file and renames it over `path`, so the
/// previous contents survive any failure before the rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let staging = sibling_path(path, "tmp");
    let result = (|| -> Result<(), std::io::Error> {
        let mut file = fs::File::create(&staging)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&staging, path)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&staging);
        return Err(StorageError::Io(err));
    }
    Ok(())
}

/// Renames an unreadable file out of the way and returns where it went.
pub fn move_aside(path: &Path, now: DateTime<Utc>) -> Result<PathBuf, StorageError> {
    let suffix = format!("corrupt-{}", now.with_timezone(&Local).format("%Y%m%d%H%M%S"));
    let target = sibling_path(path, &suffix);
    fs::rename(path, &target)?;
    Ok(target)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Duration;

    use crate::domain::Ledger;
    use crate::domain::tests::local;
    use crate::settings::Settings;

    use super::{
        StorageError, decode_records, load_ledger, load_settings, move_aside, save_ledger, save_settings,
    };

    #[test]
    fn round_trips_records() {
        let mut ledger = Ledger::new();
        ledger
            .log_lap(
                "Write report",
                "work",
                Duration::milliseconds(3_600_400),
                Some("deep work".to_string()),
                local(2026, 1, 5, 9, 0),
            )
            .unwrap();
        ledger
            .log_lap("Read", "study", Duration::seconds(1800), None, local(2026, 1, 5, 11, 30))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");
        save_ledger(&path, &ledger).expect("save should succeed");
        let loaded = load_ledger(&path).expect("load should succeed");

        assert_eq!(loaded.entries(), ledger.entries());
        assert_eq!(loaded.tag_index(), ledger.tag_index());
        assert_eq!(loaded.total_logged(), ledger.total_logged());
        assert!(!dir.path().join("nested").join("ledger.jsonl.tmp").exists());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"date\":\"2026-01-05\""));
    }

    #[test]
    fn missing_or_blank_files_are_empty_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.jsonl");
        assert!(load_ledger(&path).unwrap().is_empty());

        fs::write(&path, "\n  \n").unwrap();
        assert!(load_ledger(&path).unwrap().is_empty());
    }

    #[test]
    fn reports_the_line_of_a_broken_record() {
        let raw = concat!(
            r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":60.0}"#,
            "\n",
            "{not json\n"
        );
        assert!(matches!(decode_records(raw), Err(StorageError::JsonDecode { line: 2, .. })));
    }

    #[test]
    fn rejects_unknown_fields_and_negative_durations() {
        let unknown = r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":60.0,"mood":"ok"}"#;
        assert!(matches!(decode_records(unknown), Err(StorageError::JsonDecode { line: 1, .. })));

        let missing = r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","duration":60.0}"#;
        assert!(matches!(decode_records(missing), Err(StorageError::JsonDecode { line: 1, .. })));

        let negative = r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":-5}"#;
        assert!(matches!(decode_records(negative), Err(StorageError::InvalidRecord { line: 1, .. })));
    }

    #[test]
    fn replays_totals_that_older_files_lack() {
        let raw = concat!(
            r#"{"datetime":"2026-01-05T09:00:00+02:00","date":"2026-01-05","tag":"work","task":"","duration":60.5,"note":""}"#,
            "\n",
            r#"{"datetime":"2026-01-05T10:00:00Z","tag":"WORK","task":"b","duration":30.0}"#,
            "\n"
        );
        let entries = decode_records(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag, "Work");
        assert_eq!(entries[0].task, "Unnamed Task");
        assert_eq!(entries[0].note, None);
        assert_eq!(entries[0].timestamp.to_rfc3339(), "2026-01-05T07:00:00+00:00");
        assert_eq!(entries[1].tag_total_at_log, Duration::milliseconds(90_500));
        assert_eq!(entries[1].session_total_at_log, Duration::milliseconds(90_500));
    }

    #[test]
    fn rejects_durations_out_of_range() {
        let huge = r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":1e300}"#;
        assert!(matches!(decode_records(huge), Err(StorageError::InvalidRecord { line: 1, .. })));

        let huge_total = r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":60.0,"tag_total":1e300}"#;
        assert!(matches!(decode_records(huge_total), Err(StorageError::InvalidRecord { line: 1, .. })));

        let overflowing = concat!(
            r#"{"datetime":"2026-01-05T09:00:00Z","tag":"Work","task":"a","duration":9e15}"#,
            "\n",
            r#"{"datetime":"2026-01-05T10:00:00Z","tag":"Study","task":"b","duration":9e15}"#,
            "\n"
        );
        assert!(matches!(decode_records(overflowing), Err(StorageError::InvalidRecord { line: 2, .. })));
    }

    #[test]
    fn reads_local_timestamps_and_json_arrays() {
        let line = r#"{"datetime":"2026-01-05T09:00:00.123","tag":"work","task":"a","duration":60.0}"#;
        let entries = decode_records(line).unwrap();
        assert_eq!(entries[0].timestamp, local(2026, 1, 5, 9, 0) + Duration::milliseconds(123));

        let array = concat!(
            r#"[{"datetime":"2026-01-05T09:00:00","date_str":"2026-01-05","tag":"study","task":"Read","duration":90.5,"note":""},"#,
            r#"{"datetime":"2026-01-06T10:30:00","date_str":"2026-01-06","tag":"Study","task":"Read","duration":30.0,"note":"ch. 2"}]"#
        );
        let entries = decode_records(array).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, local(2026, 1, 5, 9, 0));
        assert_eq!(entries[1].timestamp, local(2026, 1, 6, 10, 30));
        assert_eq!(entries[1].tag_total_at_log, Duration::milliseconds(120_500));
        assert_eq!(entries[1].note.as_deref(), Some("ch. 2"));
    }

    #[test]
    fn settings_round_trip_and_fill_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        assert_eq!(load_settings(&path).unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.add_tag("Reading").unwrap();
        settings.set_goals("4", "20", "300").unwrap();
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);

        fs::write(&path, "theme = \"dark\"\n[goals]\ndaily = 2\n").unwrap();
        let partial = load_settings(&path).unwrap();
        assert_eq!(partial.theme, "dark");
        assert_eq!(partial.goals.daily, 2.0);
        assert_eq!(partial.goals.weekly, 35.0);
        assert_eq!(partial.tags, Settings::default().tags);

        fs::write(&path, "goals = [").unwrap();
        assert!(matches!(load_settings(&path), Err(StorageError::TomlDecode(_))));
    }

    #[test]
    fn moves_corrupt_files_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(&path, "garbage").unwrap();

        let moved = move_aside(&path, local(2026, 2, 3, 4, 5)).unwrap();
        assert!(!path.exists());
        assert_eq!(
            moved.file_name().and_then(|name| name.to_str()),
            Some("ledger.jsonl.corrupt-20260203040500")
        );
        assert_eq!(fs::read_to_string(moved).unwrap(), "garbage");
    }
}
