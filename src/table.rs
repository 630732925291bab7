//! Pipe-delimited table export and import.
//!
//! ```text
//! # | Task Description | Tag | Lap | Tag Total | Session | Date
//! --|------------------|-----|-----|-----------|---------|-----
//! 1 | Write report | Work | 01:00:00.4 | 01:00:00 | 01:00:00 | 05.01 09:00
//! ```
//!
//! Columns are positional. Import keeps only lines containing `|` that are
//! neither the header nor the separator, skips rows with fewer than six
//! columns, and reads times as `H:M:S`, dropping any fractional part.
//!
//! The CSV export is write-only: one header row, then every field of every
//! entry with durations in seconds, for spreadsheets.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, Utc};

use crate::domain::{
    LogEntry, format_duration, format_duration_precise, local_naive_to_utc_resolved, normalize_tag,
    normalize_task, seconds_f64,
};
use crate::storage::StorageError;

const DELIMITER: char = '|';
const HEADER: [&str; 7] = ["#", "Task Description", "Tag", "Lap", "Tag Total", "Session", "Date"];
const MIN_FIELDS: usize = 6;
const DATE_FORMAT: &str = "%d.%m %H:%M";

pub fn encode_table(entries: &[LogEntry]) -> String {
    let mut out = String::new();
    out.push_str(&HEADER.join(" | "));
    out.push('\n');
    out.push_str(
        &HEADER
            .iter()
            .map(|column| "-".repeat(column.len() + 2))
            .collect::<Vec<_>>()
            .join("|"),
    );
    out.push('\n');

    for entry in entries {
        let row = [
            entry.id.to_string(),
            cell(&entry.task),
            cell(&entry.tag),
            format_duration_precise(entry.lap_duration),
            format_duration(entry.tag_total_at_log),
            format_duration(entry.session_total_at_log),
            entry.timestamp.with_timezone(&Local).format(DATE_FORMAT).to_string(),
        ];
        out.push_str(&row.join(" | "));
        out.push('\n');
    }
    out
}

const CSV_HEADER: [&str; 8] = [
    "datetime", "date", "tag", "task", "duration", "note", "tag_total", "session_total",
];

pub fn encode_csv(entries: &[LogEntry]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for entry in entries {
        let local = entry.timestamp.with_timezone(&Local);
        let row = [
            local.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            local.format("%Y-%m-%d").to_string(),
            entry.tag.clone(),
            entry.task.clone(),
            seconds_f64(entry.lap_duration).to_string(),
            entry.note.clone().unwrap_or_default(),
            seconds_f64(entry.tag_total_at_log).to_string(),
            seconds_f64(entry.session_total_at_log).to_string(),
        ];
        out.push_str(&row.iter().map(|field| csv_field(field)).collect::<Vec<_>>().join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Parses a table back into entries. `now` anchors the year of the
/// year-less date column and stamps rows without one.
pub fn decode_table(raw: &str, now: DateTime<Utc>) -> Result<Vec<LogEntry>, StorageError> {
    let mut entries = Vec::new();
    let mut lap_sum = Duration::zero();

    for line in raw.lines() {
        if !line.contains(DELIMITER) || is_header(line) || is_separator(line) {
            continue;
        }

        let fields = line.split(DELIMITER).map(str::trim).collect::<Vec<_>>();
        if fields.len() < MIN_FIELDS {
            continue;
        }

        let (Some(lap), Some(tag_total), Some(session_total)) = (
            parse_clock(fields[3]),
            parse_clock(fields[4]),
            parse_clock(fields[5]),
        ) else {
            continue;
        };
        let Some(next_sum) = lap_sum.checked_add(&lap) else {
            continue;
        };
        lap_sum = next_sum;

        let timestamp = fields
            .get(6)
            .and_then(|raw| parse_date(raw, now))
            .unwrap_or(now);

        entries.push(LogEntry {
            id: entries.len() + 1,
            task: normalize_task(fields[1]),
            tag: normalize_tag(fields[2]),
            lap_duration: lap,
            tag_total_at_log: tag_total,
            session_total_at_log: session_total,
            timestamp,
            note: None,
        });
    }

    if entries.is_empty() {
        return Err(StorageError::EmptyTable);
    }
    Ok(entries)
}

fn cell(value: &str) -> String {
    value.replace(DELIMITER, "/").replace(['\n', '\r'], " ")
}

fn is_header(line: &str) -> bool {
    let first = line.split(DELIMITER).next().map(str::trim).unwrap_or_default();
    first == HEADER[0] || line.contains(HEADER[1])
}

fn is_separator(line: &str) -> bool {
    line.chars().all(|ch| matches!(ch, '-' | '|' | '+' | ':' | '=' | ' '))
}

/// `H:M:S` with an optional fractional suffix on the seconds, which is dropped.
/// Values too large for a `Duration` do not parse.
fn parse_clock(raw: &str) -> Option<Duration> {
    let mut parts = raw.split(':');
    let hours = parts.next()?.trim().parse::<i64>().ok()?;
    let minutes = parts.next()?.trim().parse::<i64>().ok()?;
    let seconds_raw = parts.next()?.trim();
    if parts.next().is_some() || hours < 0 || minutes < 0 {
        return None;
    }
    let whole_seconds = seconds_raw.split('.').next()?.parse::<i64>().ok()?;
    if whole_seconds < 0 {
        return None;
    }
    Duration::try_hours(hours)?
        .checked_add(&Duration::try_minutes(minutes)?)?
        .checked_add(&Duration::try_seconds(whole_seconds)?)
}

fn parse_date(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&Local).date_naive();
    let (day_month, time) = raw.trim().split_once(' ')?;
    let (day, month) = day_month.split_once('.')?;
    let day = day.trim().parse::<u32>().ok()?;
    let month = month.trim().parse::<u32>().ok()?;
    let time = chrono::NaiveTime::parse_from_str(time.trim(), "%H:%M").ok()?;

    let mut date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date > today {
        date = NaiveDate::from_ymd_opt(today.year() - 1, month, day)?;
    }
    Some(local_naive_to_utc_resolved(NaiveDateTime::new(date, time)))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::domain::Ledger;
    use crate::domain::tests::local;
    use crate::storage::StorageError;

    use super::{decode_table, encode_csv, encode_table, parse_clock};

    #[test]
    fn exported_table_imports_to_the_same_ledger() {
        let mut ledger = Ledger::new();
        ledger
            .log_lap("Write | report", "work", Duration::milliseconds(3_600_700), None, local(2026, 5, 4, 9, 15))
            .unwrap();
        ledger
            .log_lap("Read", "study", Duration::seconds(1800), None, local(2026, 5, 4, 11, 0))
            .unwrap();
        ledger
            .log_lap("Fix", "work", Duration::seconds(600), None, local(2026, 5, 5, 8, 45))
            .unwrap();

        let table = encode_table(ledger.entries());
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("# | Task Description | Tag | Lap | Tag Total | Session | Date"));
        assert!(lines.next().unwrap().starts_with("---"));
        assert_eq!(
            lines.next(),
            Some("1 | Write / report | Work | 01:00:00.7 | 01:00:00 | 01:00:00 | 04.05 09:15")
        );

        let imported = Ledger::from_entries(decode_table(&table, local(2026, 6, 1, 12, 0)).unwrap());
        assert_eq!(imported.len(), 3);
        assert_eq!(imported.tag_total("Work"), Duration::seconds(4200));
        assert_eq!(imported.tag_total("Study"), Duration::seconds(1800));
        assert_eq!(imported.total_logged(), Duration::seconds(6000));

        for (before, after) in ledger.entries().iter().zip(imported.entries()) {
            assert_eq!(after.tag, before.tag);
            assert_eq!(after.lap_duration.num_seconds(), before.lap_duration.num_seconds());
            assert_eq!(after.tag_total_at_log.num_seconds(), before.tag_total_at_log.num_seconds());
            assert_eq!(
                after.session_total_at_log.num_seconds(),
                before.session_total_at_log.num_seconds()
            );
            assert_eq!(after.timestamp, before.timestamp);
        }
        assert_eq!(imported.entries()[0].task, "Write / report");
    }

    #[test]
    fn csv_export_quotes_awkward_cells() {
        let mut ledger = Ledger::new();
        ledger
            .log_lap(
                "Read, then \"summarize\"",
                "study",
                Duration::milliseconds(90_500),
                Some("ch. 2".to_string()),
                local(2026, 1, 5, 9, 0),
            )
            .unwrap();
        ledger
            .log_lap("Fix", "work", Duration::seconds(30), None, local(2026, 1, 5, 10, 0))
            .unwrap();

        let csv = encode_csv(ledger.entries());
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "datetime,date,tag,task,duration,note,tag_total,session_total");
        assert_eq!(
            lines[1],
            "2026-01-05T09:00:00.000,2026-01-05,Study,\"Read, then \"\"summarize\"\"\",90.5,ch. 2,90.5,90.5"
        );
        assert_eq!(lines[2], "2026-01-05T10:00:00.000,2026-01-05,Work,Fix,30,,30,120.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn skips_noise_and_short_rows() {
        let raw = "\
# | Task Description | Tag | Lap | Tag Total | Session | Date
---|---|---|---|---|---|---
free text without delimiter
1 | too | short | 00:01:00
2 | Plan | project | 0:10:05.9 | 0:10:05 | 0:10:05
3 | Bad | work | ten | 0:00:01 | 0:00:01 | 01.01 10:00
";
        let now = local(2026, 6, 1, 12, 0);
        let entries = decode_table(raw, now).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[0].tag, "Project");
        assert_eq!(entries[0].lap_duration, Duration::seconds(605));
        assert_eq!(entries[0].timestamp, now);
    }

    #[test]
    fn year_less_dates_never_land_in_the_future() {
        let raw = "1 | Late | Work | 00:30:00 | 00:30:00 | 00:30:00 | 31.12 23:00\n";
        let entries = decode_table(raw, local(2026, 1, 2, 8, 0)).unwrap();
        assert_eq!(entries[0].timestamp, local(2025, 12, 31, 23, 0));
    }

    #[test]
    fn a_table_without_rows_is_an_error() {
        let raw = "# | Task Description | Tag | Lap | Tag Total | Session | Date\n---|---\n";
        assert!(matches!(
            decode_table(raw, local(2026, 1, 2, 8, 0)),
            Err(StorageError::EmptyTable)
        ));
    }

    #[test]
    fn parses_clock_values() {
        assert_eq!(parse_clock("1:02:03"), Some(Duration::seconds(3723)));
        assert_eq!(parse_clock("00:00:59.99"), Some(Duration::seconds(59)));
        assert_eq!(parse_clock("12:30"), None);
        assert_eq!(parse_clock("a:b:c"), None);
        assert_eq!(parse_clock("9999999999999999:00:00"), None);
        assert_eq!(parse_clock("0:0:9223372036854775807"), None);
    }

    #[test]
    fn out_of_range_rows_are_skipped() {
        let now = local(2026, 6, 1, 12, 0);
        let huge = "1 | a | Work | 9999999999999999:00:00 | 0:0:1 | 0:0:1 | 01.01 10:00\n";
        assert!(matches!(decode_table(huge, now), Err(StorageError::EmptyTable)));

        let raw = "\
1 | a | Work | 2000000000000:00:00 | 0:0:1 | 0:0:1 | 01.01 10:00
2 | b | Work | 2000000000000:00:00 | 0:0:1 | 0:0:1 | 01.01 11:00
3 | c | Study | 0:20:00 | 0:20:00 | 0:20:00 | 01.01 12:00
";
        let entries = decode_table(raw, now).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].task, "c");
        assert_eq!(entries[1].id, 2);
    }
}
