use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::{EntryField, Ledger, LogEntry, day_for_timestamp, saturating_add};
use crate::error::EngineError;
use crate::goals::{GoalProgress, Streak, goal_progress, streak, tag_daily_total};
use crate::settings::Settings;
use crate::storage::{
    StorageError, decode_records, encode_records, load_ledger, load_settings, move_aside, read_optional,
    save_ledger, save_settings, write_atomic,
};
use crate::table::{decode_table, encode_csv, encode_table};
use crate::timer::{Clock, Timer, TimerPhase, TimerReading};

pub const LEDGER_FILE: &str = "lapwatch_db.jsonl";
pub const SETTINGS_FILE: &str = "lapwatch_settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub ledger: PathBuf,
    pub settings: PathBuf,
}

impl StorePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ledger: dir.join(LEDGER_FILE),
            settings: dir.join(SETTINGS_FILE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Table,
    Records,
    Csv,
}

impl ExportFormat {
    /// `.jsonl`/`.json` files get records, `.csv` files CSV, anything else
    /// the table.
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jsonl") | Some("json") => ExportFormat::Records,
            Some("csv") => ExportFormat::Csv,
            _ => ExportFormat::Table,
        }
    }
}

/// The one timer, ledger and settings of a process, plus where they live.
///
/// Every mutating command builds the new state on a copy, persists it, and
/// only then swaps it in, so a failed write leaves memory untouched and no
/// reader ever sees a half-applied change.
pub struct Engine {
    clock: Box<dyn Clock>,
    timer: Timer,
    ledger: Ledger,
    settings: Settings,
    paths: StorePaths,
}

impl Engine {
    /// Loads both stores. Unreadable files never fail startup: the ledger
    /// starts empty (the bad file is moved aside first) and settings fall
    /// back to defaults.
    pub fn open(paths: StorePaths, clock: Box<dyn Clock>) -> Self {
        let now = clock.now();
        let ledger = load_ledger_or_empty(&paths.ledger, now);
        let settings = load_settings_or_default(&paths.settings);
        info!(
            ledger = %paths.ledger.display(),
            entries = ledger.len(),
            tags = settings.tags.len(),
            "opened engine"
        );

        Self {
            clock,
            timer: Timer::new(),
            ledger,
            settings,
            paths,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        day_for_timestamp(self.now())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn toggle(&mut self) -> TimerPhase {
        let now = self.now();
        let phase = self.timer.toggle(now);
        info!(phase = phase.label(), "timer toggled");
        phase
    }

    pub fn reading(&self) -> TimerReading {
        self.timer.tick(self.now())
    }

    /// Unlogged time that counts toward today: the current lap while running.
    pub fn live_time(&self) -> Duration {
        if self.timer.is_running() {
            self.timer.current_lap(self.now())
        } else {
            Duration::zero()
        }
    }

    /// Logs the timer's current lap and stops the timer with a fresh lap.
    pub fn log_lap(&mut self, task: &str, tag: &str, note: Option<String>) -> Result<LogEntry, EngineError> {
        let now = self.now();
        let lap = self.timer.current_lap(now);
        let entry = self.append(task, tag, lap, note, now)?;
        self.timer.take_lap(now);
        Ok(entry)
    }

    /// Logs a duration that was not measured by the timer.
    pub fn log_manual(
        &mut self,
        task: &str,
        tag: &str,
        duration: Duration,
        note: Option<String>,
    ) -> Result<LogEntry, EngineError> {
        let now = self.now();
        self.append(task, tag, duration, note, now)
    }

    pub fn undo_last(&mut self) -> Result<LogEntry, EngineError> {
        let mut candidate = self.ledger.clone();
        let entry = candidate.undo_last()?;
        self.commit_ledger(candidate)?;
        info!(id = entry.id, "undid last entry");
        Ok(entry)
    }

    pub fn delete_entry(&mut self, id: usize) -> Result<LogEntry, EngineError> {
        let mut candidate = self.ledger.clone();
        let entry = candidate.delete_entry(id)?;
        self.commit_ledger(candidate)?;
        info!(id, "deleted entry");
        Ok(entry)
    }

    pub fn edit_entry(&mut self, id: usize, field: EntryField, value: &str) -> Result<(), EngineError> {
        let mut candidate = self.ledger.clone();
        candidate.edit_entry(id, field, value)?;
        self.commit_ledger(candidate)?;
        info!(id, %field, "edited entry");
        Ok(())
    }

    pub fn filtered_entries(&self, tag: Option<&str>) -> Vec<&LogEntry> {
        self.ledger.filtered_entries(tag)
    }

    pub fn add_tag(&mut self, name: &str) -> Result<String, EngineError> {
        let mut candidate = self.settings.clone();
        let tag = candidate.add_tag(name)?;
        self.commit_settings(candidate)?;
        Ok(tag)
    }

    pub fn remove_tag(&mut self, name: &str) -> Result<String, EngineError> {
        let mut candidate = self.settings.clone();
        let tag = candidate.remove_tag(name)?;
        self.commit_settings(candidate)?;
        Ok(tag)
    }

    pub fn set_goals(&mut self, daily: &str, weekly: &str, global: &str) -> Result<(), EngineError> {
        let mut candidate = self.settings.clone();
        candidate.set_goals(daily, weekly, global)?;
        self.commit_settings(candidate)
    }

    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<usize, EngineError> {
        let contents = match format {
            ExportFormat::Table => encode_table(self.ledger.entries()),
            ExportFormat::Csv => encode_csv(self.ledger.entries()),
            ExportFormat::Records => encode_records(&self.ledger).map_err(|source| write_error(path, source))?,
        };
        write_atomic(path, contents.as_bytes()).map_err(|source| write_error(path, source))?;
        info!(path = %path.display(), entries = self.ledger.len(), ?format, "exported ledger");
        Ok(self.ledger.len())
    }

    /// Replaces the whole ledger with the file's contents. Records or table
    /// format is detected from the first non-blank line.
    pub fn import(&mut self, path: &Path) -> Result<usize, EngineError> {
        let raw = read_optional(path)
            .map_err(|source| read_error(path, source))?
            .ok_or_else(|| read_error(path, StorageError::EmptyTable))?;

        let looks_like_records = raw
            .lines()
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| line.trim_start().starts_with(['{', '[']));
        let decoded = if looks_like_records {
            decode_records(&raw)
        } else {
            decode_table(&raw, self.now())
        };
        let entries = decoded.map_err(|source| read_error(path, source))?;

        let candidate = Ledger::from_entries(entries);
        let count = candidate.len();
        self.commit_ledger(candidate)?;
        info!(path = %path.display(), entries = count, "imported ledger");
        Ok(count)
    }

    pub fn goal_progress(&self) -> GoalProgress {
        goal_progress(&self.ledger, &self.settings.goals, self.today(), self.live_time())
    }

    pub fn streak(&self) -> Streak {
        streak(&self.ledger, self.today(), self.settings.goals.daily, self.live_time())
    }

    /// Time under `tag` today, including the running lap.
    pub fn tag_today(&self, tag: &str) -> Duration {
        saturating_add(tag_daily_total(&self.ledger, tag, self.today()), self.live_time())
    }

    fn append(
        &mut self,
        task: &str,
        tag: &str,
        lap: Duration,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LogEntry, EngineError> {
        let mut candidate = self.ledger.clone();
        let entry = candidate.log_lap(task, tag, lap, note, now)?;
        self.commit_ledger(candidate)?;
        info!(id = entry.id, tag = %entry.tag, seconds = entry.lap_duration.num_seconds(), "logged lap");
        Ok(entry)
    }

    fn commit_ledger(&mut self, candidate: Ledger) -> Result<(), EngineError> {
        save_ledger(&self.paths.ledger, &candidate).map_err(|source| write_error(&self.paths.ledger, source))?;
        self.ledger = candidate;
        Ok(())
    }

    fn commit_settings(&mut self, candidate: Settings) -> Result<(), EngineError> {
        save_settings(&self.paths.settings, &candidate)
            .map_err(|source| write_error(&self.paths.settings, source))?;
        self.settings = candidate;
        Ok(())
    }
}

fn load_ledger_or_empty(path: &Path, now: DateTime<Utc>) -> Ledger {
    match load_ledger(path) {
        Ok(ledger) => ledger,
        Err(source) => {
            let err = read_error(path, source);
            match move_aside(path, now) {
                Ok(backup) => warn!(%err, backup = %backup.display(), "starting with an empty ledger"),
                Err(move_err) => warn!(%err, %move_err, "starting with an empty ledger"),
            }
            Ledger::new()
        }
    }
}

fn load_settings_or_default(path: &Path) -> Settings {
    load_settings(path).unwrap_or_else(|source| {
        let err = read_error(path, source);
        warn!(%err, "using default settings");
        Settings::default()
    })
}

fn read_error(path: &Path, source: StorageError) -> EngineError {
    EngineError::PersistenceRead {
        path: path.to_path_buf(),
        source,
    }
}

fn write_error(path: &Path, source: StorageError) -> EngineError {
    EngineError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    }
}
