mod domain;
mod engine;
mod error;
mod goals;
mod paths;
mod reports;
mod settings;
mod storage;
mod table;
mod timer;
mod ui;

use std::error::Error;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Duration, Local};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::domain::{EntryField, format_duration, format_duration_precise, format_hours_short};
use crate::engine::{Engine, ExportFormat, StorePaths};
use crate::paths::resolve_data_dir;
use crate::reports::{HISTOGRAM_DAYS, TREND_TAGS, TREND_WEEKS};
use crate::timer::SystemClock;
use crate::ui::run_dashboard;

const LOG_FILE: &str = "lapwatch.log";
const HEATMAP_SHADES: [char; 6] = [' ', '.', ':', '+', '#', '@'];
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Parser)]
#[command(name = "lapwatch", about = "Lap timer and time ledger with goals and streaks")]
struct Cli {
	/// Directory holding the ledger and settings files
	#[arg(long, global = true)]
	data_dir: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Init,
	Dashboard,
	/// Log a duration measured elsewhere, e.g. `--duration 1h30m`
	Log {
		#[arg(long, default_value = "")]
		task: String,
		#[arg(long, default_value = "")]
		tag: String,
		#[arg(long)]
		duration: String,
		#[arg(long)]
		note: Option<String>,
	},
	Undo,
	Edit {
		#[arg(long)]
		id: usize,
		#[arg(long, value_enum)]
		field: FieldArg,
		#[arg(long)]
		value: String,
	},
	Delete {
		#[arg(long)]
		id: usize,
	},
	List {
		#[arg(long)]
		tag: Option<String>,
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
	Tags,
	AddTag {
		#[arg(long)]
		name: String,
	},
	RemoveTag {
		#[arg(long)]
		name: String,
	},
	/// Show goals, or set them when any value is given (hours)
	Goals {
		#[arg(long)]
		daily: Option<String>,
		#[arg(long)]
		weekly: Option<String>,
		#[arg(long)]
		global: Option<String>,
	},
	Export {
		#[arg(long)]
		path: PathBuf,
		#[arg(long, value_enum)]
		format: Option<FormatArg>,
	},
	Import {
		#[arg(long)]
		path: PathBuf,
	},
	Report,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FieldArg {
	Task,
	Tag,
}

impl From<FieldArg> for EntryField {
	fn from(value: FieldArg) -> Self {
		match value {
			FieldArg::Task => EntryField::Task,
			FieldArg::Tag => EntryField::Tag,
		}
	}
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
	Table,
	Records,
	Csv,
}

impl From<FormatArg> for ExportFormat {
	fn from(value: FormatArg) -> Self {
		match value {
			FormatArg::Table => ExportFormat::Table,
			FormatArg::Records => ExportFormat::Records,
			FormatArg::Csv => ExportFormat::Csv,
		}
	}
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> Result<(), Box<dyn Error>> {
	let cli = Cli::parse();
	let data_dir = resolve_data_dir(cli.data_dir);
	let command = cli.command.unwrap_or(Command::Dashboard);

	if matches!(command, Command::Dashboard) {
		init_logging(Some(&data_dir.join(LOG_FILE)));
	} else {
		init_logging(None);
	}

	let mut engine = Engine::open(StorePaths::in_dir(&data_dir), Box::new(SystemClock));

	match command {
		Command::Init => {
			std::fs::create_dir_all(&data_dir)?;
			let paths = engine.paths().clone();
			storage::save_ledger(&paths.ledger, engine.ledger())?;
			storage::save_settings(&paths.settings, engine.settings())?;
			println!("initialized data directory at {}", data_dir.display());
		}
		Command::Dashboard => {
			run_dashboard(&mut engine)?;
		}
		Command::Log {
			task,
			tag,
			duration,
			note,
		} => {
			let duration = parse_duration_input(&duration)?;
			let entry = engine.log_manual(&task, &tag, duration, note)?;
			println!(
				"logged #{} {} | {} | {}",
				entry.id,
				format_duration(entry.lap_duration),
				entry.tag,
				entry.task
			);
		}
		Command::Undo => {
			let entry = engine.undo_last()?;
			println!("removed #{} {} | {}", entry.id, entry.tag, entry.task);
		}
		Command::Edit { id, field, value } => {
			engine.edit_entry(id, field.into(), &value)?;
			println!("updated #{id}");
		}
		Command::Delete { id } => {
			let entry = engine.delete_entry(id)?;
			println!("deleted #{id} {} | {} (later ids shifted down)", entry.tag, entry.task);
		}
		Command::List { tag, limit } => {
			print_entries(&engine, tag.as_deref(), limit);
		}
		Command::Tags => {
			print_tags(&engine);
		}
		Command::AddTag { name } => {
			let tag = engine.add_tag(&name)?;
			println!("added tag {tag}");
		}
		Command::RemoveTag { name } => {
			let tag = engine.remove_tag(&name)?;
			println!("removed tag {tag} (logged entries keep it)");
		}
		Command::Goals {
			daily,
			weekly,
			global,
		} => {
			if daily.is_some() || weekly.is_some() || global.is_some() {
				let current = engine.settings().goals.clone();
				let daily = daily.unwrap_or_else(|| current.daily.to_string());
				let weekly = weekly.unwrap_or_else(|| current.weekly.to_string());
				let global = global.unwrap_or_else(|| current.global.to_string());
				engine.set_goals(&daily, &weekly, &global)?;
			}
			let goals = &engine.settings().goals;
			println!(
				"goals: daily {}h | weekly {}h | global {}h",
				goals.daily, goals.weekly, goals.global
			);
		}
		Command::Export { path, format } => {
			let format = format
				.map(ExportFormat::from)
				.unwrap_or_else(|| ExportFormat::for_path(&path));
			let count = engine.export(&path, format)?;
			println!("exported {count} entries to {}", path.display());
		}
		Command::Import { path } => {
			let count = engine.import(&path)?;
			println!("imported {count} entries from {} (previous ledger replaced)", path.display());
		}
		Command::Report => {
			print_report(&engine);
		}
	}

	Ok(())
}

fn init_logging(log_file: Option<&Path>) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
	let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

	let Some(path) = log_file else {
		builder.with_writer(io::stderr).init();
		return;
	};

	if let Some(parent) = path.parent() {
		let _ = std::fs::create_dir_all(parent);
	}
	match OpenOptions::new().create(true).append(true).open(path) {
		Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
		Err(_) => builder.with_writer(io::sink).init(),
	}
}

/// Accepts `1h30m`, `90m`, `45s`, `1.5h`, plain seconds, or `H:M:S` / `M:S`.
fn parse_duration_input(raw: &str) -> Result<Duration, Box<dyn Error>> {
	let input = raw.trim().to_ascii_lowercase();
	if input.is_empty() {
		return Err("duration is required".into());
	}

	let seconds = if input.contains(':') {
		let parts = input
			.split(':')
			.map(|part| part.trim().parse::<f64>())
			.collect::<Result<Vec<_>, _>>()?;
		match parts.as_slice() {
			[hours, minutes, seconds] => hours * 3600.0 + minutes * 60.0 + seconds,
			[minutes, seconds] => minutes * 60.0 + seconds,
			_ => return Err(format!("invalid clock duration: {raw}").into()),
		}
	} else if let Ok(seconds) = input.parse::<f64>() {
		seconds
	} else {
		let mut total = 0.0;
		let mut current = String::new();
		for ch in input.chars() {
			if ch.is_ascii_digit() || ch == '.' {
				current.push(ch);
				continue;
			}
			let unit = match ch {
				'h' => 3600.0,
				'm' => 60.0,
				's' => 1.0,
				' ' => continue,
				_ => return Err(format!("invalid duration: {raw}").into()),
			};
			let value = current
				.parse::<f64>()
				.map_err(|_| format!("invalid duration: {raw}"))?;
			total += value * unit;
			current.clear();
		}
		if !current.is_empty() {
			return Err(format!("missing unit in duration: {raw}").into());
		}
		total
	};

	if !seconds.is_finite() || seconds < 0.0 {
		return Err(format!("invalid duration: {raw}").into());
	}
	domain::duration_from_seconds(seconds).ok_or_else(|| format!("duration out of range: {raw}").into())
}

fn print_entries(engine: &Engine, tag: Option<&str>, limit: usize) {
	let rows = engine.filtered_entries(tag);
	if rows.is_empty() {
		println!("no entries");
		return;
	}

	for entry in rows.into_iter().take(limit) {
		println!(
			"{:>4} | {} | {} | {} | {}{}",
			entry.id,
			entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
			format_duration_precise(entry.lap_duration),
			entry.tag,
			entry.task,
			entry
				.note
				.as_ref()
				.map(|note| format!(" | {note}"))
				.unwrap_or_default()
		);
	}
}

fn print_tags(engine: &Engine) {
	let index = engine.ledger().tag_index();
	for tag in &engine.settings().tags {
		let total = index.get(tag).copied().unwrap_or_else(Duration::zero);
		println!("{} | {}", format_duration(total), tag);
	}

	let orphaned = index
		.iter()
		.filter(|(tag, _)| !engine.settings().has_tag(tag))
		.collect::<Vec<_>>();
	if !orphaned.is_empty() {
		println!("\nlogged under tags not in the known set:");
		for (tag, total) in orphaned {
			println!("{} | {}", format_duration(*total), tag);
		}
	}
}

fn print_report(engine: &Engine) {
	let today = engine.today();
	let ledger = engine.ledger();
	let overview = reports::overview(ledger, today);
	let progress = engine.goal_progress();
	let streak = engine.streak();
	let goals = &engine.settings().goals;

	println!("report for {}", today.format("%Y-%m-%d"));
	println!(
		"today {} ({} vs yesterday {})",
		format_hours_short(overview.today),
		if overview.today > overview.yesterday { "up" } else { "down" },
		format_hours_short(overview.yesterday)
	);
	println!(
		"this week {} (avg {}/day)",
		format_hours_short(overview.week),
		format_hours_short(overview.week_daily_average)
	);
	println!(
		"all time {} over {} entries, {} per active day",
		format_hours_short(overview.all_time),
		overview.entry_count,
		format_hours_short(overview.active_day_average)
	);
	println!(
		"streak {} days (latest run {})",
		streak.current, streak.latest_run
	);

	println!("\ngoals:");
	println!("daily  {} of {}h", percent(progress.daily_ratio), goals.daily);
	println!("weekly {} of {}h", percent(progress.weekly_ratio), goals.weekly);
	println!("global {} of {}h", percent(progress.global_ratio), goals.global);

	println!("\nlast {HISTOGRAM_DAYS} days:");
	let histogram = reports::daily_histogram(ledger, today, HISTOGRAM_DAYS);
	let max_seconds = histogram
		.iter()
		.map(|(_, duration)| duration.num_seconds())
		.max()
		.unwrap_or(0)
		.max(1);
	for (day, duration) in &histogram {
		let seconds = duration.num_seconds();
		let width = ((seconds as f64 / max_seconds as f64) * 24.0).round() as usize;
		println!(
			"{} {:>8} {}",
			day.format("%m/%d %a"),
			format_duration(*duration),
			if seconds == 0 { String::new() } else { "=".repeat(width.max(1)) }
		);
	}

	println!("\nby tag:");
	let shares = reports::tag_shares(ledger);
	if shares.is_empty() {
		println!("(none)");
	}
	for share in &shares {
		println!("{} | {:>5.1}% | {}", format_duration(share.total), share.share * 100.0, share.tag);
	}

	println!("\ntag trends (last {TREND_WEEKS} weeks, oldest first):");
	for trend in reports::weekly_trends(ledger, today, TREND_TAGS, TREND_WEEKS) {
		let points = trend
			.points
			.iter()
			.map(|point| format!("{:>6.1}h", point.num_seconds() as f64 / 3600.0))
			.collect::<Vec<_>>()
			.join(" ");
		println!("{points} | {}", trend.tag);
	}

	println!("\nactivity by weekday and hour:");
	let hour_ruler = (0..24)
		.step_by(3)
		.map(|hour| format!("{hour:<3}"))
		.collect::<String>();
	println!("    {hour_ruler}");
	let cells = reports::heatmap(ledger);
	let peak = cells.iter().flatten().copied().fold(0.0, f64::max);
	for (weekday, row) in cells.iter().enumerate() {
		let line = row
			.iter()
			.map(|hours| shade(*hours, peak))
			.collect::<String>();
		println!("{} {line}", WEEKDAYS[weekday]);
	}
}

fn shade(hours: f64, peak: f64) -> char {
	if hours <= 0.0 || peak <= 0.0 {
		return HEATMAP_SHADES[0];
	}
	let steps = (HEATMAP_SHADES.len() - 1) as f64;
	let index = ((hours / peak) * steps).ceil() as usize;
	HEATMAP_SHADES[index.clamp(1, HEATMAP_SHADES.len() - 1)]
}

fn percent(ratio: f64) -> String {
	format!("{:>3}%", (ratio * 100.0).floor() as i64)
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::{parse_duration_input, shade};

	#[test]
	fn parses_duration_inputs() {
		assert_eq!(parse_duration_input("1h30m").unwrap(), Duration::minutes(90));
		assert_eq!(parse_duration_input("90m").unwrap(), Duration::minutes(90));
		assert_eq!(parse_duration_input("1.5h").unwrap(), Duration::minutes(90));
		assert_eq!(parse_duration_input("45s").unwrap(), Duration::seconds(45));
		assert_eq!(parse_duration_input("3600").unwrap(), Duration::hours(1));
		assert_eq!(parse_duration_input("01:30:00").unwrap(), Duration::minutes(90));
		assert_eq!(parse_duration_input("2:30").unwrap(), Duration::seconds(150));
		assert!(parse_duration_input("").is_err());
		assert!(parse_duration_input("10x").is_err());
		assert!(parse_duration_input("1h30").is_err());
		assert!(parse_duration_input("-5").is_err());
		assert!(parse_duration_input("1e300").is_err());
		assert!(parse_duration_input("99999999999999999999h").is_err());
	}

	#[test]
	fn shades_scale_with_the_peak() {
		assert_eq!(shade(0.0, 4.0), ' ');
		assert_eq!(shade(4.0, 4.0), '@');
		assert_eq!(shade(0.1, 4.0), '.');
	}
}
