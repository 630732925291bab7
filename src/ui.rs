use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::{Duration, Local, NaiveDate};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use crossterm::{ExecutableCommand, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use crate::domain::{EntryField, format_duration, format_duration_precise, format_hours_short, optional_text};
use crate::engine::{Engine, ExportFormat};
use crate::goals::{GoalProgress, Streak};
use crate::reports::{HISTOGRAM_DAYS, TagShare, daily_histogram, tag_shares};
use crate::settings::Goals;
use crate::timer::{TimerPhase, TimerReading};

const TICK: StdDuration = StdDuration::from_millis(100);
const GOAL_BAR_WIDTH: usize = 20;
const HISTOGRAM_BAR_WIDTH: f64 = 16.0;
const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);

pub fn run_dashboard(engine: &mut Engine) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, engine);

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	engine: &mut Engine,
) -> Result<(), Box<dyn Error>> {
	let mut app = App::new(engine);

	loop {
		let view = build_view(&app, engine);
		app.clamp_selection(&view);
		terminal.draw(|frame| draw_dashboard(frame, &app, &view))?;

		if event::poll(TICK)? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}

				let should_quit = match &app.mode {
					InputMode::Prompt(_) => handle_prompt_key(&mut app, key.code, engine),
					InputMode::Select(_) => handle_select_key(&mut app, key.code, engine),
					InputMode::Normal => handle_normal_key(&mut app, key.code, engine, &view),
				};

				if should_quit {
					break;
				}
			}
		}
	}

	Ok(())
}

fn draw_dashboard(frame: &mut Frame, app: &App, view: &ViewModel) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(7), Constraint::Min(10), Constraint::Length(5)])
		.split(frame.area());

	let top = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
		.split(layout[0]);

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
		.split(layout[1]);

	render_timer_panel(frame, top[0], app, view);
	render_goals_panel(frame, top[1], view);
	render_log_panel(frame, body[0], app, view);
	render_stats_panel(frame, body[1], view);
	render_footer(frame, layout[2], app);

	if let InputMode::Select(select) = &app.mode {
		render_select_popup(frame, select);
	}
}

fn render_timer_panel(frame: &mut Frame, area: Rect, app: &App, view: &ViewModel) {
	let reading = &view.reading;
	let phase_style = match reading.phase {
		TimerPhase::Running => Style::default().fg(Color::LightGreen).add_modifier(Modifier::BOLD),
		TimerPhase::Paused => Style::default().fg(Color::LightYellow).add_modifier(Modifier::BOLD),
		TimerPhase::Stopped => Style::default().fg(Color::DarkGray),
	};

	let lines = vec![
		Line::from(vec![
			Span::styled(
				format_duration_precise(reading.lap),
				Style::default().add_modifier(Modifier::BOLD),
			),
			Span::raw("  "),
			Span::styled(reading.phase.label().to_uppercase(), phase_style),
		]),
		Line::from(format!("Session {}", format_duration_precise(reading.session))),
		Line::from(format!(
			"Tag {} | today {}",
			app.current_tag,
			format_hours_short(view.current_tag_today)
		)),
		Line::from(format!(
			"Streak {} days (latest run {})",
			view.streak.current, view.streak.latest_run
		)),
	];

	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Timer"));
	frame.render_widget(panel, area);
}

fn render_goals_panel(frame: &mut Frame, area: Rect, view: &ViewModel) {
	let progress = &view.progress;
	let goals = &view.goals;
	let lines = vec![
		goal_line("Daily ", progress.daily_ratio, progress.today, goals.daily),
		goal_line("Weekly", progress.weekly_ratio, progress.week, goals.weekly),
		goal_line("Global", progress.global_ratio, progress.all_time, goals.global),
	];

	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Goals"));
	frame.render_widget(panel, area);
}

fn goal_line(label: &str, ratio: f64, total: Duration, goal_hours: f64) -> Line<'static> {
	let filled = ((ratio * GOAL_BAR_WIDTH as f64).round() as usize).min(GOAL_BAR_WIDTH);
	let style = if ratio >= 1.0 {
		Style::default().fg(Color::LightGreen)
	} else {
		Style::default().fg(Color::LightBlue)
	};

	Line::from(vec![
		Span::raw(format!("{label} ")),
		Span::styled("=".repeat(filled), style),
		Span::styled("-".repeat(GOAL_BAR_WIDTH - filled), Style::default().fg(Color::DarkGray)),
		Span::raw(format!(
			" {:>3}% ({} / {goal_hours}h)",
			(ratio * 100.0).floor() as i64,
			format_hours_short(total)
		)),
	])
}

fn render_log_panel(frame: &mut Frame, area: Rect, app: &App, view: &ViewModel) {
	let items = if view.log_rows.is_empty() {
		vec![ListItem::new("(no entries)")]
	} else {
		view.log_rows
			.iter()
			.map(|row| ListItem::new(row.line.clone()))
			.collect::<Vec<_>>()
	};

	let mut state = ListState::default();
	if !view.log_rows.is_empty() {
		state.select(Some(app.log_index.min(view.log_rows.len() - 1)));
	}

	let title = match &app.tag_filter {
		Some(tag) => format!("Log: {tag} ({} entries)", view.log_rows.len()),
		None => format!("Log: all tags ({} entries)", view.log_rows.len()),
	};
	let list = List::new(items)
		.block(
			Block::default()
				.borders(Borders::ALL)
				.title(title)
				.border_style(Style::default().fg(FOCUSED_PANEL_BORDER_COLOR)),
		)
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_stats_panel(frame: &mut Frame, area: Rect, view: &ViewModel) {
	let mut lines = Vec::new();
	lines.push(Line::from(format!("Last {HISTOGRAM_DAYS} Days")));

	let max_seconds = view
		.histogram
		.iter()
		.map(|(_, duration)| duration.num_seconds())
		.max()
		.unwrap_or(0)
		.max(1);
	for (day, duration) in &view.histogram {
		let seconds = duration.num_seconds();
		let width = ((seconds as f64 / max_seconds as f64) * HISTOGRAM_BAR_WIDTH).round() as usize;
		let style = if *day == view.today {
			Style::default().fg(Color::LightYellow)
		} else {
			Style::default()
		};
		lines.push(Line::from(vec![
			Span::styled(format!("{} {:>8} ", day.format("%m/%d"), format_duration(*duration)), style),
			Span::styled(
				if seconds == 0 { String::new() } else { "=".repeat(width.max(1)) },
				Style::default().fg(Color::LightGreen),
			),
		]));
	}

	lines.push(Line::from(""));
	lines.push(Line::from("By Tag (all time)"));
	if view.shares.is_empty() {
		lines.push(Line::from("(none)"));
	} else {
		for share in view.shares.iter().take(6) {
			lines.push(Line::from(format!(
				"{:>5.1}% {} | {}",
				share.share * 100.0,
				format_hours_short(share.total),
				share.tag
			)));
		}
	}

	let panel = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Stats"));
	frame.render_widget(panel, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
	let footer_lines = match &app.mode {
		InputMode::Normal => vec![
			Line::from("space start/pause | enter/l log lap | u undo | e edit | d delete | j/k move | q quit"),
			Line::from("f filter | [ ] lap tag | t add tag | r remove tag | g goals | x export | i import"),
			Line::from(app.status.clone()),
		],
		InputMode::Prompt(prompt) => vec![
			Line::from(prompt.title.clone()),
			Line::from(format!("> {}", prompt.input)),
			Line::from(format!("Enter submit | Esc cancel | {}", app.status)),
		],
		InputMode::Select(select) => vec![
			Line::from(select.title.clone()),
			Line::from(format!(
				"Selected: {}",
				select
					.selected_option()
					.map(|option| option.label.as_str())
					.unwrap_or("(none)")
			)),
			Line::from("j/k or arrows move | Enter choose | Esc cancel"),
		],
	};

	let footer = Paragraph::new(footer_lines).block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_select_popup(frame: &mut Frame, select: &SelectState) {
	let area = centered_rect(50, 45, frame.area());
	frame.render_widget(Clear, area);

	let items = if select.options.is_empty() {
		vec![ListItem::new("(no choices)")]
	} else {
		select
			.options
			.iter()
			.map(|option| ListItem::new(option.label.clone()))
			.collect::<Vec<_>>()
	};

	let list = List::new(items)
		.block(Block::default().borders(Borders::ALL).title(select.title.clone()))
		.highlight_symbol(">> ")
		.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR));

	let mut state = ListState::default();
	if !select.options.is_empty() {
		state.select(Some(select.selected.min(select.options.len().saturating_sub(1))));
	}
	frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn handle_normal_key(app: &mut App, code: KeyCode, engine: &mut Engine, view: &ViewModel) -> bool {
	match code {
		KeyCode::Char('q') | KeyCode::Esc => true,
		KeyCode::Char(' ') => {
			let phase = engine.toggle();
			app.status = format!("Timer {}", phase.label());
			false
		}
		KeyCode::Enter | KeyCode::Char('l') => {
			app.mode = InputMode::Prompt(PromptState::new(
				format!("Task for this lap ({})", format_duration_precise(engine.reading().lap)),
				PromptKind::LapTask,
			));
			false
		}
		KeyCode::Up | KeyCode::Char('k') => {
			app.move_log_selection(-1, view);
			false
		}
		KeyCode::Down | KeyCode::Char('j') => {
			app.move_log_selection(1, view);
			false
		}
		KeyCode::Char('u') => {
			match engine.ledger().entries().last() {
				Some(entry) => {
					let label = entry_label(entry.id, &entry.task, &entry.tag);
					app.mode = InputMode::Select(confirm_select(format!("Undo {label}?"), SelectKind::UndoConfirm));
				}
				None => app.status = "Nothing to undo".to_string(),
			}
			false
		}
		KeyCode::Char('d') => {
			match view.log_rows.get(app.log_index) {
				Some(row) => {
					app.mode = InputMode::Select(confirm_select(
						format!("Delete {}?", row.label),
						SelectKind::DeleteConfirm { id: row.id },
					));
				}
				None => app.status = "No selected entry to delete".to_string(),
			}
			false
		}
		KeyCode::Char('e') => {
			match view.log_rows.get(app.log_index) {
				Some(row) => {
					app.mode = InputMode::Select(SelectState::new(
						format!("Edit {}", row.label),
						SelectKind::EditField { id: row.id },
						vec![
							SelectOption::new("Task description", "task"),
							SelectOption::new("Tag", "tag"),
						],
					));
				}
				None => app.status = "No selected entry to edit".to_string(),
			}
			false
		}
		KeyCode::Char('f') => {
			app.cycle_filter(&engine.settings().tags);
			app.log_index = 0;
			app.status = match &app.tag_filter {
				Some(tag) => format!("Showing {tag}"),
				None => "Showing all tags".to_string(),
			};
			false
		}
		KeyCode::Char(']') => {
			app.shift_current_tag(1, &engine.settings().tags);
			false
		}
		KeyCode::Char('[') => {
			app.shift_current_tag(-1, &engine.settings().tags);
			false
		}
		KeyCode::Char('t') => {
			app.mode = InputMode::Prompt(PromptState::new("New tag name", PromptKind::AddTag));
			false
		}
		KeyCode::Char('r') => {
			let options = engine
				.settings()
				.tags
				.iter()
				.map(|tag| SelectOption::new(tag.clone(), tag.clone()))
				.collect::<Vec<_>>();
			if options.is_empty() {
				app.status = "No tags to remove".to_string();
			} else {
				app.mode = InputMode::Select(SelectState::new(
					"Remove tag (logged entries keep it)",
					SelectKind::RemoveTag,
					options,
				));
			}
			false
		}
		KeyCode::Char('g') => {
			let goals = &engine.settings().goals;
			let mut prompt = PromptState::new("Goals in hours: daily weekly global", PromptKind::Goals);
			prompt.input = format!("{} {} {}", goals.daily, goals.weekly, goals.global);
			app.mode = InputMode::Prompt(prompt);
			false
		}
		KeyCode::Char('x') => {
			app.mode = InputMode::Prompt(PromptState::new(
				"Export to path (.jsonl records, .csv spreadsheet, otherwise table)",
				PromptKind::ExportPath,
			));
			false
		}
		KeyCode::Char('i') => {
			app.mode = InputMode::Prompt(PromptState::new(
				"Import from path (replaces the whole ledger)",
				PromptKind::ImportPath,
			));
			false
		}
		_ => false,
	}
}

fn handle_prompt_key(app: &mut App, code: KeyCode, engine: &mut Engine) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Input cancelled".to_string();
		}
		KeyCode::Backspace => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.pop();
			}
		}
		KeyCode::Char(value) => {
			if let InputMode::Prompt(prompt) = &mut app.mode {
				prompt.input.push(value);
			}
		}
		KeyCode::Enter => {
			let prompt = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Prompt(prompt) => prompt,
				InputMode::Normal | InputMode::Select(_) => return false,
			};

			match submit_prompt(app, prompt.clone(), engine) {
				Ok(PromptOutcome::NextPrompt(next_prompt)) => app.mode = InputMode::Prompt(next_prompt),
				Ok(PromptOutcome::Select(select)) => app.mode = InputMode::Select(select),
				Ok(PromptOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Prompt(prompt);
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn handle_select_key(app: &mut App, code: KeyCode, engine: &mut Engine) -> bool {
	match code {
		KeyCode::Esc => {
			app.mode = InputMode::Normal;
			app.status = "Selection cancelled".to_string();
		}
		KeyCode::Up | KeyCode::Char('k') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(-1);
			}
		}
		KeyCode::Down | KeyCode::Char('j') => {
			if let InputMode::Select(select) = &mut app.mode {
				select.move_selection(1);
			}
		}
		KeyCode::Enter => {
			let select = match std::mem::replace(&mut app.mode, InputMode::Normal) {
				InputMode::Select(select) => select,
				_ => return false,
			};

			match submit_select(app, select.clone(), engine) {
				Ok(SelectOutcome::NextPrompt(prompt)) => app.mode = InputMode::Prompt(prompt),
				Ok(SelectOutcome::Done(message)) => {
					app.mode = InputMode::Normal;
					app.status = message;
				}
				Err(err) => {
					app.mode = InputMode::Normal;
					app.status = format!("error: {err}");
				}
			}
		}
		_ => {}
	}

	false
}

fn submit_prompt(app: &mut App, prompt: PromptState, engine: &mut Engine) -> Result<PromptOutcome, String> {
	match prompt.kind {
		PromptKind::LapTask => {
			let task = prompt.input.trim().to_string();
			Ok(PromptOutcome::Select(build_lap_tag_select(app, engine, task)))
		}
		PromptKind::LapNote { task, tag } => {
			let entry = engine
				.log_lap(&task, &tag, optional_text(&prompt.input))
				.map_err(|err| err.to_string())?;
			app.current_tag = entry.tag.clone();
			app.log_index = 0;
			Ok(PromptOutcome::Done(format!(
				"Logged #{} {} | {} | {}",
				entry.id,
				format_duration_precise(entry.lap_duration),
				entry.tag,
				entry.task
			)))
		}
		PromptKind::LapCustomTag { task } => {
			let tag = optional_text(&prompt.input).ok_or_else(|| "tag is required".to_string())?;
			Ok(PromptOutcome::NextPrompt(PromptState::new(
				"Note (optional)",
				PromptKind::LapNote { task, tag },
			)))
		}
		PromptKind::EditValue { id, field } => {
			engine
				.edit_entry(id, field, &prompt.input)
				.map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(format!("Updated {field} of #{id}")))
		}
		PromptKind::AddTag => {
			let tag = engine.add_tag(&prompt.input).map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(format!("Added tag {tag}")))
		}
		PromptKind::Goals => {
			let values = prompt
				.input
				.split(|ch: char| ch == ',' || ch.is_whitespace())
				.filter(|value| !value.is_empty())
				.collect::<Vec<_>>();
			let [daily, weekly, global] = values.as_slice() else {
				return Err("enter three numbers: daily weekly global".to_string());
			};
			engine
				.set_goals(daily, weekly, global)
				.map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done("Goals saved".to_string()))
		}
		PromptKind::ExportPath => {
			let path = required_path(&prompt.input)?;
			let count = engine
				.export(&path, ExportFormat::for_path(&path))
				.map_err(|err| err.to_string())?;
			Ok(PromptOutcome::Done(format!("Exported {count} entries to {}", path.display())))
		}
		PromptKind::ImportPath => {
			let path = required_path(&prompt.input)?;
			let count = engine.import(&path).map_err(|err| err.to_string())?;
			app.log_index = 0;
			Ok(PromptOutcome::Done(format!("Imported {count} entries from {}", path.display())))
		}
	}
}

fn submit_select(app: &mut App, select: SelectState, engine: &mut Engine) -> Result<SelectOutcome, String> {
	let selected_value = select
		.selected_option()
		.map(|option| option.value.clone())
		.ok_or_else(|| "no option selected".to_string())?;

	match select.kind {
		SelectKind::LapTag { task } => {
			if selected_value.is_empty() {
				return Ok(SelectOutcome::NextPrompt(PromptState::new(
					"Tag for this lap",
					PromptKind::LapCustomTag { task },
				)));
			}
			Ok(SelectOutcome::NextPrompt(PromptState::new(
				"Note (optional)",
				PromptKind::LapNote {
					task,
					tag: selected_value,
				},
			)))
		}
		SelectKind::UndoConfirm => {
			if selected_value != "yes" {
				return Ok(SelectOutcome::Done("Undo cancelled".to_string()));
			}
			let entry = engine.undo_last().map_err(|err| err.to_string())?;
			Ok(SelectOutcome::Done(format!(
				"Removed {}",
				entry_label(entry.id, &entry.task, &entry.tag)
			)))
		}
		SelectKind::DeleteConfirm { id } => {
			if selected_value != "yes" {
				return Ok(SelectOutcome::Done("Delete cancelled".to_string()));
			}
			let entry = engine.delete_entry(id).map_err(|err| err.to_string())?;
			app.log_index = app.log_index.saturating_sub(1);
			Ok(SelectOutcome::Done(format!(
				"Deleted {} (later ids shifted down)",
				entry_label(id, &entry.task, &entry.tag)
			)))
		}
		SelectKind::RemoveTag => {
			let tag = engine.remove_tag(&selected_value).map_err(|err| err.to_string())?;
			if app.tag_filter.as_deref() == Some(tag.as_str()) {
				app.tag_filter = None;
			}
			Ok(SelectOutcome::Done(format!("Removed tag {tag}")))
		}
		SelectKind::EditField { id } => {
			let field = selected_value
				.parse::<EntryField>()
				.map_err(|err| err.to_string())?;
			let current = engine
				.ledger()
				.entry(id)
				.map(|entry| match field {
					EntryField::Task => entry.task.clone(),
					EntryField::Tag => entry.tag.clone(),
				})
				.unwrap_or_default();
			let mut prompt = PromptState::new(format!("New {field} for #{id}"), PromptKind::EditValue { id, field });
			prompt.input = current;
			Ok(SelectOutcome::NextPrompt(prompt))
		}
	}
}

fn build_lap_tag_select(app: &App, engine: &Engine, task: String) -> SelectState {
	let mut options = engine
		.settings()
		.tags
		.iter()
		.map(|tag| SelectOption::new(tag.clone(), tag.clone()))
		.collect::<Vec<_>>();
	options.push(SelectOption::new("Other...", ""));

	let mut select = SelectState::new("Tag for this lap", SelectKind::LapTag { task }, options);
	if let Some(position) = engine.settings().tags.iter().position(|tag| tag == &app.current_tag) {
		select.selected = position;
	}
	select
}

fn confirm_select(title: String, kind: SelectKind) -> SelectState {
	SelectState::new(
		title,
		kind,
		vec![SelectOption::new("Cancel", "no"), SelectOption::new("Yes", "yes")],
	)
}

fn build_view(app: &App, engine: &Engine) -> ViewModel {
	let today = engine.today();
	let ledger = engine.ledger();

	let log_rows = engine
		.filtered_entries(app.tag_filter.as_deref())
		.into_iter()
		.map(|entry| {
			let mut spans = vec![
				Span::styled(format!("{:>4} ", entry.id), Style::default().fg(Color::DarkGray)),
				Span::raw(format!(
					"{} ",
					entry.timestamp.with_timezone(&Local).format("%d.%m %H:%M")
				)),
				Span::styled(
					format_duration_precise(entry.lap_duration),
					Style::default().fg(Color::LightCyan),
				),
				Span::raw(" | "),
				Span::styled(entry.tag.clone(), Style::default().fg(Color::LightYellow)),
				Span::raw(format!(" | {}", entry.task)),
			];
			if let Some(note) = &entry.note {
				spans.push(Span::styled(format!(" | {note}"), Style::default().fg(Color::DarkGray)));
			}
			LogRow {
				id: entry.id,
				label: entry_label(entry.id, &entry.task, &entry.tag),
				line: Line::from(spans),
			}
		})
		.collect();

	ViewModel {
		today,
		reading: engine.reading(),
		progress: engine.goal_progress(),
		goals: engine.settings().goals.clone(),
		streak: engine.streak(),
		current_tag_today: engine.tag_today(&app.current_tag),
		log_rows,
		histogram: daily_histogram(ledger, today, HISTOGRAM_DAYS),
		shares: tag_shares(ledger),
	}
}

fn entry_label(id: usize, task: &str, tag: &str) -> String {
	format!("#{id} {task} [{tag}]")
}

fn required_path(input: &str) -> Result<PathBuf, String> {
	optional_text(input)
		.map(PathBuf::from)
		.ok_or_else(|| "path is required".to_string())
}

#[derive(Debug, Clone)]
enum PromptOutcome {
	NextPrompt(PromptState),
	Select(SelectState),
	Done(String),
}

#[derive(Debug, Clone)]
enum SelectOutcome {
	NextPrompt(PromptState),
	Done(String),
}

#[derive(Debug, Clone)]
struct PromptState {
	title: String,
	input: String,
	kind: PromptKind,
}

impl PromptState {
	fn new(title: impl Into<String>, kind: PromptKind) -> Self {
		Self {
			title: title.into(),
			input: String::new(),
			kind,
		}
	}
}

#[derive(Debug, Clone)]
struct SelectState {
	title: String,
	options: Vec<SelectOption>,
	selected: usize,
	kind: SelectKind,
}

impl SelectState {
	fn new(title: impl Into<String>, kind: SelectKind, options: Vec<SelectOption>) -> Self {
		Self {
			title: title.into(),
			options,
			selected: 0,
			kind,
		}
	}

	fn move_selection(&mut self, delta: i32) {
		if self.options.is_empty() {
			self.selected = 0;
			return;
		}

		if delta > 0 {
			self.selected = (self.selected + delta as usize).min(self.options.len() - 1);
		} else {
			self.selected = self.selected.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	fn selected_option(&self) -> Option<&SelectOption> {
		self.options.get(self.selected)
	}
}

#[derive(Debug, Clone)]
struct SelectOption {
	label: String,
	value: String,
}

impl SelectOption {
	fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			value: value.into(),
		}
	}
}

#[derive(Debug, Clone)]
enum PromptKind {
	LapTask,
	LapCustomTag { task: String },
	LapNote { task: String, tag: String },
	EditValue { id: usize, field: EntryField },
	AddTag,
	Goals,
	ExportPath,
	ImportPath,
}

#[derive(Debug, Clone)]
enum SelectKind {
	LapTag { task: String },
	UndoConfirm,
	DeleteConfirm { id: usize },
	RemoveTag,
	EditField { id: usize },
}

#[derive(Debug, Clone)]
enum InputMode {
	Normal,
	Prompt(PromptState),
	Select(SelectState),
}

#[derive(Debug, Clone)]
struct App {
	log_index: usize,
	tag_filter: Option<String>,
	current_tag: String,
	mode: InputMode,
	status: String,
}

impl App {
	fn new(engine: &Engine) -> Self {
		let current_tag = engine
			.ledger()
			.entries()
			.last()
			.map(|entry| entry.tag.clone())
			.or_else(|| engine.settings().tags.first().cloned())
			.unwrap_or_else(|| crate::domain::DEFAULT_TAG.to_string());
		Self {
			log_index: 0,
			tag_filter: None,
			current_tag,
			mode: InputMode::Normal,
			status: "Ready".to_string(),
		}
	}

	fn clamp_selection(&mut self, view: &ViewModel) {
		if view.log_rows.is_empty() {
			self.log_index = 0;
		} else {
			self.log_index = self.log_index.min(view.log_rows.len() - 1);
		}
	}

	fn move_log_selection(&mut self, delta: i32, view: &ViewModel) {
		if view.log_rows.is_empty() {
			self.log_index = 0;
			return;
		}

		if delta > 0 {
			self.log_index = (self.log_index + delta as usize).min(view.log_rows.len() - 1);
		} else {
			self.log_index = self.log_index.saturating_sub(delta.unsigned_abs() as usize);
		}
	}

	/// All tags, then each known tag in order, then back to all.
	fn cycle_filter(&mut self, tags: &[String]) {
		self.tag_filter = match &self.tag_filter {
			None => tags.first().cloned(),
			Some(current) => tags
				.iter()
				.position(|tag| tag == current)
				.and_then(|position| tags.get(position + 1))
				.cloned(),
		};
	}

	fn shift_current_tag(&mut self, delta: i32, tags: &[String]) {
		if tags.is_empty() {
			return;
		}
		let position = tags.iter().position(|tag| tag == &self.current_tag).unwrap_or(0) as i32;
		let next = (position + delta).rem_euclid(tags.len() as i32) as usize;
		self.current_tag = tags[next].clone();
		self.status = format!("Lap tag: {}", self.current_tag);
	}
}

struct ViewModel {
	today: NaiveDate,
	reading: TimerReading,
	progress: GoalProgress,
	goals: Goals,
	streak: Streak,
	current_tag_today: Duration,
	log_rows: Vec<LogRow>,
	histogram: Vec<(NaiveDate, Duration)>,
	shares: Vec<TagShare>,
}

struct LogRow {
	id: usize,
	label: String,
	line: Line<'static>,
}

#[cfg(test)]
mod tests {
	use super::{App, InputMode};

	fn app() -> App {
		App {
			log_index: 0,
			tag_filter: None,
			current_tag: "Work".to_string(),
			mode: InputMode::Normal,
			status: String::new(),
		}
	}

	#[test]
	fn filter_cycles_through_known_tags_and_back() {
		let tags = vec!["Work".to_string(), "Study".to_string()];
		let mut app = app();
		app.cycle_filter(&tags);
		assert_eq!(app.tag_filter.as_deref(), Some("Work"));
		app.cycle_filter(&tags);
		assert_eq!(app.tag_filter.as_deref(), Some("Study"));
		app.cycle_filter(&tags);
		assert_eq!(app.tag_filter, None);
	}

	#[test]
	fn lap_tag_wraps_around() {
		let tags = vec!["Work".to_string(), "Study".to_string(), "Play".to_string()];
		let mut app = app();
		app.shift_current_tag(-1, &tags);
		assert_eq!(app.current_tag, "Play");
		app.shift_current_tag(1, &tags);
		assert_eq!(app.current_tag, "Work");
	}
}
