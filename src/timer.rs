use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time for the timer and for stamping new entries.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Stopped,
    Running,
    Paused,
}

impl TimerPhase {
    pub fn label(self) -> &'static str {
        match self {
            TimerPhase::Stopped => "stopped",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
        }
    }
}

/// Point-in-time view of the timer, produced without touching its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerReading {
    pub phase: TimerPhase,
    pub lap: Duration,
    pub session: Duration,
}

/// Lap and session accumulators driven by one running/paused flag.
///
/// The lap resets every time it is taken for logging; the session keeps
/// growing for the life of the timer.
#[derive(Debug, Clone)]
pub struct Timer {
    phase: TimerPhase,
    session_elapsed: Duration,
    lap_elapsed: Duration,
    last_tick: Option<DateTime<Utc>>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::Stopped,
            session_elapsed: Duration::zero(),
            lap_elapsed: Duration::zero(),
            last_tick: None,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) -> TimerPhase {
        match self.phase {
            TimerPhase::Stopped | TimerPhase::Paused => {
                self.phase = TimerPhase::Running;
                self.last_tick = Some(now);
            }
            TimerPhase::Running => {
                self.fold_running(now);
                self.phase = TimerPhase::Paused;
                self.last_tick = None;
            }
        }
        self.phase
    }

    pub fn current_lap(&self, now: DateTime<Utc>) -> Duration {
        self.lap_elapsed + self.pending(now)
    }

    pub fn current_session(&self, now: DateTime<Utc>) -> Duration {
        self.session_elapsed + self.pending(now)
    }

    pub fn tick(&self, now: DateTime<Utc>) -> TimerReading {
        TimerReading {
            phase: self.phase,
            lap: self.current_lap(now),
            session: self.current_session(now),
        }
    }

    /// Freezes the lap at `now`, returns it and stops the timer with a fresh lap.
    pub fn take_lap(&mut self, now: DateTime<Utc>) -> Duration {
        if self.phase == TimerPhase::Running {
            self.fold_running(now);
        }
        let lap = self.lap_elapsed;
        self.lap_elapsed = Duration::zero();
        self.phase = TimerPhase::Stopped;
        self.last_tick = None;
        lap
    }

    fn fold_running(&mut self, now: DateTime<Utc>) {
        let delta = self.pending(now);
        self.session_elapsed += delta;
        self.lap_elapsed += delta;
    }

    fn pending(&self, now: DateTime<Utc>) -> Duration {
        match (self.phase, self.last_tick) {
            (TimerPhase::Running, Some(last_tick)) if now > last_tick => now - last_tick,
            _ => Duration::zero(),
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
