//! Session timer
//!
//! Elapsed time is the number of one-second ticks received while running, not a
//! wall-clock delta. A suspended ticker therefore loses time; that drift is accepted.

use chrono::{DateTime, Utc};

/// Source of start/stop timestamps
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
pub enum TimerState {
    Idle,
    Running,
    Stopped,
}

/// Result of a successful stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerReading {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

/// Commands other surfaces may send to whoever owns the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Stop,
}

/// Secondary view of the timer; sees every tick and transition
pub trait TimerObserver {
    fn on_tick(&mut self, elapsed_seconds: u64);

    fn on_state_change(&mut self, state: TimerState, elapsed_seconds: u64);

    /// Observers returning false are dropped after the current notification
    fn is_attached(&self) -> bool {
        true
    }
}

pub struct Timer<C: Clock = SystemClock> {
    clock: C,
    state: TimerState,
    start_time: Option<DateTime<Utc>>,
    elapsed_seconds: u64,
    observers: Vec<Box<dyn TimerObserver + Send>>,
}

impl Timer<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Timer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Timer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: TimerState::Idle,
            start_time: None,
            elapsed_seconds: 0,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Elapsed time formatted for display
    pub fn display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    pub fn attach(&mut self, observer: Box<dyn TimerObserver + Send>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Begin timing; returns the captured start timestamp, or None if already running
    pub fn start(&mut self) -> Option<DateTime<Utc>> {
        if self.is_running() {
            return None;
        }
        let now = self.clock.now();
        self.start_time = Some(now);
        self.elapsed_seconds = 0;
        self.transition(TimerState::Running);
        Some(now)
    }

    /// One live second; ignored unless running
    pub fn tick(&mut self) {
        if !self.is_running() {
            return;
        }
        self.elapsed_seconds += 1;
        let elapsed = self.elapsed_seconds;
        for observer in self.observers.iter_mut() {
            observer.on_tick(elapsed);
        }
        self.observers.retain(|o| o.is_attached());
    }

    /// Finish timing; returns None if the timer was not running
    pub fn stop(&mut self) -> Option<TimerReading> {
        if !self.is_running() {
            return None;
        }
        let end_time = self.clock.now();
        let start_time = self.start_time.unwrap_or(end_time);
        self.transition(TimerState::Stopped);
        Some(TimerReading {
            start_time,
            end_time,
            elapsed_seconds: self.elapsed_seconds,
        })
    }

    /// Discard any timing and return to idle, whatever the current state
    pub fn reset(&mut self) {
        self.start_time = None;
        self.elapsed_seconds = 0;
        self.transition(TimerState::Idle);
    }

    fn transition(&mut self, state: TimerState) {
        self.state = state;
        let elapsed = self.elapsed_seconds;
        for observer in self.observers.iter_mut() {
            observer.on_state_change(state, elapsed);
        }
        self.observers.retain(|o| o.is_attached());
    }
}

/// `H:MM:SS` once an hour has passed, `M:SS` before that
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
