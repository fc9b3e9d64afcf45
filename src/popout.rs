//! Detached timer display
//!
//! A `Popout` mirrors the running timer on a secondary surface. It never counts on
//! its own: it only draws the elapsed value the timer pushes to it, and its stop
//! control sends the same `TimerCommand::Stop` the primary view handles. It closes
//! itself as soon as the timer leaves `Running`.
//!
//! Two surfaces exist: the terminal window title, which can only display, and a
//! second terminal (`TtySurface`) where pressing Enter presses the stop button.

use crossbeam_channel::Sender;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::timer::{format_elapsed, TimerCommand, TimerObserver, TimerState};

/// Somewhere a popout can draw
pub trait Surface {
    fn show(&mut self, label: &str, text: &str) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;

    /// Hand the popout's stop control to the surface; display-only surfaces drop it
    fn bind_stop(&mut self, _button: StopButton) {}
}

/// Label with control characters removed, safe inside escape sequences
fn printable(label: &str) -> String {
    label.chars().filter(|c| !c.is_control()).collect()
}

/// Draws into the terminal window title via OSC 0
pub struct TerminalTitle<W: Write> {
    out: W,
}

impl<W: Write> TerminalTitle<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Surface for TerminalTitle<W> {
    fn show(&mut self, label: &str, text: &str) -> io::Result<()> {
        write!(self.out, "\x1b]0;{} {}\x07", printable(label), text)?;
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        write!(self.out, "\x1b]0;\x07")?;
        self.out.flush()
    }
}

/// A second terminal showing the timer on one line
///
/// Every line typed on it presses the stop button.
pub struct TtySurface<W: Write> {
    out: W,
    input: Option<Box<dyn BufRead + Send>>,
}

impl TtySurface<File> {
    /// Use an already open terminal device, e.g. `/dev/pts/3`
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = OpenOptions::new().read(true).write(true).open(path)?;
        let input = BufReader::new(device.try_clone()?);
        Ok(Self::new(device, input))
    }
}

impl<W: Write> TtySurface<W> {
    pub fn new(out: W, input: impl BufRead + Send + 'static) -> Self {
        Self {
            out,
            input: Some(Box::new(input)),
        }
    }
}

impl<W: Write> Surface for TtySurface<W> {
    fn show(&mut self, label: &str, text: &str) -> io::Result<()> {
        write!(self.out, "\r\x1b[2K{}  {}  (Enter to stop)", printable(label), text)?;
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        writeln!(self.out, "\r\x1b[2KStopped")?;
        self.out.flush()
    }

    fn bind_stop(&mut self, button: StopButton) {
        let Some(input) = self.input.take() else {
            return;
        };
        thread::spawn(move || {
            for line in input.lines() {
                if line.is_err() || !button.is_open() || button.press() {
                    break;
                }
            }
        });
    }
}

/// Whether a terminal title can be drawn on
pub fn title_supported(is_terminal: bool, term: Option<&str>) -> bool {
    match term {
        Some(term) => is_terminal && !term.is_empty() && term != "dumb",
        None => false,
    }
}

fn title_available() -> bool {
    let term = std::env::var("TERM").ok();
    title_supported(io::stderr().is_terminal(), term.as_deref())
}

/// Surface for the current process, or None when the host cannot show one
pub fn detect_surface() -> Option<Box<dyn Surface + Send>> {
    if title_available() {
        Some(Box::new(TerminalTitle::new(io::stderr())))
    } else {
        None
    }
}

/// Opens a surface each time the timer is popped out
pub type OpenSurface = dyn Fn() -> io::Result<Box<dyn Surface + Send>>;

/// How this host pops the timer out: onto `tty` when given, else the window
/// title when there is one
pub fn surface_opener(tty: Option<PathBuf>) -> Option<Box<OpenSurface>> {
    match tty {
        Some(path) => Some(Box::new(move || -> io::Result<Box<dyn Surface + Send>> {
            Ok(Box::new(TtySurface::open(&path)?))
        })),
        None if title_available() => Some(Box::new(|| -> io::Result<Box<dyn Surface + Send>> {
            detect_surface().ok_or_else(|| io::Error::other("terminal title is not available"))
        })),
        None => None,
    }
}

/// The popout's single control
#[derive(Clone)]
pub struct StopButton {
    commands: Sender<TimerCommand>,
    open: Arc<AtomicBool>,
}

impl StopButton {
    /// Ask the timer owner to stop; does nothing once the popout has closed
    pub fn press(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.commands.send(TimerCommand::Stop).is_ok()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct Popout {
    label: String,
    surface: Box<dyn Surface + Send>,
    open: Arc<AtomicBool>,
    commands: Sender<TimerCommand>,
}

impl Popout {
    /// Open on `surface`, drawing the current elapsed value straight away
    pub fn open(
        label: impl Into<String>,
        surface: Box<dyn Surface + Send>,
        commands: Sender<TimerCommand>,
        elapsed_seconds: u64,
    ) -> Self {
        let mut popout = Self {
            label: label.into(),
            surface,
            open: Arc::new(AtomicBool::new(true)),
            commands,
        };
        let button = popout.stop_button();
        popout.surface.bind_stop(button);
        if let Err(e) = popout
            .surface
            .show(&popout.label, &format_elapsed(elapsed_seconds))
        {
            debug!("Popout surface failed to draw: {}", e);
        }
        popout
    }

    pub fn stop_button(&self) -> StopButton {
        StopButton {
            commands: self.commands.clone(),
            open: self.open.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.surface.close() {
                debug!("Popout surface failed to close: {}", e);
            }
        }
    }
}

impl TimerObserver for Popout {
    fn on_tick(&mut self, elapsed_seconds: u64) {
        if !self.is_open() {
            return;
        }
        if let Err(e) = self.surface.show(&self.label, &format_elapsed(elapsed_seconds)) {
            debug!("Popout surface failed to draw: {}", e);
        }
    }

    fn on_state_change(&mut self, state: TimerState, _elapsed_seconds: u64) {
        if state != TimerState::Running {
            self.close();
        }
    }

    fn is_attached(&self) -> bool {
        self.is_open()
    }
}

impl Drop for Popout {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Clock, Timer};
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(1_704_103_200, 0).unwrap()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSurface {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Surface for RecordingSurface {
        fn show(&mut self, label: &str, text: &str) -> io::Result<()> {
            self.log.lock().unwrap().push(format!("{} {}", label, text));
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.log.lock().unwrap().push("closed".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_popout_mirrors_timer_and_closes_on_stop() {
        let surface = RecordingSurface::default();
        let log = surface.log.clone();
        let (tx, _rx) = crossbeam_channel::unbounded();

        let mut timer = Timer::with_clock(FixedClock);
        timer.start();
        timer.tick();
        let popout = Popout::open("Prep for Pitch", Box::new(surface), tx, timer.elapsed_seconds());
        let button = popout.stop_button();
        timer.attach(Box::new(popout));

        timer.tick();
        timer.tick();
        timer.stop();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "Prep for Pitch 0:01",
                "Prep for Pitch 0:02",
                "Prep for Pitch 0:03",
                "closed"
            ]
        );
        assert!(!button.is_open());
        assert_eq!(timer.observer_count(), 0);
    }

    #[test]
    fn test_popout_closes_on_reset() {
        let surface = RecordingSurface::default();
        let log = surface.log.clone();
        let (tx, _rx) = crossbeam_channel::unbounded();

        let mut timer = Timer::with_clock(FixedClock);
        timer.start();
        timer.attach(Box::new(Popout::open("p", Box::new(surface), tx, 0)));
        timer.reset();

        assert_eq!(log.lock().unwrap().last().unwrap(), "closed");
        assert_eq!(timer.observer_count(), 0);
    }

    #[test]
    fn test_stop_button_sends_stop_command_only_while_open() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut timer = Timer::with_clock(FixedClock);
        timer.start();
        let popout = Popout::open("p", Box::new(RecordingSurface::default()), tx, 0);
        let button = popout.stop_button();
        timer.attach(Box::new(popout));

        assert!(button.press());
        assert_eq!(rx.try_recv().unwrap(), TimerCommand::Stop);

        // The owner of the timer handles the command the same way as its own stop
        timer.stop().unwrap();
        assert!(!button.press());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_terminal_title_escape_sequences() {
        let mut out = Vec::new();
        {
            let mut title = TerminalTitle::new(&mut out);
            title.show("Deck", "1:02:05").unwrap();
            title.close().unwrap();
        }
        assert_eq!(out, b"\x1b]0;Deck 1:02:05\x07\x1b]0;\x07");
    }

    #[test]
    fn test_terminal_title_strips_control_characters() {
        let mut out = Vec::new();
        TerminalTitle::new(&mut out)
            .show("Deck\x07\x1b]0;pwned", "0:01")
            .unwrap();
        assert_eq!(out, b"\x1b]0;Deck]0;pwned 0:01\x07");
    }

    #[test]
    fn test_tty_surface_line_presses_stop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let surface = TtySurface::new(Vec::new(), io::Cursor::new(b"\n".to_vec()));

        let mut timer = Timer::with_clock(FixedClock);
        timer.start();
        timer.attach(Box::new(Popout::open("Deck", Box::new(surface), tx, 0)));

        let command = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(command, TimerCommand::Stop);
        timer.stop().unwrap();
        assert_eq!(timer.observer_count(), 0);
    }

    #[test]
    fn test_title_support_detection() {
        assert!(title_supported(true, Some("xterm-256color")));
        assert!(!title_supported(true, Some("dumb")));
        assert!(!title_supported(true, None));
        assert!(!title_supported(false, Some("xterm")));
    }
}
