//! Terminal workflows: the tracking dashboard, process management, instance
//! metadata editing and the read-only listings

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use log::{debug, warn};
use std::io::{self, BufRead, Read, Write};
use std::thread;
use std::time::Duration;

use crate::client::ApiClient;
use crate::fields::{FieldKind, MetadataSchema, MetadataValues};
use crate::form::{initial_values, prompt_form, prompt_schema};
use crate::models::{
    CreateProcess, Instance, InstanceStats, Process, StartInstance, UpdateInstance, UpdateProcess,
};
use crate::popout::{OpenSurface, Popout};
use crate::session::Session;
use crate::timer::{format_elapsed, Timer, TimerCommand};

type DynError = Box<dyn std::error::Error>;

/// Input lines delivered over a channel, readable as a `BufRead`
///
/// A reader thread owns the underlying input so the dashboard can select over
/// typed lines together with the ticker, while the form prompts still read
/// line by line.
pub struct LineChannel {
    receiver: Receiver<String>,
    buffer: Vec<u8>,
    position: usize,
}

impl LineChannel {
    pub fn spawn<R: BufRead + Send + 'static>(input: R) -> Self {
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Input reader stopped: {}", e);
                        break;
                    }
                }
            }
        });
        Self {
            receiver: rx,
            buffer: Vec::new(),
            position: 0,
        }
    }

    pub fn receiver(&self) -> Receiver<String> {
        self.receiver.clone()
    }
}

impl Read for LineChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for LineChannel {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.position >= self.buffer.len() {
            match self.receiver.recv() {
                Ok(line) => {
                    self.buffer = format!("{}\n", line).into_bytes();
                    self.position = 0;
                }
                // Reader thread finished: EOF
                Err(_) => return Ok(&[]),
            }
        }
        Ok(&self.buffer[self.position..])
    }

    fn consume(&mut self, amt: usize) {
        self.position = (self.position + amt).min(self.buffer.len());
    }
}

/// Opens a fresh popout surface each time the user pops the timer out
pub type SurfaceFactory<'a> = &'a OpenSurface;

fn choose_process<W: Write>(
    processes: &[Process],
    lines: &mut LineChannel,
    out: &mut W,
) -> Result<Option<Process>, DynError> {
    print_processes(processes, out)?;
    loop {
        write!(out, "Select a process by number (q to quit): ")?;
        out.flush()?;
        let mut answer = String::new();
        if lines.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        let answer = answer.trim();
        if answer == "q" {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(n) if n >= 1 && n <= processes.len() => return Ok(Some(processes[n - 1].clone())),
            _ => writeln!(out, "Enter a number between 1 and {}", processes.len())?,
        }
    }
}

struct Tracker<'a, W: Write> {
    client: &'a ApiClient,
    session: &'a Session,
    process: Process,
    timer: Timer,
    active: Option<Instance>,
    completed: Vec<Instance>,
    commands: Sender<TimerCommand>,
    surfaces: Option<SurfaceFactory<'a>>,
    out: &'a mut W,
}

impl<'a, W: Write> Tracker<'a, W> {
    fn start(&mut self) -> io::Result<()> {
        let Some(start_time) = self.timer.start() else {
            return Ok(());
        };
        let request = StartInstance {
            process_id: Some(self.process.id),
            start_time: Some(start_time),
            metadata: None,
        };
        match self.client.start_instance(self.session, &request) {
            Ok(instance) => {
                writeln!(
                    self.out,
                    "Started '{}' (instance {}). Enter or s to stop{}.",
                    self.process.name,
                    instance.id,
                    if self.surfaces.is_some() { ", p to pop out" } else { "" }
                )?;
                self.active = Some(instance);
            }
            Err(e) => {
                // Nothing was recorded, so the running timer would be meaningless
                self.timer.reset();
                writeln!(self.out, "Could not start: {}", e)?;
            }
        }
        Ok(())
    }

    fn stop(&mut self, lines: &mut LineChannel) -> io::Result<()> {
        let Some(reading) = self.timer.stop() else {
            return Ok(());
        };
        writeln!(self.out)?;
        writeln!(
            self.out,
            "Stopped at {}",
            format_elapsed(reading.elapsed_seconds)
        )?;
        let Some(instance) = self.active.take() else {
            return Ok(());
        };

        let metadata = if self.process.metadata_schema.is_empty() {
            None
        } else {
            match prompt_form(
                &self.process.metadata_schema,
                &MetadataValues::new(),
                lines,
                self.out,
            ) {
                Ok(values) => Some(values),
                Err(e) => {
                    warn!("Metadata not collected: {}", e);
                    None
                }
            }
        };

        let request = UpdateInstance {
            end_time: Some(reading.end_time),
            metadata,
        };
        match self.client.update_instance(self.session, instance.id, &request) {
            Ok(saved) => {
                writeln!(
                    self.out,
                    "Saved instance {} ({})",
                    saved.id,
                    format_elapsed(saved.duration_seconds.unwrap_or(0).max(0) as u64)
                )?;
                self.completed.push(saved);
            }
            Err(e) => writeln!(self.out, "Could not save instance {}: {}", instance.id, e)?,
        }
        Ok(())
    }

    fn pop_out(&mut self) -> io::Result<()> {
        if !self.timer.is_running() || self.timer.observer_count() > 0 {
            return Ok(());
        }
        let Some(surfaces) = self.surfaces else {
            return writeln!(self.out, "Pop-out is not available in this terminal");
        };
        match surfaces() {
            Ok(surface) => {
                let popout = Popout::open(
                    self.process.name.clone(),
                    surface,
                    self.commands.clone(),
                    self.timer.elapsed_seconds(),
                );
                self.timer.attach(Box::new(popout));
            }
            Err(e) => writeln!(self.out, "Could not pop out: {}", e)?,
        }
        Ok(())
    }

    fn draw(&mut self) -> io::Result<()> {
        write!(self.out, "\r{}  {}", self.process.name, self.timer.display())?;
        self.out.flush()
    }
}

/// Select a process, then start and stop timed instances of it until `q`
///
/// Returns the instances completed during the session. `surfaces` is None when
/// the host has nowhere to pop the timer out to.
pub fn track<R: BufRead + Send + 'static, W: Write>(
    client: &ApiClient,
    session: &Session,
    process_id: Option<i64>,
    input: R,
    out: &mut W,
    surfaces: Option<SurfaceFactory<'_>>,
) -> Result<Vec<Instance>, DynError> {
    let mut lines = LineChannel::spawn(input);
    let process = match process_id {
        Some(id) => client
            .get_process(session, id)
            .map_err(|e| format!("Process {}: {}", id, e))?,
        None => {
            let processes = client.list_processes(session)?;
            if processes.is_empty() {
                writeln!(out, "No processes yet. Create one with `create-process`.")?;
                return Ok(Vec::new());
            }
            match choose_process(&processes, &mut lines, out)? {
                Some(process) => process,
                None => return Ok(Vec::new()),
            }
        }
    };
    writeln!(out, "Tracking '{}'. Enter to start, q to quit.", process.name)?;

    let (commands_tx, commands_rx) = unbounded::<TimerCommand>();
    let ticker = tick(Duration::from_secs(1));
    let line_rx = lines.receiver();

    let mut tracker = Tracker {
        client,
        session,
        process,
        timer: Timer::new(),
        active: None,
        completed: Vec::new(),
        commands: commands_tx,
        surfaces,
        out,
    };

    loop {
        select! {
            recv(ticker) -> _ => {
                if tracker.timer.is_running() {
                    tracker.timer.tick();
                    tracker.draw()?;
                }
            }
            recv(commands_rx) -> command => {
                if let Ok(TimerCommand::Stop) = command {
                    tracker.stop(&mut lines)?;
                }
            }
            recv(line_rx) -> line => {
                let Ok(line) = line else {
                    // Input closed: keep whatever is running
                    tracker.stop(&mut lines)?;
                    break;
                };
                match (tracker.timer.is_running(), line.trim()) {
                    (false, "" | "start") => tracker.start()?,
                    (false, "q") => break,
                    (true, "" | "s") => tracker.stop(&mut lines)?,
                    (true, "p") => tracker.pop_out()?,
                    (true, "q") => writeln!(tracker.out, "Stop the timer first (s)")?,
                    (_, other) => writeln!(tracker.out, "Unknown command '{}'", other)?,
                }
            }
        }
    }

    Ok(tracker.completed)
}

/// Re-fill the metadata of a stored instance
pub fn edit_instance<R: BufRead, W: Write>(
    client: &ApiClient,
    session: &Session,
    id: i64,
    input: &mut R,
    out: &mut W,
) -> Result<Instance, DynError> {
    let instance = client.get_instance(session, id)?;
    if instance.metadata_schema.is_empty() {
        return Err(format!("Process '{}' has no metadata fields", instance.process_name).into());
    }
    writeln!(
        out,
        "Editing instance {} of '{}' (Enter keeps a value, - clears it)",
        instance.id, instance.process_name
    )?;

    let values = initial_values(&instance.metadata_schema, &instance.metadata);
    let values = prompt_form(&instance.metadata_schema, &values, input, out)?;
    let request = UpdateInstance {
        end_time: None,
        metadata: Some(values),
    };
    let saved = client.update_instance(session, id, &request)?;
    writeln!(out, "Saved instance {}", saved.id)?;
    Ok(saved)
}

/// Create a process, asking for its metadata fields first
pub fn create_process<R: BufRead, W: Write>(
    client: &ApiClient,
    session: &Session,
    mut request: CreateProcess,
    input: &mut R,
    out: &mut W,
) -> Result<Process, DynError> {
    writeln!(out, "Metadata fields to fill in when an instance stops")?;
    request.metadata_schema = Some(prompt_schema(input, out)?);
    let process = client.create_process(session, &request)?;
    writeln!(
        out,
        "Created process {} '{}'{}",
        process.id,
        process.name,
        if process.is_official { " (official)" } else { "" }
    )?;
    Ok(process)
}

/// Change a process; with `redefine_fields` its metadata fields are entered anew
pub fn edit_process<R: BufRead, W: Write>(
    client: &ApiClient,
    session: &Session,
    id: i64,
    mut request: UpdateProcess,
    redefine_fields: bool,
    input: &mut R,
    out: &mut W,
) -> Result<Process, DynError> {
    let current = client.get_process(session, id)?;
    if redefine_fields {
        writeln!(out, "Current fields of '{}':", current.name)?;
        print_schema(&current.metadata_schema, out)?;
        request.metadata_schema = Some(prompt_schema(input, out)?);
    }
    if request.name.is_none() && request.description.is_none() && request.metadata_schema.is_none()
    {
        return Err("Nothing to change: pass --name, --description or --fields".into());
    }
    let saved = client.update_process(session, id, &request)?;
    writeln!(out, "Updated process {} '{}'", saved.id, saved.name)?;
    Ok(saved)
}

/// Delete a process and its instances, asking first unless `confirmed`
///
/// Returns whether the process was deleted.
pub fn delete_process<R: BufRead, W: Write>(
    client: &ApiClient,
    session: &Session,
    id: i64,
    confirmed: bool,
    input: &mut R,
    out: &mut W,
) -> Result<bool, DynError> {
    let process = client.get_process(session, id)?;
    if !confirmed {
        write!(
            out,
            "Delete '{}' and all of its instances? (y/N): ",
            process.name
        )?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            writeln!(out, "Kept '{}'", process.name)?;
            return Ok(false);
        }
    }
    let message = client.delete_process(session, id)?;
    writeln!(out, "{}", message)?;
    Ok(true)
}

pub fn print_schema<W: Write>(schema: &MetadataSchema, out: &mut W) -> io::Result<()> {
    if schema.is_empty() {
        return writeln!(out, "  (no fields)");
    }
    for field in &schema.fields {
        let mut line = format!("  {} ({}", field.name, field.kind.type_name());
        if let FieldKind::Select { options } = &field.kind {
            line.push_str(&format!(": {}", options.join(", ")));
        }
        if field.required {
            line.push_str(", required");
        }
        line.push(')');
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

pub fn print_processes<W: Write>(processes: &[Process], out: &mut W) -> io::Result<()> {
    for (n, process) in processes.iter().enumerate() {
        let mut line = format!("{:>3}. [{}] {}", n + 1, process.id, process.name);
        if process.is_official {
            line.push_str(" (official)");
        }
        if let Some(creator) = &process.creator_name {
            line.push_str(&format!(" by {}", creator));
        }
        writeln!(out, "{}", line)?;
        if let Some(description) = process.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "       {}", description)?;
        }
    }
    Ok(())
}

pub fn print_instances<W: Write>(instances: &[Instance], out: &mut W) -> io::Result<()> {
    if instances.is_empty() {
        return writeln!(out, "No instances");
    }
    for instance in instances {
        let duration = match instance.duration_seconds {
            Some(seconds) => format_elapsed(seconds.max(0) as u64),
            None => "running".to_string(),
        };
        writeln!(
            out,
            "[{}] {}  {}  {}",
            instance.id,
            instance.start_time.format("%Y-%m-%d %H:%M"),
            duration,
            instance.process_name
        )?;
        for (key, value) in &instance.metadata {
            let text = crate::form::value_text(Some(value));
            if !text.is_empty() {
                writeln!(out, "      {}: {}", key, text)?;
            }
        }
    }
    Ok(())
}

pub fn print_stats<W: Write>(stats: &InstanceStats, out: &mut W) -> io::Result<()> {
    writeln!(out, "Completed instances: {}", stats.total_instances)?;
    writeln!(
        out,
        "Total time:          {}",
        format_elapsed(stats.total_seconds.max(0) as u64)
    )?;
    writeln!(out, "Processes used:      {}", stats.unique_processes)
}
