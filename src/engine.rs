//! Replay pump and the blocking read surface handed to consumers.
//!
//! [`ReplayEngine::start`] resolves a glob pattern into capture sources and
//! spawns a pump thread. The pump repeatedly asks [`select_next`] for the
//! winning source, sleeps to reproduce request gaps, then rendezvouses with
//! the consumer over a zero-capacity channel: a record is held until
//! [`ReplayEngine::read`] takes it. Stop requests race that hand-off and end
//! the pump for good.
use crate::config::ReplayConfig;
use crate::delay::DelaySimulator;
use crate::error::{ReplayError, Result};
use crate::merge::select_next;
use crate::record::Record;
use crate::source::Source;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Open every file matching `pattern`, in glob (lexicographic) order.
///
/// Directories are skipped. An empty match set is an error.
pub fn resolve_sources(pattern: &str) -> Result<Vec<Source>> {
    let entries = glob::glob(pattern).map_err(|source| ReplayError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ReplayError::Open {
            path: e.path().to_path_buf(),
            source: e.into(),
        })?;
        if path.is_dir() {
            debug!(path = ?path, "skipping directory matched by source pattern");
            continue;
        }
        sources.push(Source::open(path)?);
    }

    if sources.is_empty() {
        return Err(ReplayError::NoMatchingSources(pattern.to_string()));
    }
    Ok(sources)
}

/// Why the pump ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every source ran dry and looping is off.
    Exhausted,
    /// A stop was requested.
    Cancelled,
    /// The reading side went away.
    Disconnected,
    /// A fatal read or resolution error; the message was also delivered to the reader.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub emitted: u64,
    pub restarts: u64,
    pub reason: StopReason,
    /// Stream handles still open when the pump returned.
    pub open_sources: usize,
}

enum Step {
    Continue,
    Stop(StopReason),
}

struct Pump {
    pattern: String,
    looping: bool,
    sources: Vec<Source>,
    delay: DelaySimulator,
    data_tx: Sender<Result<Record>>,
    stop_rx: Receiver<()>,
    emitted: u64,
    restarts: u64,
}

impl Pump {
    fn run(mut self) -> ReplaySummary {
        let reason = loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(reason)) => break reason,
                Err(err) => {
                    error!(pattern = %self.pattern, error = %err, "capture replay aborted");
                    let msg = err.to_string();
                    select! {
                        recv(self.stop_rx) -> _ => {},
                        send(self.data_tx, Err(err)) -> _ => {},
                    }
                    break StopReason::Failed(msg);
                }
            }
        };

        self.close_all();
        match &reason {
            StopReason::Exhausted => info!(pattern = %self.pattern, emitted = self.emitted, "end of capture input"),
            StopReason::Cancelled | StopReason::Disconnected => {
                info!(pattern = %self.pattern, emitted = self.emitted, ?reason, "capture replay stopped")
            }
            StopReason::Failed(_) => {}
        }

        ReplaySummary {
            emitted: self.emitted,
            restarts: self.restarts,
            reason,
            open_sources: self.sources.iter().filter(|s| s.is_open()).count(),
        }
    }

    fn step(&mut self) -> Result<Step> {
        let Some(idx) = select_next(&self.sources) else {
            if !self.looping {
                return Ok(Step::Stop(StopReason::Exhausted));
            }
            self.restart()?;
            if select_next(&self.sources).is_none() {
                warn!(pattern = %self.pattern, "no records after restarting capture input, giving up");
                return Ok(Step::Stop(StopReason::Exhausted));
            }
            return Ok(Step::Continue);
        };

        let Some(record) = self.sources[idx].take_lookahead() else {
            return Ok(Step::Continue);
        };

        if let Some(wait) = self.delay.delay_for(record.kind(), record.timestamp()) {
            match self.stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(Step::Stop(StopReason::Cancelled)),
            }
        }

        select! {
            recv(self.stop_rx) -> _ => Ok(Step::Stop(StopReason::Cancelled)),
            send(self.data_tx, Ok(record)) -> res => match res {
                Ok(()) => {
                    self.emitted += 1;
                    self.sources[idx].advance()?;
                    Ok(Step::Continue)
                }
                Err(_) => Ok(Step::Stop(StopReason::Disconnected)),
            },
        }
    }

    fn restart(&mut self) -> Result<()> {
        self.close_all();
        self.sources = resolve_sources(&self.pattern)?;
        self.delay.reset();
        self.restarts += 1;
        info!(pattern = %self.pattern, restart = self.restarts, sources = self.sources.len(), "looping capture input");
        Ok(())
    }

    fn close_all(&mut self) {
        for source in &mut self.sources {
            source.close();
        }
    }
}

/// Cloneable handle that requests a cooperative stop; usable from signal handlers.
#[derive(Debug, Clone)]
pub struct StopHandle(Sender<()>);

impl StopHandle {
    /// Ask the pump to stop. Never blocks; repeated calls are harmless.
    pub fn stop(&self) {
        let _ = self.0.try_send(());
    }
}

/// Replays every capture matching a glob pattern, merged in timestamp order.
pub struct ReplayEngine {
    pattern: String,
    data_rx: Receiver<Result<Record>>,
    stop: StopHandle,
    pump: Option<JoinHandle<ReplaySummary>>,
}

impl ReplayEngine {
    /// Resolve `pattern`, open all sources and start the pump thread.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a pattern that matches nothing, or a source
    /// that cannot be opened. The pump is not started in that case.
    pub fn start(pattern: impl Into<String>, config: ReplayConfig) -> Result<Self> {
        config.validate()?;
        let pattern = pattern.into();
        let sources = resolve_sources(&pattern)?;
        info!(
            pattern = %pattern,
            sources = sources.len(),
            speed_factor = config.speed_factor,
            looping = config.looping,
            "starting capture replay"
        );

        let (data_tx, data_rx) = bounded(0);
        let (stop_tx, stop_rx) = bounded(1);
        let pump = Pump {
            pattern: pattern.clone(),
            looping: config.looping,
            sources,
            delay: DelaySimulator::new(config.speed_factor),
            data_tx,
            stop_rx,
            emitted: 0,
            restarts: 0,
        };
        let handle = thread::spawn(move || pump.run());

        Ok(Self { pattern, data_rx, stop: StopHandle(stop_tx), pump: Some(handle) })
    }

    /// Block until the next record is published.
    ///
    /// `Ok(None)` once the replay has finished or was stopped; `Err` carries
    /// the fatal error that ended the session.
    pub fn read(&self) -> Result<Option<Record>> {
        match self.data_rx.recv() {
            Ok(item) => item.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Copy the next record into `buf`, truncating if it does not fit.
    /// Returns the full record length.
    pub fn read_into(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(record) = self.read()? else {
            return Ok(None);
        };
        let data = record.data();
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(Some(data.len()))
    }

    /// Iterate over records until the replay ends.
    pub fn records(&self) -> impl Iterator<Item = Result<Record>> + '_ {
        std::iter::from_fn(move || self.read().transpose())
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the pump thread to finish. Does not request a stop by itself.
    /// Returns `None` if the pump was already waited for.
    pub fn wait(&mut self) -> Option<ReplaySummary> {
        let handle = self.pump.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            error!(pattern = %self.pattern, "replay pump panicked");
            ReplaySummary {
                emitted: 0,
                restarts: 0,
                reason: StopReason::Failed("replay pump panicked".into()),
                open_sources: 0,
            }
        }))
    }
}

impl fmt::Display for ReplayEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File input: {}", self.pattern)
    }
}

impl Drop for ReplayEngine {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}
