//! Capture replay engine library.
//!
//! Reads request/response captures written by the traffic recorder and
//! replays them to a single consumer in timestamp order, optionally keeping
//! the original gaps between requests:
//!
//! - `record`: capture framing (separator-delimited records) and metadata parsing
//! - `source`: one capture file, gzip-aware, with one record of look-ahead
//! - `merge`: picks the next source across all open captures
//! - `delay`: turns captured request gaps into wall-clock waits
//! - `engine`: the pump thread and the blocking read/stop surface
//! - `logging`: `RUST_LOG`-driven subscriber setup for the binaries
//!
//! The binaries in this repository (`src/main.rs` and `src/bin/inspect.rs`)
//! replay captures to a file or stdout and print per-record metadata.
pub mod config;
pub mod delay;
pub mod engine;
pub mod error;
pub mod logging;
pub mod merge;
pub mod record;
pub mod source;

pub use config::ReplayConfig;
pub use engine::{ReplayEngine, ReplaySummary, StopHandle, StopReason};
pub use error::{ReplayError, Result};
pub use record::{PayloadType, Record, RecordMeta};
