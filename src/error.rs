//! Error type shared by the replay library.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("invalid source pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no files match pattern '{0}'")]
    NoMatchingSources(String),

    #[error("cannot open capture {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot initialize gzip decoder for {path:?}: {source}")]
    Decompression {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read error in {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("speed factor must be finite and greater than zero, got {0}")]
    InvalidSpeed(f64),
}
