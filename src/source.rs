//! One capture file with a single record of look-ahead.
use crate::error::{ReplayError, Result};
use crate::record::{split_records, PayloadType, Record, Records};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

type Stream = Records<Box<dyn BufRead + Send>>;

/// True when `path` names a gzip-compressed capture.
pub fn is_compressed(path: &Path) -> bool {
    path.as_os_str().as_encoded_bytes().ends_with(b".gz")
}

/// Open `path` as a buffered stream, decompressing `.gz` files on the fly.
/// Every concatenated gzip member is read, not just the first.
pub fn open_stream(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|source| ReplayError::Open { path: path.to_path_buf(), source })?;
    if !is_compressed(path) {
        return Ok(Box::new(BufReader::new(file)));
    }

    let gz = MultiGzDecoder::new(BufReader::new(file));
    if gz.header().is_none() {
        return Err(ReplayError::Decompression {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "missing or invalid gzip header"),
        });
    }
    Ok(Box::new(BufReader::new(gz)))
}

pub struct Source {
    path: PathBuf,
    /// `None` once the stream reported end of data or was closed.
    stream: Option<Stream>,
    lookahead: Option<Record>,
}

impl Source {
    /// Open `path` and fill the look-ahead slot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stream = split_records(open_stream(&path)?);
        let mut source = Self { path, stream: Some(stream), lookahead: None };
        source.advance()?;
        debug!(path = ?source.path, has_record = source.has_lookahead(), "opened capture source");
        Ok(source)
    }

    /// Pull the next record into the look-ahead slot. End of data closes the
    /// stream and leaves the slot empty; any other read failure is returned.
    pub fn advance(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            self.lookahead = None;
            return Ok(());
        };

        match stream.next_record() {
            Ok(Some(raw)) => {
                self.lookahead = Some(Record::parse(raw));
                Ok(())
            }
            Ok(None) => {
                debug!(path = ?self.path, "capture source exhausted");
                self.close();
                Ok(())
            }
            Err(source) => {
                self.close();
                Err(ReplayError::Read { path: self.path.clone(), source })
            }
        }
    }

    /// Drop the stream handle and any buffered record.
    pub fn close(&mut self) {
        self.stream = None;
        self.lookahead = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_lookahead(&self) -> bool {
        self.lookahead.is_some()
    }

    pub fn peek_type(&self) -> Option<PayloadType> {
        self.lookahead.as_ref().map(Record::kind)
    }

    pub fn peek_timestamp(&self) -> Option<i64> {
        self.lookahead.as_ref().map(Record::timestamp)
    }

    pub fn peek_record(&self) -> Option<&Record> {
        self.lookahead.as_ref()
    }

    /// Move the look-ahead record out for hand-off. Call `advance` afterwards.
    pub fn take_lookahead(&mut self) -> Option<Record> {
        self.lookahead.take()
    }
}
