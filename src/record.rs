//! Capture file framing and record metadata.
//!
//! A capture is a plain byte stream of records. Each record starts with a
//! metadata line `<tag><fields...>` separated by spaces, followed by the raw
//! payload, and is terminated by a line holding only [`PAYLOAD_SEPARATOR`].
//! The separator is chosen so it will not show up in real HTTP traffic.
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

/// Record terminator line, without its trailing newline.
pub const PAYLOAD_SEPARATOR: &str = "🐵🙈🙉";

const REQUEST_TAG: u8 = b'1';
const RESPONSE_TAG: u8 = b'2';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    Request,
    Response,
    /// Any other tag byte (`0` when the metadata line is empty).
    Other(u8),
}

impl PayloadType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            REQUEST_TAG => Self::Request,
            RESPONSE_TAG => Self::Response,
            other => Self::Other(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Request => REQUEST_TAG,
            Self::Response => RESPONSE_TAG,
            Self::Other(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub kind: PayloadType,
    /// Opaque request/response pairing token.
    pub id: String,
    /// Capture time in nanoseconds; 0 when the field is missing or malformed.
    pub timestamp: i64,
}

/// One framed unit of captured traffic. The metadata is derived once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    meta: RecordMeta,
    data: Vec<u8>,
}

impl Record {
    pub fn parse(data: Vec<u8>) -> Self {
        let meta = parse_meta(&data);
        Self { meta, data }
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn kind(&self) -> PayloadType {
        self.meta.kind
    }

    pub fn timestamp(&self) -> i64 {
        self.meta.timestamp
    }

    /// Raw record bytes, metadata line included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Decode the leading metadata line of a raw record.
///
/// Field 0's first byte is the payload tag, field 1 the id and field 2 the
/// decimal nanosecond timestamp. Parsing never fails: a bad timestamp is
/// logged and read as zero.
pub fn parse_meta(record: &[u8]) -> RecordMeta {
    let line_end = record.iter().position(|&b| b == b'\n').unwrap_or(record.len());
    let line = &record[..line_end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let mut fields = line.split(|&b| b == b' ').filter(|f| !f.is_empty());
    let kind = fields
        .next()
        .and_then(|f| f.first().copied())
        .map_or(PayloadType::Other(0), PayloadType::from_tag);
    let id = fields.next().map(|f| String::from_utf8_lossy(f).into_owned()).unwrap_or_default();
    let timestamp = match fields.next() {
        Some(raw) => match std::str::from_utf8(raw).ok().and_then(|s| s.parse::<i64>().ok()) {
            Some(ts) => ts,
            None => {
                warn!(field = %String::from_utf8_lossy(raw), "malformed record timestamp, using 0");
                0
            }
        },
        None => {
            warn!(id = %id, "record metadata has no timestamp field, using 0");
            0
        }
    };

    RecordMeta { kind, id, timestamp }
}

/// Lazy sequence of raw records read from a buffered stream.
pub struct Records<R> {
    reader: R,
    line: Vec<u8>,
}

/// Split `reader` into records. Each call to `next` continues from the
/// stream's current position.
pub fn split_records<R: BufRead>(reader: R) -> Records<R> {
    Records { reader, line: Vec::with_capacity(256) }
}

impl<R: BufRead> Records<R> {
    /// Read the next record. `Ok(None)` means end of stream; an unterminated
    /// tail after the last separator is dropped.
    pub fn next_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                if !buf.is_empty() {
                    debug!(bytes = buf.len(), "discarding unterminated record at end of stream");
                }
                return Ok(None);
            }

            if is_separator(&self.line) {
                // The newline in front of the separator belongs to the framing.
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                return Ok(Some(buf));
            }
            buf.extend_from_slice(&self.line);
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn is_separator(line: &[u8]) -> bool {
    let body = line.strip_suffix(b"\n").unwrap_or(line);
    body == PAYLOAD_SEPARATOR.as_bytes()
}

/// Write `payload` in capture framing so `split_records` yields it back unchanged.
pub fn encode_record<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    w.write_all(payload)?;
    w.write_all(b"\n")?;
    w.write_all(PAYLOAD_SEPARATOR.as_bytes())?;
    w.write_all(b"\n")?;
    Ok(())
}
