//! Entry sources: line-delimited bytes in, normalized entries out.

use std::io::{BufRead, Read};

use serde_json::{Map, Value};

use crate::error::SourceError;
use crate::normalizer::normalize;
use crate::registry::{ByteStream, ParserRegistry};
use crate::types::LogEntry;

/// Longest line a parser accepts, in bytes (terminator excluded).
pub const MAX_LINE_BYTES: usize = 32 * 1024;

/// Longest raw fragment carried in a parse error.
pub const MAX_FRAGMENT_BYTES: usize = 256;

/// A pull-based producer of entries.
///
/// `None` signals end of stream. After a fatal error (see
/// [`SourceError::is_fatal`]) the source yields `None`.
pub trait EntrySource: Iterator<Item = Result<LogEntry, SourceError>> + Send {}

impl<T> EntrySource for T where T: Iterator<Item = Result<LogEntry, SourceError>> + Send {}

/// Parses one JSON object per line.
///
/// Blank lines are skipped. Anything that is not a JSON object yields a
/// recoverable [`SourceError::Parse`].
pub struct JsonSource<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
    done: bool,
}

impl<R: BufRead> JsonSource<R> {
    /// Creates a source reading from `reader`.
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
            done: false,
        }
    }

    /// Number of lines read so far.
    #[must_use]
    pub const fn lines_read(&self) -> u64 {
        self.line
    }

    /// Reads the next line into `self.buf`, without terminator.
    ///
    /// Returns `Ok(false)` at end of stream.
    fn read_line(&mut self) -> Result<bool, SourceError> {
        self.buf.clear();
        let limit = MAX_LINE_BYTES as u64 + 1;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| SourceError::Io {
                line: self.line + 1,
                source,
            })?;
        if read == 0 {
            return Ok(false);
        }
        self.line += 1;

        let terminated = self.buf.last() == Some(&b'\n');
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        if self.buf.len() > MAX_LINE_BYTES {
            return Err(SourceError::LineTooLong {
                line: self.line,
                limit: MAX_LINE_BYTES,
            });
        }
        Ok(true)
    }

    fn parse_line(&self) -> Result<LogEntry, SourceError> {
        match serde_json::from_slice::<Map<String, Value>>(&self.buf) {
            Ok(record) => Ok(normalize(record)),
            Err(e) => Err(SourceError::Parse {
                line: self.line,
                fragment: fragment(&self.buf),
                reason: e.to_string(),
            }),
        }
    }
}

impl<R: BufRead> Iterator for JsonSource<R> {
    type Item = Result<LogEntry, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.read_line() {
                Ok(false) => self.done = true,
                Ok(true) if self.buf.iter().all(u8::is_ascii_whitespace) => {}
                Ok(true) => return Some(self.parse_line()),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Lossy, char-boundary-safe prefix of a raw line.
fn fragment(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= MAX_FRAGMENT_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_FRAGMENT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

/// `json` parser constructor.
pub fn json(stream: ByteStream) -> Box<dyn EntrySource> {
    Box::new(JsonSource::new(stream))
}

impl ParserRegistry {
    /// Creates a parser registry holding the built-in parsers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::parsers();
        registry.register("json", json);
        registry
    }
}
