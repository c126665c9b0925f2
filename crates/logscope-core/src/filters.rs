//! Built-in stream filters.
//!
//! Filters strip container runtime framing before lines reach a parser:
//! - `docker`: the `json-file` logging driver (`{"log":"...","stream":"..."}`)
//! - `cri`: CRI/containerd (`<time> <stream> <P|F> <payload>`)
//! - `none`: identity
//!
//! Lines that do not carry the expected framing pass through unchanged.

use std::io::{self, BufRead, Read};

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::Deserialize;

use crate::registry::{ByteStream, FilterRegistry};
use crate::source::MAX_LINE_BYTES;

/// Longest raw line a filter reads at once.
///
/// Framing inflates payloads, so this is larger than what parsers accept.
/// Longer lines are forwarded untouched and rejected downstream.
pub const MAX_FRAMED_LINE_BYTES: usize = 4 * MAX_LINE_BYTES;

static CRI_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)^(\S+) (stdout|stderr) ([PF])(?: (.*))?$").unwrap_or_else(|_| unreachable!())
});

/// Per-line rewriting applied by a [`LineFilter`].
pub trait LineTransform: Send {
    /// Rewrites one input line (terminator stripped), appending output to `out`.
    fn transform(&mut self, line: &[u8], out: &mut Vec<u8>);

    /// Flushes buffered state at end of input.
    fn finish(&mut self, _out: &mut Vec<u8>) {}
}

/// Adapts a [`LineTransform`] into a buffered reader.
pub struct LineFilter<T> {
    inner: ByteStream,
    transform: T,
    line: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<T: LineTransform> LineFilter<T> {
    /// Wraps `inner`.
    pub fn new(inner: ByteStream, transform: T) -> Self {
        Self {
            inner,
            transform,
            line: Vec::new(),
            out: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        self.out.clear();
        self.pos = 0;
        self.line.clear();

        let limit = MAX_FRAMED_LINE_BYTES as u64 + 1;
        let read = (&mut self.inner).take(limit).read_until(b'\n', &mut self.line)?;
        if read == 0 {
            self.eof = true;
            self.transform.finish(&mut self.out);
            return Ok(());
        }

        if self.line.last() != Some(&b'\n') && read as u64 == limit {
            self.out.extend_from_slice(&self.line);
            return Ok(());
        }
        let mut line = self.line.as_slice();
        if let Some(stripped) = line.strip_suffix(b"\n") {
            line = stripped;
        }
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        self.transform.transform(line, &mut self.out);
        Ok(())
    }
}

impl<T: LineTransform> BufRead for LineFilter<T> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.out.len() && !self.eof {
            self.refill()?;
        }
        Ok(&self.out[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.out.len());
    }
}

impl<T: LineTransform> Read for LineFilter<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

fn pass_through(line: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(line);
    out.push(b'\n');
}

#[derive(Deserialize)]
struct DockerRecord {
    log: String,
}

/// Unwraps the Docker `json-file` driver framing.
///
/// The `log` payload is emitted verbatim. Docker splits long lines into
/// records without a trailing newline, so consecutive partial payloads are
/// naturally joined.
#[derive(Debug, Default)]
pub struct DockerTransform;

impl LineTransform for DockerTransform {
    fn transform(&mut self, line: &[u8], out: &mut Vec<u8>) {
        match serde_json::from_slice::<DockerRecord>(line) {
            Ok(record) => out.extend_from_slice(record.log.as_bytes()),
            Err(_) => pass_through(line, out),
        }
    }
}

/// Unwraps CRI framing, joining partial (`P`) chunks per stream.
#[derive(Debug, Default)]
pub struct CriTransform {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl LineTransform for CriTransform {
    fn transform(&mut self, line: &[u8], out: &mut Vec<u8>) {
        let Some(caps) = CRI_LINE.captures(line) else {
            pass_through(line, out);
            return;
        };
        let pending = if &caps[2] == b"stdout" {
            &mut self.stdout
        } else {
            &mut self.stderr
        };
        if let Some(payload) = caps.get(4) {
            pending.extend_from_slice(payload.as_bytes());
        }
        if &caps[3] == b"F" {
            out.append(pending);
            out.push(b'\n');
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        for pending in [&mut self.stdout, &mut self.stderr] {
            if !pending.is_empty() {
                out.append(pending);
                out.push(b'\n');
            }
        }
    }
}

/// `docker` filter constructor.
pub fn docker(inner: ByteStream) -> ByteStream {
    Box::new(LineFilter::new(inner, DockerTransform))
}

/// `cri` filter constructor.
pub fn cri(inner: ByteStream) -> ByteStream {
    Box::new(LineFilter::new(inner, CriTransform::default()))
}

/// `none` filter constructor.
pub fn identity(inner: ByteStream) -> ByteStream {
    inner
}

impl FilterRegistry {
    /// Creates a filter registry holding the built-in filters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::filters();
        registry
            .register("docker", docker)
            .register("cri", cri)
            .register("none", identity);
        registry
    }
}
