//! General purpose processors.
//!
//! - [`FieldFilter`]: skips entries that do not match `key=value` / `key!=value` predicates
//! - [`EchoProcessor`]: writes each entry as one JSON line

use std::fmt;
use std::io::Write;

use crate::error::{ConfigError, ProcessError};
use crate::pipeline::{Flow, Processor};
use crate::types::LogEntry;

/// Comparison performed by a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The value must equal the operand.
    Equals,
    /// The value must be absent or differ from the operand.
    NotEquals,
}

/// A single field predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Attribute name or dot-joined field path.
    pub key: String,
    /// Comparison to perform.
    pub comparison: Comparison,
    /// Text compared against the rendered value.
    pub operand: String,
}

impl Predicate {
    /// Parses `key=value` or `key!=value`.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let (key, comparison, operand) = if let Some((key, operand)) = expr.split_once("!=") {
            (key, Comparison::NotEquals, operand)
        } else if let Some((key, operand)) = expr.split_once('=') {
            (key, Comparison::Equals, operand)
        } else {
            return Err(ConfigError::InvalidPredicate(expr.to_string()));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidPredicate(expr.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            comparison,
            operand: operand.trim().to_string(),
        })
    }

    /// Evaluates the predicate against `entry`.
    ///
    /// `level`, `msg`, `caller` and `stacktrace` address the entry's
    /// attributes; any other key is looked up among the fields.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let value = match self.key.as_str() {
            "level" => Some(entry.level.as_str().to_string()),
            "msg" | "message" => Some(entry.message.clone()),
            "caller" => Some(entry.caller.clone()),
            "stacktrace" => Some(entry.stacktrace.clone()),
            path => entry.field(path).map(crate::types::FieldValue::to_text),
        };
        match self.comparison {
            Comparison::Equals => value.is_some_and(|v| v == self.operand),
            Comparison::NotEquals => value.is_none_or(|v| v != self.operand),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.comparison {
            Comparison::Equals => "=",
            Comparison::NotEquals => "!=",
        };
        write!(f, "{}{op}{}", self.key, self.operand)
    }
}

/// Skips entries that do not satisfy every predicate.
#[derive(Debug, Clone, Default)]
pub struct FieldFilter {
    predicates: Vec<Predicate>,
}

impl FieldFilter {
    /// Creates a filter from parsed predicates.
    #[must_use]
    pub const fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Parses each expression into a predicate.
    pub fn parse<S: AsRef<str>>(exprs: &[S]) -> Result<Self, ConfigError> {
        exprs
            .iter()
            .map(|e| Predicate::parse(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Returns true if the filter has no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl Processor for FieldFilter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn process(&mut self, entry: &LogEntry) -> Result<Flow, ProcessError> {
        if self.predicates.iter().all(|p| p.matches(entry)) {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Skip)
        }
    }
}

/// Writes each entry as a JSON line.
pub struct EchoProcessor<W> {
    writer: W,
}

impl<W: Write + Send> EchoProcessor<W> {
    /// Creates a processor writing to `writer`.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the processor, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Processor for EchoProcessor<W> {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn process(&mut self, entry: &LogEntry) -> Result<Flow, ProcessError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, Level, LogField};
    use test_case::test_case;

    fn make_entry() -> LogEntry {
        LogEntry::new("request done")
            .with_level(Level::Info)
            .with_field("service", "api")
            .with_field("status", 200_i64)
            .with_field(
                "http",
                FieldValue::Group(vec![LogField::new("method", "GET")]),
            )
    }

    #[test_case("service=api", true ; "field equals")]
    #[test_case("service=web", false ; "field differs")]
    #[test_case("service!=web", true ; "field not equals")]
    #[test_case("status=200", true ; "integer rendered")]
    #[test_case("http.method=GET", true ; "nested path")]
    #[test_case("level=info", true ; "level attribute")]
    #[test_case("msg=request done", true ; "message attribute")]
    #[test_case("missing=x", false ; "missing equals")]
    #[test_case("missing!=x", true ; "missing not equals")]
    fn predicate_matches(expr: &str, expected: bool) {
        let predicate = Predicate::parse(expr).unwrap();
        assert_eq!(predicate.matches(&make_entry()), expected);
    }

    #[test_case("novalue" ; "no operator")]
    #[test_case("=x" ; "empty key")]
    #[test_case(" !=x" ; "blank key")]
    fn predicate_rejects(expr: &str) {
        assert!(matches!(
            Predicate::parse(expr),
            Err(ConfigError::InvalidPredicate(_))
        ));
    }

    #[test]
    fn predicate_display_roundtrip() {
        let predicate = Predicate::parse("a.b != c").unwrap();
        assert_eq!(predicate.to_string(), "a.b!=c");
    }

    #[test]
    fn field_filter_skips_non_matching() {
        let mut filter = FieldFilter::parse(&["service=api", "level=error"]).unwrap();
        assert_eq!(filter.process(&make_entry()).unwrap(), Flow::Skip);

        let mut filter = FieldFilter::parse(&["service=api"]).unwrap();
        assert_eq!(filter.process(&make_entry()).unwrap(), Flow::Continue);
    }

    #[test]
    fn empty_field_filter_accepts_everything() {
        let mut filter = FieldFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.process(&LogEntry::default()).unwrap(), Flow::Continue);
    }

    #[test]
    fn echo_writes_json_lines() {
        let mut echo = EchoProcessor::new(Vec::new());
        echo.process(&LogEntry::new("one")).unwrap();
        echo.process(&LogEntry::new("two").with_level(Level::Warning)).unwrap();
        let out = String::from_utf8(echo.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["message"], "one");
        assert_eq!(lines[1]["level"], "warning");
    }
}
