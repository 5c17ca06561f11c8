//! The structured-logging capability the middleware writes through.
//!
//! kiroku does not format or ship log lines. It builds [`Record`]s and hands
//! them to a [`Sink`]. [`TracingSink`] forwards them into `tracing`, so
//! whatever subscriber the process installed decides what they look like.
//!
//! ```rust
//! use kiroku::log::{Level, Logger, TracingSink, Value};
//!
//! let base = Logger::new(TracingSink);
//! let scoped = base.with("requestID", "abc123");
//!
//! scoped.info("request", [("status", Value::from(200u16))]);
//! assert!(base.field("requestID").is_none());
//! assert_eq!(Level::for_status(http::StatusCode::BAD_GATEWAY), Level::Error);
//! ```

mod tracing_sink;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;

use crate::error::Error;

pub use tracing_sink::TracingSink;

// ── Level ─────────────────────────────────────────────────────────────────────

/// Record severity. `Panic` sits above `Error` and is only used for a
/// request whose handler panicked; it never terminates the process.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Info,
    Error,
    Panic,
}

impl Level {
    /// `Error` for 5xx, `Info` for everything else.
    pub fn for_status(status: StatusCode) -> Self {
        if status.as_u16() >= 500 { Self::Error } else { Self::Info }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info  => "info",
            Self::Error => "error",
            Self::Panic => "panic",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Value / Field ─────────────────────────────────────────────────────────────

/// A field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Uint(u64),
    Int(i64),
    Duration(Duration),
    /// Raw bytes, passed through as captured (stack traces).
    Bytes(Bytes),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s)      => f.write_str(s),
            Self::Uint(n)     => write!(f, "{n}"),
            Self::Int(n)      => write!(f, "{n}"),
            Self::Duration(d) => write!(f, "{d:?}"),
            Self::Bytes(b)    => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::Str(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self { Self::Uint(n.into()) }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self { Self::Uint(n) }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self { Self::Uint(n as u64) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self { Self::Duration(d) }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self { Self::Bytes(b) }
}

impl From<StatusCode> for Value {
    fn from(s: StatusCode) -> Self { Self::Uint(s.as_u16().into()) }
}

/// A named value. Keys are fixed literals (`"requestID"`, `"status"`, …).
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub value: Value,
}

impl From<(&'static str, Value)> for Field {
    fn from((key, value): (&'static str, Value)) -> Self {
        Self { key, value }
    }
}

/// Insert `field`, replacing any existing field with the same key in place.
fn upsert(fields: &mut Vec<Field>, field: Field) {
    match fields.iter_mut().find(|f| f.key == field.key) {
        Some(slot) => slot.value = field.value,
        None => fields.push(field),
    }
}

// ── Record / Sink ─────────────────────────────────────────────────────────────

/// One emitted log record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub level: Level,
    pub message: &'static str,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// Destination for records.
///
/// One sink is shared by every request in the process, so implementations
/// must tolerate concurrent `emit` calls.
pub trait Sink: Send + Sync + 'static {
    fn emit(&self, record: &Record) -> Result<(), Error>;
}

// ── Logger ────────────────────────────────────────────────────────────────────

/// A structured logger handle: a sink plus the fields every record gets.
///
/// Cloning is two atomic increments. Deriving (`with`) copies the field list
/// once; the parent handle is never modified.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Sink>,
    fields: Arc<[Field]>,
}

impl Logger {
    pub fn new(sink: impl Sink) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    /// Share one sink between several base loggers.
    pub fn from_arc(sink: Arc<dyn Sink>) -> Self {
        Self { sink, fields: Arc::from(Vec::new()) }
    }

    /// Returns a derived logger carrying `key = value`. An existing field with
    /// the same key is overwritten.
    pub fn with(&self, key: &'static str, value: impl Into<Value>) -> Self {
        let mut fields = self.fields.to_vec();
        upsert(&mut fields, Field { key, value: value.into() });
        Self { sink: Arc::clone(&self.sink), fields: fields.into() }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    /// Emit one record. Call-site fields win over the logger's own fields.
    ///
    /// Sink failures are reported through `tracing` and otherwise ignored:
    /// a broken log pipeline must never fail the request being logged.
    pub fn log<I, F>(&self, level: Level, message: &'static str, fields: I)
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        let mut merged = self.fields.to_vec();
        for field in fields {
            upsert(&mut merged, field.into());
        }
        let record = Record { level, message, fields: merged };

        if let Err(e) = self.sink.emit(&record) {
            tracing::warn!(target: "kiroku", severity = %level, record = message, "dropped log record: {e}");
        }
    }

    pub fn info<I, F>(&self, message: &'static str, fields: I)
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.log(Level::Info, message, fields);
    }

    pub fn error<I, F>(&self, message: &'static str, fields: I)
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.log(Level::Error, message, fields);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("fields", &self.fields).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Record>>);

    impl Sink for Arc<Capture> {
        fn emit(&self, record: &Record) -> Result<(), Error> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Broken;

    impl Sink for Broken {
        fn emit(&self, _: &Record) -> Result<(), Error> {
            Err(Error::sink("disk full"))
        }
    }

    #[test]
    fn severity_follows_status() {
        for (code, level) in [
            (200, Level::Info),
            (301, Level::Info),
            (404, Level::Info),
            (499, Level::Info),
            (500, Level::Error),
            (503, Level::Error),
        ] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(Level::for_status(status), level, "status {code}");
        }
        assert!(Level::Panic > Level::Error);
    }

    #[test]
    fn with_derives_without_touching_parent() {
        let capture = Arc::new(Capture::default());
        let base = Logger::new(Arc::clone(&capture));
        let child = base.with("requestID", "abc");

        assert!(base.fields().is_empty());
        assert_eq!(child.field("requestID"), Some(&Value::from("abc")));
    }

    #[test]
    fn later_fields_overwrite_earlier_ones() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::new(Arc::clone(&capture))
            .with("method", "GET")
            .with("url", "/a")
            .with("method", "POST");

        assert_eq!(logger.fields().len(), 2);
        assert_eq!(logger.fields()[0].value, Value::from("POST"));

        logger.info("request", [("url", Value::from("/b"))]);
        let records = capture.0.lock().unwrap();
        let record = &records[0];
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.get("url").and_then(Value::as_str), Some("/b"));
    }

    #[test]
    fn sink_failure_is_swallowed() {
        let logger = Logger::new(Broken).with("requestID", "x");
        logger.error("request", [("status", Value::from(500u16))]);
    }
}
