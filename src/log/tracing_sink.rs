//! Forward records into `tracing`.

use std::fmt;
use std::time::Duration;

use tracing::field::{DebugValue, DisplayValue, debug, display};

use super::{Level, Record, Sink, Value};
use crate::error::Error;

/// Field names forwarded as native `tracing` fields. Anything else is folded
/// into a single `fields` value.
const CANONICAL: &[&str] = &[
    "requestID", "remoteAddr", "method", "url", "status", "latency", "bytes", "panic", "stack",
];

/// The default [`Sink`]: one `tracing` event per record on target
/// `kiroku::request`, message = the record's message tag.
///
/// `tracing` has nothing above ERROR, so `Level::Panic` records go out at
/// ERROR and are told apart by `severity = "panic"`. Absent fields are
/// omitted, never recorded as empty.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

// `event!` needs the level as a constant, hence one expansion per level.
// Field values are looked up before the call: the macro body brings its own
// `Value` into scope.
macro_rules! forward {
    ($level:expr, $record:expr) => {{
        let record: &Record = $record;
        let view = View::of(record);
        tracing::event!(
            target: "kiroku::request",
            $level,
            severity = record.level.as_str(),
            requestID = view.request_id,
            remoteAddr = view.remote_addr,
            method = view.method,
            url = view.url,
            status = view.status,
            latency = view.latency,
            bytes = view.bytes,
            panic = view.panic,
            stack = view.stack,
            fields = view.extras,
            "{}",
            record.message
        )
    }};
}

/// The canonical fields of one record, ready to hand to `event!`.
struct View<'a> {
    request_id: Option<DisplayValue<&'a Value>>,
    remote_addr: Option<DisplayValue<&'a Value>>,
    method: Option<DisplayValue<&'a Value>>,
    url: Option<DisplayValue<&'a Value>>,
    status: Option<u64>,
    latency: Option<DebugValue<Duration>>,
    bytes: Option<u64>,
    panic: Option<DisplayValue<&'a Value>>,
    stack: Option<DisplayValue<&'a Value>>,
    extras: Option<DisplayValue<Extras<'a>>>,
}

impl<'a> View<'a> {
    fn of(record: &'a Record) -> Self {
        let shown = |key| record.get(key).map(display);
        let extras = Extras(record);
        Self {
            request_id: shown("requestID"),
            remote_addr: shown("remoteAddr"),
            method: shown("method"),
            url: shown("url"),
            status: record.get("status").and_then(Value::as_u64),
            latency: record.get("latency").and_then(Value::as_duration).map(debug),
            bytes: record.get("bytes").and_then(Value::as_u64),
            panic: shown("panic"),
            stack: shown("stack"),
            extras: (!extras.is_empty()).then(|| display(extras)),
        }
    }
}

impl Sink for TracingSink {
    fn emit(&self, record: &Record) -> Result<(), Error> {
        match record.level {
            Level::Info => forward!(tracing::Level::INFO, record),
            Level::Error | Level::Panic => forward!(tracing::Level::ERROR, record),
        }
        Ok(())
    }
}

/// Non-canonical fields rendered as `key=value` pairs.
struct Extras<'a>(&'a Record);

impl Extras<'_> {
    fn iter(&self) -> impl Iterator<Item = &super::Field> {
        self.0.fields.iter().filter(|f| !CANONICAL.contains(&f.key))
    }

    fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl fmt::Display for Extras<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", field.key, field.value)?;
        }
        Ok(())
    }
}
