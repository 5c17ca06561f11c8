//! [`LogFormatter`] that writes the same `request` records as
//! [`RequestLogging`](super::RequestLogging), driven by the host's
//! [`RequestLogger`](super::RequestLogger) and [`Recoverer`](super::Recoverer).

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;

use super::enrich;
use super::observer::Metrics;
use super::recover::{Completion, LogEntry, LogFormatter};
use super::request_log::{REQUEST, emit_panic, outcome_fields};
use crate::context;
use crate::log::{Level, Logger};
use crate::panic;
use crate::request::Request;

/// Builds each entry from the logger [`SetLogger`](super::SetLogger)
/// installed, adding `remoteAddr`, `method` and `url`. Requests with no
/// installed logger get an entry that logs nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanicSafeLogger;

impl LogFormatter for PanicSafeLogger {
    fn new_log_entry(&self, req: &Request) -> Arc<dyn LogEntry> {
        let logger = context::get(req).map(|installed| {
            let logger = enrich::remote_addr()(installed.clone(), req);
            enrich::method_and_url()(logger, req)
        });
        Arc::new(RequestLogEntry { logger })
    }
}

/// One request's entry.
#[derive(Debug)]
pub struct RequestLogEntry {
    logger: Option<Logger>,
}

impl LogEntry for RequestLogEntry {
    fn write(&self, completion: &Completion<'_>) {
        let Some(logger) = &self.logger else { return };
        let metrics = Metrics {
            status: completion.status,
            bytes: completion.bytes,
            elapsed: completion.elapsed,
        };
        logger.log(Level::for_status(metrics.status), REQUEST, outcome_fields(&metrics));
    }

    fn panic(&self, value: &(dyn Any + Send), stack: &[u8]) {
        if let Some(logger) = &self.logger {
            emit_panic(logger, &panic::describe(value), Bytes::copy_from_slice(stack));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use http::{HeaderMap, StatusCode};

    use super::*;
    use crate::error::Error;
    use crate::log::{Record, Sink, Value};

    #[derive(Default)]
    struct Capture(Mutex<Vec<Record>>);

    impl Sink for Arc<Capture> {
        fn emit(&self, record: &Record) -> Result<(), Error> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn request_with_logger(capture: &Arc<Capture>) -> Request {
        let req = Request::from_http(http::Request::post("/orders").body(Bytes::new()).unwrap())
            .with_remote_addr("192.0.2.1:4000".parse().unwrap());
        context::set(req, Logger::new(Arc::clone(capture)).with("requestID", "e-1"))
    }

    #[test]
    fn write_emits_request_record() {
        let capture = Arc::new(Capture::default());
        let entry = PanicSafeLogger.new_log_entry(&request_with_logger(&capture));

        entry.write(&Completion {
            status: StatusCode::CREATED,
            bytes: 7,
            headers: &HeaderMap::new(),
            elapsed: Duration::from_millis(5),
        });

        let records = capture.0.lock().unwrap();
        let [record] = records.as_slice() else { panic!("expected one record") };
        assert_eq!(record.level, Level::Info);
        assert_eq!(record.message, "request");
        let keys: Vec<_> = record.fields.iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            ["requestID", "remoteAddr", "method", "url", "status", "latency", "bytes"]
        );
        assert_eq!(record.get("method").and_then(Value::as_str), Some("POST"));
        assert_eq!(record.get("status").and_then(Value::as_u64), Some(201));
    }

    #[test]
    fn panic_emits_panic_record_with_raw_stack() {
        let capture = Arc::new(Capture::default());
        let entry = PanicSafeLogger.new_log_entry(&request_with_logger(&capture));

        let payload: Box<dyn Any + Send> = Box::new("boom");
        entry.panic(payload.as_ref(), b"frame 0\nframe 1\n");

        let records = capture.0.lock().unwrap();
        let [record] = records.as_slice() else { panic!("expected one record") };
        assert_eq!(record.level, Level::Panic);
        assert_eq!(record.get("panic").and_then(Value::as_str), Some("boom"));
        assert_eq!(
            record.get("stack").and_then(Value::as_bytes).map(|b| b.as_ref()),
            Some(&b"frame 0\nframe 1\n"[..])
        );
        assert!(record.get("status").is_none());
        assert!(record.get("latency").is_none());
    }

    #[test]
    fn no_installed_logger_logs_nothing() {
        let req = Request::from_http(http::Request::get("/").body(Bytes::new()).unwrap());
        let entry = PanicSafeLogger.new_log_entry(&req);
        entry.write(&Completion {
            status: StatusCode::OK,
            bytes: 0,
            headers: &HeaderMap::new(),
            elapsed: Duration::ZERO,
        });
        entry.panic(&"ignored", b"");
    }
}
