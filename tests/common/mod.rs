#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use kiroku::Request;
use kiroku::log::{Logger, Record, Sink, Value};

/// In-memory sink shared by a test and the router under test.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<Record>>>);

impl Capture {
    pub fn logger(&self) -> Logger {
        Logger::new(self.clone())
    }

    pub fn records(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }
}

impl Sink for Capture {
    fn emit(&self, record: &Record) -> Result<(), kiroku::Error> {
        self.0.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// A sink that always fails.
pub struct Broken;

impl Sink for Broken {
    fn emit(&self, _record: &Record) -> Result<(), kiroku::Error> {
        Err(kiroku::Error::sink("connection refused"))
    }
}

pub fn get(uri: &str) -> Request {
    Request::from_http(http::Request::get(uri).body(Bytes::new()).unwrap())
}

pub fn get_with_id(uri: &str, id: &str) -> Request {
    Request::from_http(
        http::Request::get(uri)
            .header("x-request-id", id)
            .body(Bytes::new())
            .unwrap(),
    )
}

pub fn str_field<'r>(record: &'r Record, key: &str) -> Option<&'r str> {
    record.get(key).and_then(Value::as_str)
}

pub fn uint_field(record: &Record, key: &str) -> Option<u64> {
    record.get(key).and_then(Value::as_u64)
}
