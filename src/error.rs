//! Unified error type.

/// The error type returned by kiroku's fallible operations.
///
/// Application-level errors (404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, accepting a connection, or a log
/// sink refusing a record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A [`Sink`](crate::log::Sink) could not emit a record. Never surfaced
    /// to the client; the logger swallows it.
    #[error("log sink: {0}")]
    Sink(String),
}

impl Error {
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink(reason.into())
    }
}
