//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};

use crate::context;
use crate::log::Logger;

/// The correlation ID assigned to a request by the host.
///
/// Stored in [`Request::extensions`] by
/// [`PropagateRequestId`](crate::middleware::request_id::PropagateRequestId).
/// kiroku only carries IDs the reverse proxy (or an upstream service) already
/// minted; it never generates one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestId(pub String);

/// An incoming HTTP request with its body fully collected.
pub struct Request {
    parts: http::request::Parts,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Wraps an `http::Request` whose body has already been collected.
    ///
    /// ```rust
    /// use bytes::Bytes;
    /// use kiroku::Request;
    ///
    /// let req = Request::from_http(
    ///     http::Request::get("/items/42?full=1")
    ///         .header("x-request-id", "abc123")
    ///         .body(Bytes::new())
    ///         .unwrap(),
    /// );
    /// assert_eq!(req.url(), "/items/42?full=1");
    /// assert_eq!(req.header("X-Request-ID"), Some("abc123"));
    /// ```
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self { parts, body, params: HashMap::new(), remote_addr: None }
    }

    /// Records the peer address the connection was accepted from.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.parts.extensions }

    /// The request target's path plus query. Scheme and authority are left
    /// out, so HTTP/2 (which always sends them) logs the same `url` as HTTP/1.1.
    pub fn url(&self) -> String {
        self.parts.uri.path_and_query().map_or("/", |pq| pq.as_str()).to_owned()
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The host-assigned correlation ID, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.parts.extensions.get::<RequestId>().map(|id| id.0.as_str())
    }

    /// The logger installed for this request, if logging is enabled on this path.
    pub fn logger(&self) -> Option<&Logger> {
        context::get(self)
    }
}
