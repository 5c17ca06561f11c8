//! # kiroku
//!
//! Request logging for HTTP services behind a reverse proxy. One structured
//! record per request, with the request's correlation ID on it, and nothing
//! about the response changed on the way.
//!
//! ## The contract
//!
//! For every request that reaches the service:
//!
//! - a logger derived for that request alone is installed where handlers can
//!   reach it ([`Request::logger`], [`context::current`]);
//! - the response the handler returns goes to the client untouched;
//! - exactly one `request` record is emitted: `method`, `url`, `status`,
//!   `latency`, `bytes`, and `requestID` when the proxy sent one. 5xx is
//!   logged at error level, everything else at info;
//! - a panicking handler produces one panic-level record with the panic
//!   message and stack, and the panic carries on to whatever recovers it.
//!
//! Logging never fails a request. A request on a path where no logger is
//! installed is served normally and logged by nobody.
//!
//! To put the panic site's stack on panic records, the logging middleware
//! installs a process-wide panic hook ([`panic::install_hook`]) when it is
//! built. The hook chains to the one it replaces, but every panic in the
//! process, request-related or not, captures a backtrace from then on.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use kiroku::log::{Logger, TracingSink, Value};
//! use kiroku::middleware::{enrich, RequestLogging};
//! use kiroku::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     let app = Router::new()
//!         .on(Method::GET, "/items/{id}", get_item)
//!         .wrap(
//!             RequestLogging::new(Logger::new(TracingSink))
//!                 .enrich(enrich::request_id())
//!                 .enrich(enrich::remote_addr()),
//!         );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_item(req: Request) -> Response {
//!     if let Some(log) = req.logger() {
//!         log.info("cache miss", [("item", Value::from(req.param("id").unwrap_or("")))]);
//!     }
//!     Response::builder().status(StatusCode::NOT_FOUND).text("no such item")
//! }
//! ```
//!
//! ## Letting the host recover panics
//!
//! When the application prefers the host to turn panics into `500` and drive
//! logging itself, install the logger with [`middleware::SetLogger`] and let
//! [`middleware::RequestLogger`] + [`middleware::Recoverer`] call a
//! [`middleware::PanicSafeLogger`] entry. Use one style per router, not both.

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod context;
pub mod log;
pub mod middleware;
pub mod panic;

pub use error::Error;
pub use handler::Handler;
pub use request::{Request, RequestId};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
