//! Request logging behind a proxy — one `request` record per request.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example request_logging
//!
//! Try:
//!   curl -H 'x-request-id: abc123' http://localhost:3000/items/42
//!   curl http://localhost:3000/items/0        # handler panics, logged at panic severity
//!   curl http://localhost:3000/nope           # 404s are logged too

use http::{Method, StatusCode};
use kiroku::log::{Logger, TracingSink, Value};
use kiroku::middleware::{PropagateRequestId, RequestLogging, enrich};
use kiroku::{Request, Response, Router, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Router::new()
        .on(Method::GET, "/items/{id}", get_item)
        .wrap(PropagateRequestId::new())
        .wrap(
            RequestLogging::new(Logger::new(TracingSink))
                .enrich(enrich::request_id())
                .enrich(enrich::remote_addr()),
        );

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /items/{id}
//
// `id = 0` panics on purpose. Nothing recovers it here, so the record is
// written and the connection is dropped by the server.
async fn get_item(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    if id == "0" {
        panic!("item 0 is cursed");
    }

    if let Some(log) = req.logger() {
        log.info("cache miss", [("item", Value::from(id))]);
    }

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .json(format!(r#"{{"error":"no item {id}"}}"#))
}
