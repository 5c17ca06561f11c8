mod common;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::{Method, StatusCode};
use kiroku::log::{Level, Logger, Value};
use kiroku::middleware::{LogRequests, RequestLogging, SetLogger, enrich};
use kiroku::{Request, Response, Router, context, panic};

use common::{Broken, Capture, get, get_with_id, str_field, uint_field};

async fn missing_item(_req: Request) -> Response {
    tokio::time::sleep(Duration::from_millis(3)).await;
    Response::builder().status(StatusCode::NOT_FOUND).text("no such item")
}

fn logged(capture: &Capture) -> RequestLogging {
    RequestLogging::new(capture.logger()).enrich(enrich::request_id())
}

#[tokio::test]
async fn not_found_with_correlation_id() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/items/{id}", missing_item)
        .wrap(logged(&capture));

    let res = app.handle(get_with_id("/items/42", "abc123")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

    let records = capture.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.message, "request");
    assert_eq!(record.level, Level::Info);
    assert_eq!(str_field(record, "requestID"), Some("abc123"));
    assert_eq!(str_field(record, "method"), Some("GET"));
    assert_eq!(str_field(record, "url"), Some("/items/42"));
    assert_eq!(uint_field(record, "status"), Some(404));
    assert_eq!(uint_field(record, "bytes"), Some(12));

    let latency = record.get("latency").and_then(Value::as_duration).unwrap();
    assert!(latency >= Duration::from_millis(3), "latency {latency:?}");
    assert!(latency < Duration::from_secs(2), "latency {latency:?}");
}

#[tokio::test]
async fn severity_is_error_only_for_5xx() {
    for (code, level) in [
        (200, Level::Info),
        (301, Level::Info),
        (404, Level::Info),
        (500, Level::Error),
        (503, Level::Error),
    ] {
        let capture = Capture::default();
        let app = Router::new()
            .on(Method::GET, "/", move |_req: Request| async move {
                StatusCode::from_u16(code).unwrap()
            })
            .wrap(logged(&capture));

        let res = app.handle(get("/")).await;
        assert_eq!(res.status_code().as_u16(), code);

        let records = capture.records();
        assert_eq!(records.len(), 1, "status {code}");
        assert_eq!(records[0].level, level, "status {code}");
        assert_eq!(uint_field(&records[0], "status"), Some(u64::from(code)));
    }
}

#[tokio::test]
async fn absent_correlation_id_is_omitted() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/", |_req: Request| async { "ok" })
        .wrap(logged(&capture));

    app.handle(get("/")).await;

    let records = capture.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].get("requestID").is_none());
    assert!(records[0].fields.iter().all(|f| f.key != "requestID"));
}

#[tokio::test]
async fn unset_status_is_logged_as_200() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/", |_req: Request| async { Response::builder().json("{}") })
        .wrap(logged(&capture));

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(uint_field(&capture.records()[0], "status"), Some(200));
    assert_eq!(uint_field(&capture.records()[0], "bytes"), Some(2));
}

#[tokio::test]
async fn response_passes_through_unchanged() {
    async fn created(_req: Request) -> Response {
        Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/items/99")
            .header("x-custom", "a")
            .header("x-custom", "b")
            .json(r#"{"id":"99"}"#)
    }

    let capture = Capture::default();
    let plain = Router::new().on(Method::POST, "/items", created);
    let wrapped = Router::new().on(Method::POST, "/items", created).wrap(logged(&capture));

    let post = || {
        Request::from_http(
            http::Request::post("/items")
                .header("x-request-id", "p-1")
                .body(bytes::Bytes::from_static(b"{}"))
                .unwrap(),
        )
    };
    let expected = plain.handle(post()).await;
    let observed = wrapped.handle(post()).await;

    assert_eq!(observed.status_code(), expected.status_code());
    assert_eq!(observed.headers(), expected.headers());
    assert_eq!(observed.body(), expected.body());

    let record = &capture.records()[0];
    assert_eq!(uint_field(record, "status"), Some(201));
    assert_eq!(uint_field(record, "bytes"), Some(expected.body().len() as u64));
}

#[tokio::test]
async fn panic_is_logged_once_and_keeps_propagating() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/items/{id}", |_req: Request| async {
            if true {
                panic!("boom");
            }
            "unreachable"
        })
        .wrap(logged(&capture));

    let outcome = AssertUnwindSafe(app.handle(get_with_id("/items/42", "abc123")))
        .catch_unwind()
        .await;

    let payload = outcome.expect_err("panic must reach the caller");
    assert_eq!(panic::describe(payload.as_ref()), "boom");

    let records = capture.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.level, Level::Panic);
    assert_eq!(str_field(record, "panic"), Some("boom"));
    assert_eq!(str_field(record, "requestID"), Some("abc123"));
    let stack = record.get("stack").and_then(Value::as_bytes).unwrap();
    assert!(!stack.is_empty());
    for absent in ["status", "latency", "bytes"] {
        assert!(record.get(absent).is_none(), "{absent} on a panic record");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_ids() {
    async fn item(req: Request) -> String {
        let id: u64 = req.param("id").unwrap().parse().unwrap();
        tokio::time::sleep(Duration::from_millis(id % 5)).await;
        // Whatever the handler logs mid-flight carries its own request's ID.
        if let Some(log) = context::current() {
            log.info("lookup", [("item", Value::from(id))]);
        }
        format!("item {id}")
    }

    let capture = Capture::default();
    let app = Arc::new(
        Router::new()
            .on(Method::GET, "/items/{id}", item)
            .wrap(logged(&capture)),
    );

    let tasks: Vec<_> = (0..64u64)
        .map(|n| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                app.handle(get_with_id(&format!("/items/{n}"), &format!("req-{n}"))).await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().status_code(), StatusCode::OK);
    }

    let records = capture.records();
    assert_eq!(records.len(), 128);
    for record in &records {
        let id = str_field(record, "requestID").unwrap();
        let n = id.strip_prefix("req-").unwrap();
        match record.message {
            "request" => assert_eq!(str_field(record, "url"), Some(format!("/items/{n}").as_str())),
            "lookup" => assert_eq!(record.get("item").and_then(Value::as_u64), n.parse().ok()),
            other => panic!("unexpected message {other}"),
        }
    }
}

#[tokio::test]
async fn no_installed_logger_means_no_logging_and_no_failure() {
    let app = Router::new()
        .on(Method::GET, "/", |req: Request| async move {
            assert!(req.logger().is_none());
            assert!(context::current().is_none());
            "served"
        })
        .wrap(RequestLogging::from_context())
        .wrap(LogRequests);

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"served");
}

#[tokio::test]
async fn layered_logger_is_enriched_again_downstream() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/", |_req: Request| async { "ok" })
        .wrap(SetLogger::new(capture.logger()).enrich(enrich::request_id()))
        .wrap(RequestLogging::from_context().enrich(enrich::field("component", "api")));

    app.handle(get_with_id("/", "layer-1")).await;

    let records = capture.records();
    assert_eq!(records.len(), 1);
    assert_eq!(str_field(&records[0], "requestID"), Some("layer-1"));
    assert_eq!(str_field(&records[0], "component"), Some("api"));
}

#[tokio::test]
async fn failing_sink_does_not_affect_the_response() {
    let app = Router::new()
        .on(Method::GET, "/", |_req: Request| async { StatusCode::SERVICE_UNAVAILABLE })
        .wrap(RequestLogging::new(Logger::new(Broken)).enrich(enrich::request_id()));

    let res = app.handle(get_with_id("/", "lost")).await;
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn absolute_form_target_logs_path_only() {
    let capture = Capture::default();
    let app = Router::new()
        .on(Method::GET, "/items/{id}", missing_item)
        .wrap(logged(&capture));

    app.handle(get_with_id("http://localhost:3000/items/42", "h2-1")).await;

    let records = capture.records();
    assert_eq!(records.len(), 1);
    assert_eq!(str_field(&records[0], "url"), Some("/items/42"));
    assert_eq!(str_field(&records[0], "requestID"), Some("h2-1"));
}
