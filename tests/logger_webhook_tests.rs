//! Integration Tests for the Logger's webhook and file sinks
//!
//! Spins up a local axum receiver and checks what the webhook sink delivers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use cacheflow::logger::{FileSink, Logger, Sink, WebhookSink};
use cacheflow::Error;
use parking_lot::Mutex;
use serde_json::{json, Value};

// == Helper Functions ==

type Received = Arc<Mutex<Vec<Value>>>;

async fn record_hook(State(received): State<Received>, Json(body): Json<Value>) -> StatusCode {
    received.lock().push(body);
    StatusCode::NO_CONTENT
}

async fn reject_hook() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Starts a receiver on an ephemeral port and returns its base URL.
async fn spawn_receiver() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(record_hook))
        .route("/broken", post(reject_hook))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), received)
}

// == Webhook Sink ==

#[tokio::test]
async fn test_webhook_sink_posts_formatted_line() {
    let (base, received) = spawn_receiver().await;
    let sink = WebhookSink::new(&format!("{base}/hook")).unwrap();
    let logger = Logger::builder()
        .name("billing")
        .channel("error", vec![Arc::new(sink) as Arc<dyn Sink>])
        .build();

    logger
        .error(&[json!("charge failed"), json!({"invoice": 12})])
        .await
        .unwrap();

    let bodies = received.lock();
    assert_eq!(bodies.len(), 1);
    let text = bodies[0]["text"].as_str().unwrap();
    assert!(text.ends_with(r#"[ERROR] [billing] charge failed {"invoice":12}"#));
}

#[tokio::test]
async fn test_webhook_failure_is_routed_to_error_hook() {
    let (base, _received) = spawn_receiver().await;
    let failures = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = failures.clone();

    let logger = Logger::builder()
        .channel(
            "warn",
            vec![Arc::new(WebhookSink::new(&format!("{base}/broken")).unwrap()) as Arc<dyn Sink>],
        )
        .error_logging(move |err, channel| {
            assert!(matches!(err, Error::Sink(_)));
            recorder.lock().push(channel.to_string());
        })
        .build();

    assert!(logger.warn(&[json!("disk at 91%")]).await.is_ok());
    assert_eq!(*failures.lock(), vec!["warn".to_string()]);
}

#[tokio::test]
async fn test_webhook_unreachable_host_is_sink_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sink = WebhookSink::new(&format!("http://{addr}/hook")).unwrap();
    assert!(matches!(sink.send("hello").await, Err(Error::Sink(_))));
}

// == File Sink ==

#[tokio::test]
async fn test_file_and_webhook_sinks_receive_same_line() {
    let (base, received) = spawn_receiver().await;
    let path = std::env::temp_dir().join(format!("cacheflow-fanout-{}.log", std::process::id()));
    let _ = tokio::fs::remove_file(&path).await;

    let logger = Logger::builder().build();
    logger
        .register("info", Arc::new(FileSink::new(&path)))
        .register("info", Arc::new(WebhookSink::new(&format!("{base}/hook")).unwrap()));

    logger.info(&[json!("deployed"), json!(3)]).await.unwrap();

    let file_line = tokio::fs::read_to_string(&path).await.unwrap();
    let posted = received.lock()[0]["text"].as_str().unwrap().to_string();
    assert_eq!(file_line.trim_end(), posted);
    assert!(posted.ends_with("[INFO] deployed 3"));

    let _ = tokio::fs::remove_file(&path).await;
}
