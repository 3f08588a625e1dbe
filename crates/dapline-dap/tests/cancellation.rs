//! Cancelling waits on requests the adapter never answers
//!
//! Run with: cargo test --package dapline-dap --test cancellation

use dapline_dap::{block_on_cancellable, wait_cancellable, DapBroker, Error};
use dapline_testing::{Action, MockAdapter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const POLL: Duration = Duration::from_millis(100);

/// Broker connected to an adapter that never answers `evaluate`
fn silent_broker(runtime: &tokio::runtime::Runtime) -> (MockAdapter, Arc<DapBroker>) {
    let _guard = runtime.enter();
    let adapter = MockAdapter::new();
    adapter.on("evaluate", vec![]);
    let (reader, writer, _) = adapter.transport().into_parts();
    (adapter, Arc::new(DapBroker::new(reader, writer)))
}

#[test]
fn test_blocking_wait_returns_within_one_poll_of_cancel() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (_adapter, broker) = silent_broker(&runtime);
    let handle = runtime
        .block_on(broker.send("evaluate", None))
        .expect("request sent");
    assert_eq!(broker.pending_request_count(), 1);

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            let cancelled_at = Instant::now();
            token.cancel();
            cancelled_at
        })
    };

    let result = block_on_cancellable(runtime.handle(), handle, &token, POLL);
    let returned_at = Instant::now();
    let cancelled_at = canceller.join().unwrap();

    assert_eq!(result.unwrap_err(), Error::Cancelled);
    let latency = returned_at.duration_since(cancelled_at);
    assert!(
        latency <= Duration::from_millis(150),
        "cancel observed after {:?}",
        latency
    );

    // The aborted wait dropped the handle, which deregisters the request
    let deadline = Instant::now() + Duration::from_secs(1);
    while broker.pending_request_count() > 0 {
        assert!(Instant::now() < deadline, "pending request leaked");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_blocking_wait_returns_response() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (adapter, broker) = silent_broker(&runtime);
    adapter.on("threads", vec![Action::ok()]);
    let handle = runtime.block_on(broker.send("threads", None)).unwrap();

    let response = block_on_cancellable(
        runtime.handle(),
        handle,
        &CancellationToken::new(),
        POLL,
    )
    .unwrap();
    assert!(response.success);
    assert_eq!(response.command, "threads");
}

#[tokio::test]
async fn test_async_wait_cancel_deregisters_request() {
    let adapter = MockAdapter::new();
    adapter.on("evaluate", vec![]);
    let (reader, writer, _) = adapter.transport().into_parts();
    let broker = DapBroker::new(reader, writer);

    let handle = broker.send("evaluate", None).await.unwrap();
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let result = wait_cancellable(handle, &token).await;
    assert_eq!(result.unwrap_err(), Error::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(broker.pending_request_count(), 0);
}

#[tokio::test]
async fn test_explicit_cancel_resolves_waiter() {
    let adapter = MockAdapter::new();
    adapter.on("evaluate", vec![]);
    let (reader, writer, _) = adapter.transport().into_parts();
    let broker = DapBroker::new(reader, writer);

    let handle = broker.send("evaluate", None).await.unwrap();
    let canceller = handle.canceller();
    assert!(canceller.cancel());
    assert_eq!(handle.await.unwrap_err(), Error::Cancelled);
    assert!(!canceller.cancel());
    assert_eq!(broker.pending_request_count(), 0);
}

#[test]
fn test_session_blocking_request_honours_token() {
    use dapline_config::SessionConfig;
    use dapline_dap::{DebugSession, SessionOptions};
    use dapline_testing::fixtures;

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let adapter = {
        let _guard = runtime.enter();
        MockAdapter::new()
    };
    adapter.on("evaluate", vec![]);
    adapter.respond("threads", serde_json::json!({ "threads": [] }));
    let config = SessionConfig {
        poll_interval_ms: 100,
        ..SessionConfig::default()
    };
    let session = runtime
        .block_on(async {
            let options =
                SessionOptions::new(fixtures::launch_parameters("/app/main.py")).config(config);
            DebugSession::start(adapter.transport(), options).await
        })
        .unwrap();

    let threads = session
        .request_blocking(runtime.handle(), "threads", None, &CancellationToken::new())
        .unwrap();
    assert!(threads.success);

    let token = CancellationToken::new();
    token.cancel();
    let result = session.request_blocking(runtime.handle(), "evaluate", None, &token);
    assert_eq!(result.unwrap_err(), Error::Cancelled);
}
