//! Thread/frame cache and variable resolver against a recording client
//!
//! Run with: cargo test --package dapline-dap --test inspection_caches

use dapline_dap::{DapClientRef, Error, ThreadCache, VariableResolver};
use dapline_testing::{fixtures, RecordingClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn thread_cache() -> (Arc<RecordingClient>, ThreadCache) {
    let client = Arc::new(RecordingClient::new());
    let cache = ThreadCache::new(client.clone() as DapClientRef, 20);
    (client, cache)
}

#[tokio::test]
async fn test_threads_fetched_once_until_dirty() {
    let (client, cache) = thread_cache();
    client.respond_always(
        "threads",
        fixtures::threads_body(&[(1, "MainThread"), (2, "worker")]),
    );

    let threads = cache.get_threads().await;
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].display_name(), "MainThread");
    cache.get_threads().await;
    assert_eq!(client.count("threads"), 1);

    cache.mark_threads_dirty();
    cache.get_threads().await;
    assert_eq!(client.count("threads"), 2);
}

#[tokio::test]
async fn test_failed_thread_refresh_keeps_last_list() {
    let (client, cache) = thread_cache();
    client.respond("threads", fixtures::threads_body(&[(1, "MainThread")]));
    cache.get_threads().await;

    cache.mark_threads_dirty();
    client.fail("threads", "busy");
    let threads = cache.get_threads().await;
    assert_eq!(threads.len(), 1);
    assert!(cache.is_threads_dirty());
}

#[tokio::test]
async fn test_unnamed_thread_shows_pending_and_requests_refresh() {
    let (client, cache) = thread_cache();
    client.respond("threads", fixtures::threads_body(&[]));
    cache.get_threads().await;

    cache.on_stopped(Some(7), false);
    assert_eq!(cache.display_name(7), "<pending>");
    assert!(cache.is_threads_dirty());
}

#[tokio::test]
async fn test_running_thread_has_no_frames() {
    let (client, cache) = thread_cache();
    client.respond("threads", fixtures::threads_body(&[(1, "MainThread")]));
    cache.get_threads().await;

    assert!(cache.get_stack_frames(1).await.unwrap().is_empty());
    assert!(cache.get_stack_frames(99).await.unwrap().is_empty());
    assert_eq!(client.count("stackTrace"), 0);
}

#[tokio::test]
async fn test_stop_dirties_only_the_stopped_thread() {
    let (client, cache) = thread_cache();
    client.respond(
        "threads",
        fixtures::threads_body(&[(1, "MainThread"), (2, "worker")]),
    );
    cache.get_threads().await;
    cache.on_stopped(None, true);
    client.respond_always(
        "stackTrace",
        fixtures::stack_body(vec![fixtures::frame(100, "main", "/app.py", 3)]),
    );
    cache.get_stack_frames(1).await.unwrap();
    cache.get_stack_frames(2).await.unwrap();
    assert_eq!(cache.is_frames_dirty(1), Some(false));
    assert_eq!(cache.is_frames_dirty(2), Some(false));

    cache.on_stopped(Some(1), false);
    assert_eq!(cache.is_frames_dirty(1), Some(true));
    assert_eq!(cache.is_frames_dirty(2), Some(false));
    assert!(cache.thread(1).unwrap().suspended);
}

#[tokio::test]
async fn test_frame_identity_survives_refresh() {
    let (client, cache) = thread_cache();
    cache.on_stopped(Some(1), true);
    client.respond(
        "stackTrace",
        fixtures::stack_body(vec![
            fixtures::frame(100, "compute", "/app.py", 10),
            fixtures::frame(101, "main", "/app.py", 30),
        ]),
    );
    let first = cache.get_stack_frames(1).await.unwrap();
    assert_eq!(first.len(), 2);

    // Next stop: same functions, new frame ids and a line moved
    cache.on_stopped(Some(1), false);
    client.respond(
        "stackTrace",
        fixtures::stack_body(vec![
            fixtures::frame(200, "compute", "/app.py", 11),
            fixtures::frame(201, "main", "/app.py", 30),
            fixtures::frame(202, "<module>", "/app.py", 40),
        ]),
    );
    let second = cache.get_stack_frames(1).await.unwrap();
    assert_eq!(second.len(), 3);
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert!(Arc::ptr_eq(&first[1], &second[1]));
    assert_eq!(second[0].id(), 200);
    assert_eq!(second[0].line(), 11);

    // A shorter stack trims the tail
    cache.on_stopped(Some(1), false);
    client.respond(
        "stackTrace",
        fixtures::stack_body(vec![fixtures::frame(300, "compute", "/app.py", 12)]),
    );
    let third = cache.get_stack_frames(1).await.unwrap();
    assert_eq!(third.len(), 1);
    assert!(Arc::ptr_eq(&first[0], &third[0]));
}

#[tokio::test]
async fn test_stack_trace_request_uses_page_size() {
    let (client, cache) = thread_cache();
    cache.on_stopped(Some(4), false);
    cache.get_stack_frames(4).await.unwrap();

    let args = &client.requests_for("stackTrace")[0];
    assert_eq!(args["threadId"], 4);
    assert_eq!(args["startFrame"], 0);
    assert_eq!(args["levels"], 20);
}

#[tokio::test]
async fn test_stack_trace_failure_is_reported_and_retried() {
    let (client, cache) = thread_cache();
    cache.on_stopped(Some(1), false);
    client.fail("stackTrace", "thread is running");

    let err = cache.get_stack_frames(1).await.unwrap_err();
    assert!(matches!(err, Error::RequestFailed { .. }));
    assert_eq!(cache.is_frames_dirty(1), Some(true));

    cache.get_stack_frames(1).await.unwrap();
    assert_eq!(client.count("stackTrace"), 2);
}

#[tokio::test]
async fn test_closed_channel_yields_no_frames() {
    let (client, cache) = thread_cache();
    cache.on_stopped(Some(1), false);
    client.close();
    assert!(cache.get_stack_frames(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_request_and_failure() {
    let (_client, cache) = thread_cache();
    cache.on_stopped(Some(1), false);

    cache.on_resume_requested(1);
    let thread = cache.thread(1).unwrap();
    assert!(!thread.suspended);
    assert!(thread.stepping);

    cache.on_resume_failed(1, "not suspended".into());
    let thread = cache.thread(1).unwrap();
    assert!(thread.suspended);
    assert_eq!(thread.error_message.as_deref(), Some("not suspended"));
}

#[tokio::test]
async fn test_continued_for_unseen_thread_creates_entry() {
    let (_client, cache) = thread_cache();
    cache.on_stopped(Some(1), false);
    cache.on_continued(Some(99), false);

    let thread = cache.thread(99).expect("entry for the continued thread");
    assert!(!thread.suspended);
    assert_eq!(cache.is_frames_dirty(99), Some(true));
    // Only the named thread resumed
    assert!(cache.thread(1).unwrap().suspended);

    cache.on_continued(Some(42), true);
    assert!(cache.thread(42).is_some());
    assert!(!cache.any_suspended());
}

#[tokio::test]
async fn test_thread_stopped_during_refresh_survives_it() {
    let (client, cache) = thread_cache();
    client.respond_after(
        "threads",
        Duration::from_millis(50),
        fixtures::threads_body(&[(1, "MainThread")]),
    );

    let (threads, ()) = tokio::join!(cache.get_threads(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.on_stopped(Some(7), false);
    });

    assert_eq!(threads.len(), 2);
    assert!(cache.thread(7).unwrap().suspended);
    assert!(cache.is_threads_dirty());

    // The next refresh is authoritative again
    client.respond("threads", fixtures::threads_body(&[(1, "MainThread")]));
    let threads = cache.get_threads().await;
    assert_eq!(threads.len(), 1);
    assert!(cache.thread(7).is_none());
}

// ============================================================
// VARIABLES
// ============================================================

async fn stopped_frame(
    client: &Arc<RecordingClient>,
    cache: &ThreadCache,
) -> dapline_dap::StackFrameRef {
    cache.on_stopped(Some(1), false);
    client.respond(
        "stackTrace",
        fixtures::stack_body(vec![fixtures::frame(100, "main", "/app.py", 3)]),
    );
    cache.top_frame(1).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_scopes_cached_on_frame() {
    let (client, cache) = thread_cache();
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    let frame = stopped_frame(&client, &cache).await;
    client.respond(
        "scopes",
        fixtures::scopes_body(&[("Locals", 5), ("Globals", 6)]),
    );

    let scopes = resolver.scopes(&frame).await.unwrap();
    assert_eq!(scopes.len(), 2);
    assert_eq!(scopes[0].name, "Locals");
    assert!(scopes[0].value.has_children());
    resolver.scopes(&frame).await.unwrap();
    assert_eq!(client.count("scopes"), 1);
}

#[tokio::test]
async fn test_variables_fetched_lazily_once() {
    let client = Arc::new(RecordingClient::new());
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    client.respond(
        "variables",
        fixtures::variables_body(&[("x", "1", "int", 0), ("items", "[1, 2]", "list", 9)]),
    );

    let variables = resolver.get_variables(5).await.unwrap();
    assert_eq!(variables.len(), 2);
    assert_eq!(variables[1].owner_reference, 5);
    assert!(variables[1].value.has_children());
    assert!(!variables[0].value.has_children());

    resolver.get_variables(5).await.unwrap();
    assert_eq!(client.count("variables"), 1);
    assert!(resolver.get_variables(0).await.unwrap().is_empty());
    assert_eq!(client.count("variables"), 1);
}

#[tokio::test]
async fn test_set_value_invalidates_owner() {
    let client = Arc::new(RecordingClient::new());
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    client.respond_always("variables", fixtures::variables_body(&[("x", "1", "int", 0)]));
    let x = resolver.get_variables(5).await.unwrap().remove(0);

    client.respond("setVariable", json!({ "value": "42", "type": "int" }));
    let updated = resolver.set_value(&x, "41 + 1").await.unwrap();
    assert_eq!(updated.value.display, "42");
    assert_eq!(updated.value.type_name.as_deref(), Some("int"));

    let args = &client.requests_for("setVariable")[0];
    assert_eq!(args["variablesReference"], 5);
    assert_eq!(args["name"], "x");
    assert_eq!(args["value"], "41 + 1");

    // Siblings are refetched after a write
    resolver.get_variables(5).await.unwrap();
    assert_eq!(client.count("variables"), 2);
}

#[tokio::test]
async fn test_set_value_without_echo_shows_expression() {
    let client = Arc::new(RecordingClient::new());
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    client.respond("variables", fixtures::variables_body(&[("name", "'a'", "str", 0)]));
    let name = resolver.get_variables(3).await.unwrap().remove(0);

    let updated = resolver.set_value(&name, "'b'").await.unwrap();
    assert_eq!(updated.value.display, "'b'");
    assert_eq!(updated.value.type_name.as_deref(), Some("str"));
}

#[tokio::test]
async fn test_evaluate_uses_hover_context() {
    let client = Arc::new(RecordingClient::new());
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    client.respond(
        "evaluate",
        json!({ "result": "3", "type": "int", "variablesReference": 0 }),
    );

    let result = resolver.evaluate(Some(100), "len(items)").await.unwrap();
    assert_eq!(result.name, "len(items)");
    assert_eq!(result.value.display, "3");

    let args = &client.requests_for("evaluate")[0];
    assert_eq!(args["context"], "hover");
    assert_eq!(args["frameId"], 100);
}

#[tokio::test]
async fn test_closed_channel_yields_no_variables() {
    let client = Arc::new(RecordingClient::new());
    let resolver = VariableResolver::new(client.clone() as DapClientRef);
    client.close();
    assert!(resolver.get_variables(5).await.unwrap().is_empty());
}
