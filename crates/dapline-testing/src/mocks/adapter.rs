//! Scripted in-process debug adapter
//!
//! [`MockAdapter`] speaks real DAP framing over an in-memory duplex pipe, so
//! a [`DebugSession`](dapline_dap::DebugSession) under test runs its
//! complete wire path. Each request command maps to a list of [`Action`]s
//! executed in order when that command arrives.

use dapline_dap::codec::{read_message, write_message};
use dapline_dap::{Event, ProtocolMessage, Request, Response, Transport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{BufReader, WriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 64 * 1024;

/// One step of a scripted reply
#[derive(Debug, Clone)]
pub enum Action {
    /// Successful response with an optional body
    Respond(Option<Value>),
    /// Failed response carrying this message
    Fail(String),
    /// Event with an optional body
    Event(String, Option<Value>),
    Delay(Duration),
    /// Close the pipe; the client sees end of stream
    Close,
}

impl Action {
    pub fn respond(body: Value) -> Self {
        Self::Respond(Some(body))
    }

    pub fn ok() -> Self {
        Self::Respond(None)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn event(name: impl Into<String>, body: Value) -> Self {
        Self::Event(name.into(), Some(body))
    }

    pub fn bare_event(name: impl Into<String>) -> Self {
        Self::Event(name.into(), None)
    }
}

type Writer = WriteHalf<tokio::io::DuplexStream>;

struct Inner {
    rules: Mutex<HashMap<String, Vec<Action>>>,
    requests: Mutex<Vec<Request>>,
    arrived: Notify,
    writer: AsyncMutex<Option<Writer>>,
    next_seq: AtomicI64,
    reverse_pending: Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    closed: AtomicBool,
}

impl Inner {
    fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn write(&self, message: ProtocolMessage) {
        let mut writer = self.writer.lock().await;
        if let Some(w) = writer.as_mut() {
            if write_message(w, &message).await.is_err() {
                *writer = None;
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = tokio::io::AsyncWriteExt::shutdown(&mut w).await;
        }
    }

    async fn run(&self, request: &Request, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Respond(body) => {
                    let mut response =
                        Response::success(self.next_seq(), request.seq, request.command.clone());
                    response.body = body;
                    self.write(ProtocolMessage::Response(response)).await;
                }
                Action::Fail(message) => {
                    let response = Response::error(
                        self.next_seq(),
                        request.seq,
                        request.command.clone(),
                        message,
                    );
                    self.write(ProtocolMessage::Response(response)).await;
                }
                Action::Event(name, body) => {
                    let mut event = Event::new(self.next_seq(), name);
                    event.body = body;
                    self.write(ProtocolMessage::Event(event)).await;
                }
                Action::Delay(duration) => tokio::time::sleep(duration).await,
                Action::Close => self.close().await,
            }
        }
    }
}

/// In-process adapter answering requests from a script
///
/// Unscripted commands get an empty success response. By default
/// `initialize` answers with configurationDone and terminate support and
/// then sends `initialized`.
#[derive(Clone)]
pub struct MockAdapter {
    inner: Arc<Inner>,
    serve_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        let adapter = Self {
            inner: Arc::new(Inner {
                rules: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                arrived: Notify::new(),
                writer: AsyncMutex::new(None),
                next_seq: AtomicI64::new(1),
                reverse_pending: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            serve_task: Arc::new(Mutex::new(None)),
        };
        adapter.on(
            "initialize",
            vec![
                Action::respond(json!({
                    "supportsConfigurationDoneRequest": true,
                    "supportsTerminateRequest": true
                })),
                Action::bare_event("initialized"),
            ],
        );
        adapter
    }

    /// Script the reply to `command`, replacing any earlier script
    pub fn on(&self, command: &str, actions: Vec<Action>) -> &Self {
        self.lock_rules().insert(command.to_string(), actions);
        self
    }

    /// Answer `command` with a successful response carrying `body`
    pub fn respond(&self, command: &str, body: Value) -> &Self {
        self.on(command, vec![Action::respond(body)])
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Action>>> {
        self.inner.rules.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Client end of the pipe; starts serving requests.
    ///
    /// Must be called from within a tokio runtime.
    pub fn transport(&self) -> Transport {
        let (client_end, adapter_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_read, client_write) = tokio::io::split(client_end);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_end);

        // Install the writer now so events sent right after this call are not lost
        let pending_writer = match self.inner.writer.try_lock() {
            Ok(mut slot) => {
                *slot = Some(adapter_write);
                None
            }
            Err(_) => Some(adapter_write),
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            if let Some(writer) = pending_writer {
                *inner.writer.lock().await = Some(writer);
            }
            let mut reader = BufReader::new(adapter_read);
            while let Ok(Some(message)) = read_message(&mut reader).await {
                match message {
                    ProtocolMessage::Request(request) => {
                        inner
                            .requests
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(request.clone());
                        inner.arrived.notify_waiters();

                        let actions = inner
                            .rules
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .get(&request.command)
                            .cloned()
                            .unwrap_or_else(|| vec![Action::ok()]);
                        let inner = Arc::clone(&inner);
                        tokio::spawn(async move { inner.run(&request, actions).await });
                    }
                    ProtocolMessage::Response(response) => {
                        let waiter = inner
                            .reverse_pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .remove(&response.request_seq);
                        if let Some(tx) = waiter {
                            let _ = tx.send(response);
                        }
                    }
                    ProtocolMessage::Event(_) => {}
                }
            }
            inner.arrived.notify_waiters();
        });
        if let Some(old) = self
            .serve_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task)
        {
            old.abort();
        }

        Transport::from_streams(client_read, client_write)
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<Request> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    pub fn requests_for(&self, command: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.command == command)
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.requests_for(command).len()
    }

    /// Wait until `command` has been received `n` times
    pub async fn wait_for_count(&self, command: &str, n: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.arrived.notified();
                if self.count(command) >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Wait for the first `command` request
    pub async fn wait_for(&self, command: &str, timeout: Duration) -> Option<Request> {
        if self.wait_for_count(command, 1, timeout).await {
            self.requests_for(command).into_iter().next()
        } else {
            None
        }
    }

    pub async fn send_event(&self, name: &str, body: Value) {
        let event = Event::new(self.inner.next_seq(), name).with_body(body);
        self.inner.write(ProtocolMessage::Event(event)).await;
    }

    /// Send a reverse request and wait for the client's response
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Option<Response> {
        let seq = self.inner.next_seq();
        let (tx, rx) = oneshot::channel();
        self.inner
            .reverse_pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(seq, tx);
        let request = Request::new(seq, command).with_arguments(arguments);
        self.inner.write(ProtocolMessage::Request(request)).await;
        tokio::time::timeout(timeout, rx).await.ok()?.ok()
    }

    /// Drop the connection as a crashed adapter would
    pub async fn close(&self) {
        self.inner.close().await;
        if let Some(task) = self
            .serve_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
