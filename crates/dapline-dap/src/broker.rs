//! DAP Broker - the RPC channel to one debug adapter
//!
//! The broker handles:
//! - Message framing (via [`crate::codec`])
//! - Sequence number generation
//! - Request/response correlation through [`ResultHandle`]s
//! - Event delivery to subscribers, optionally filtered by event name
//! - Reverse requests from the adapter, each served on its own task
//!
//! A single reader task owns the inbound stream. It never awaits a
//! subscriber or a handler, so a slow consumer cannot stall responses.

use crate::client::{check_success, DapClient};
use crate::codec;
use crate::{Error, Event, ProtocolMessage, Request, Response, Result};
use async_trait::async_trait;
use dapline_config::SessionConfig;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

/// Channel for sending responses back to request callers
type ResponseSender = oneshot::Sender<Result<Response>>;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serves one reverse-request command sent by the adapter.
///
/// `Ok(body)` becomes a success response, `Err` an error response carrying
/// the error text.
#[async_trait]
pub trait ReverseRequestHandler: Send + Sync {
    async fn handle(&self, request: &Request) -> Result<Option<serde_json::Value>>;
}

// ============================================================
// PENDING REQUESTS
// ============================================================

/// Outstanding requests keyed by sequence number
#[derive(Default)]
struct PendingRequests {
    inner: Mutex<HashMap<i64, ResponseSender>>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, ResponseSender>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, seq: i64) -> oneshot::Receiver<Result<Response>> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(seq, tx);
        rx
    }

    fn complete(&self, response: Response) {
        let sender = self.lock().remove(&response.request_seq);
        match sender {
            Some(tx) => {
                if tx.send(Ok(response)).is_err() {
                    trace!("Response arrived after caller stopped waiting");
                }
            }
            None => debug!(
                "Received response for unknown or abandoned request seq: {}",
                response.request_seq
            ),
        }
    }

    /// Resolve a pending request as cancelled; false if already resolved
    fn cancel(&self, seq: i64) -> bool {
        match self.lock().remove(&seq) {
            Some(tx) => {
                let _ = tx.send(Err(Error::Cancelled));
                true
            }
            None => false,
        }
    }

    fn remove(&self, seq: i64) {
        self.lock().remove(&seq);
    }

    fn fail_all(&self, error: &Error) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

// ============================================================
// RESULT HANDLE
// ============================================================

/// Pending result of one request.
///
/// Await it for the raw response (successful or not). Dropping an
/// unresolved handle deregisters the request; a late response is then
/// discarded.
#[must_use = "dropping a ResultHandle abandons the request"]
pub struct ResultHandle {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<Result<Response>>,
    pending: Arc<PendingRequests>,
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("seq", &self.seq)
            .field("command", &self.command)
            .finish()
    }
}

impl ResultHandle {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Resolve this handle with [`Error::Cancelled`] now.
    ///
    /// Nothing is sent to the adapter. No-op if the response already arrived.
    pub fn cancel(&self) -> bool {
        self.pending.cancel(self.seq)
    }

    /// Cancellation handle usable from another task while this one is awaited
    pub fn canceller(&self) -> RequestCanceller {
        RequestCanceller {
            seq: self.seq,
            pending: Arc::downgrade(&self.pending),
        }
    }

    /// Await with a deadline; the request is abandoned on timeout
    pub async fn with_timeout(self, timeout: Duration) -> Result<Response> {
        let command = self.command.clone();
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(command = %command, timeout_ms, "DAP request timed out");
                Err(Error::Timeout(timeout_ms))
            }
        }
    }
}

impl Future for ResultHandle {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Transport(
                "Response channel closed".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResultHandle {
    fn drop(&mut self) {
        self.pending.remove(self.seq);
    }
}

/// Cancels one request from outside the task awaiting it
#[derive(Debug, Clone)]
pub struct RequestCanceller {
    seq: i64,
    pending: Weak<PendingRequests>,
}

impl RequestCanceller {
    pub fn cancel(&self) -> bool {
        self.pending
            .upgrade()
            .is_some_and(|pending| pending.cancel(self.seq))
    }
}

// ============================================================
// BROKER
// ============================================================

struct Subscriber {
    /// Only events with this name are delivered; `None` receives all
    filter: Option<String>,
    tx: SubscriberTx,
}

/// Host listeners get a bounded channel and may miss events when they fall
/// behind; the owning session's pump must see every event
enum SubscriberTx {
    Bounded(mpsc::Sender<Event>),
    Lossless(mpsc::UnboundedSender<Event>),
}

impl SubscriberTx {
    fn is_closed(&self) -> bool {
        match self {
            SubscriberTx::Bounded(tx) => tx.is_closed(),
            SubscriberTx::Lossless(tx) => tx.is_closed(),
        }
    }
}

struct Shared {
    next_seq: AtomicI64,
    pending: Arc<PendingRequests>,
    subscribers: RwLock<Vec<Subscriber>>,
    reverse_handlers: RwLock<HashMap<String, Arc<dyn ReverseRequestHandler>>>,
    writer: tokio::sync::Mutex<BoxedWriter>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    config: SessionConfig,
}

impl Shared {
    fn next_sequence(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write(&self, message: &ProtocolMessage) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("Channel closed".to_string()));
        }
        if self.config.trace.messages {
            debug!(target: "dapline_dap::messages", "--> {}", message_preview(message));
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = codec::write_message(&mut **writer, message).await {
            drop(writer);
            let error = Error::Transport(format!("Write failed: {}", e));
            self.shut_down(&error);
            return Err(error);
        }
        trace!(seq = message.seq(), name = message.name(), "Sent message");
        Ok(())
    }

    /// Close the channel once: fail pending requests, close subscriber channels
    fn shut_down(&self, reason: &Error) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let failed = self.pending.fail_all(reason);
        let subscriber_count = {
            let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        info!(
            failed_requests = failed,
            subscribers = subscriber_count,
            "DAP channel closed: {}",
            reason
        );
        self.closed_tx.send_replace(true);
    }

    fn dispatch_event(&self, event: Event) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        trace!(
            "Dispatching event '{}' to {} subscriber(s)",
            event.event,
            subscribers.len()
        );
        let mut dropped_count = 0;
        subscribers.retain(|subscriber| {
            if subscriber
                .filter
                .as_deref()
                .is_some_and(|name| name != event.event)
            {
                return !subscriber.tx.is_closed();
            }
            match &subscriber.tx {
                SubscriberTx::Bounded(tx) => match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped_count += 1;
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                },
                SubscriberTx::Lossless(tx) => tx.send(event.clone()).is_ok(),
            }
        });
        if dropped_count > 0 {
            warn!(
                "Dropped event '{}' for {} slow subscriber(s) - channel(s) full",
                event.event, dropped_count
            );
        }
    }

    fn dispatch_reverse_request(self: &Arc<Self>, request: Request) {
        let handler = self
            .reverse_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.command)
            .cloned();

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let seq = shared.next_sequence();
            let response = match handler {
                Some(handler) => match handler.handle(&request).await {
                    Ok(body) => {
                        let response = Response::success(seq, request.seq, &request.command);
                        match body {
                            Some(body) => response.with_body(body),
                            None => response,
                        }
                    }
                    Err(e) => {
                        warn!(command = %request.command, "Reverse request failed: {}", e);
                        Response::error(seq, request.seq, &request.command, e.to_string())
                    }
                },
                None => {
                    debug!(command = %request.command, "Unsupported reverse request");
                    Response::error(
                        seq,
                        request.seq,
                        &request.command,
                        format!("Unsupported request '{}'", request.command),
                    )
                }
            };
            if let Err(e) = shared.write(&ProtocolMessage::Response(response)).await {
                debug!("Failed to answer reverse request: {}", e);
            }
        });
    }
}

/// RPC channel over one transport
pub struct DapBroker {
    shared: Arc<Shared>,
    closed_rx: watch::Receiver<bool>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DapBroker {
    /// Create a broker over the given streams and start its reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new_with_config<R, W>(reader: R, writer: W, config: SessionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed_tx, closed_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            next_seq: AtomicI64::new(1),
            pending: Arc::new(PendingRequests::default()),
            subscribers: RwLock::new(Vec::new()),
            reverse_handlers: RwLock::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            closed: AtomicBool::new(false),
            closed_tx,
            config,
        });

        let reader_task = Self::spawn_reader_task(reader, Arc::clone(&shared));

        Self {
            shared,
            closed_rx,
            reader_task: Mutex::new(Some(reader_task)),
        }
    }

    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new_with_config(reader, writer, SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Send a request and return a handle to its pending result.
    ///
    /// The request is registered before its bytes are written, so a
    /// response can never arrive for an unknown sequence number.
    #[tracing::instrument(skip(self, arguments), fields(seq))]
    pub async fn send(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<ResultHandle> {
        if self.is_closed() {
            return Err(Error::Transport("Channel closed".to_string()));
        }

        let seq = self.shared.next_sequence();
        tracing::Span::current().record("seq", seq);
        debug!(command = %command, "Sending DAP request");

        let rx = self.shared.pending.register(seq);
        // Dropping the handle on a failed write deregisters the request
        let handle = ResultHandle {
            seq,
            command: command.to_string(),
            rx,
            pending: Arc::clone(&self.shared.pending),
        };

        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        self.shared.write(&ProtocolMessage::Request(request)).await?;
        Ok(handle)
    }

    /// Subscribe to every event
    pub fn subscribe_events(&self) -> mpsc::Receiver<Event> {
        self.add_subscriber(None)
    }

    /// Subscribe to events named `event` only
    pub fn subscribe_event(&self, event: &str) -> mpsc::Receiver<Event> {
        self.add_subscriber(Some(event.to_string()))
    }

    /// Subscribe to every event without a capacity bound.
    ///
    /// For the session's own event pump, which must not miss `stopped` or
    /// `terminated`; host listeners should use [`Self::subscribe_events`].
    pub fn subscribe_events_lossless(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_closed() {
            self.register(None, SubscriberTx::Lossless(tx));
        }
        rx
    }

    fn add_subscriber(&self, filter: Option<String>) -> mpsc::Receiver<Event> {
        let capacity = self.shared.config.event_channel_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        if self.is_closed() {
            // Sender dropped here; the receiver sees end-of-stream immediately
            return rx;
        }
        self.register(filter, SubscriberTx::Bounded(tx));
        rx
    }

    fn register(&self, filter: Option<String>, tx: SubscriberTx) {
        let mut subscribers = self
            .shared
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|existing| !existing.tx.is_closed());
        subscribers.push(Subscriber { filter, tx });
        debug!(
            "New event subscriber registered (total subscribers: {})",
            subscribers.len()
        );
    }

    /// Register the handler for one reverse-request command, replacing any previous one
    pub fn on_reverse_request(&self, command: &str, handler: Arc<dyn ReverseRequestHandler>) {
        self.shared
            .reverse_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.to_string(), handler);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Resolves once the channel is closed, for any reason
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        // Err means the sender is gone, which only happens after close
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close the channel: fail pending requests, stop reading, shut the writer
    pub async fn close(&self) {
        self.shared
            .shut_down(&Error::Transport("Channel closed by client".to_string()));
        if let Some(handle) = self.take_reader_task() {
            handle.abort();
        }
        let mut writer = self.shared.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            trace!("Writer shutdown failed: {}", e);
        }
    }

    pub fn pending_request_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_reader_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn spawn_reader_task<R>(reader: R, shared: Arc<Shared>) -> tokio::task::JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            debug!("Reader task started");
            let mut buf_reader = BufReader::new(reader);

            let reason = loop {
                match codec::read_message(&mut buf_reader).await {
                    Ok(Some(message)) => {
                        if shared.config.trace.messages {
                            debug!(target: "dapline_dap::messages", "<-- {}", message_preview(&message));
                        }
                        match message {
                            ProtocolMessage::Response(response) => {
                                shared.pending.complete(response)
                            }
                            ProtocolMessage::Event(event) => shared.dispatch_event(event),
                            ProtocolMessage::Request(request) => {
                                shared.dispatch_reverse_request(request)
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Adapter connection closed (EOF received)");
                        break Error::Transport("Adapter disconnected".to_string());
                    }
                    Err(e) => {
                        info!("Adapter connection error (triggering cleanup): {}", e);
                        break Error::Transport(e.to_string());
                    }
                }
            };

            shared.shut_down(&reason);
        })
    }
}

impl Drop for DapBroker {
    fn drop(&mut self) {
        self.shared
            .shut_down(&Error::Transport("Broker dropped".to_string()));
        if let Some(handle) = self.take_reader_task() {
            handle.abort();
        }
    }
}

#[async_trait]
impl DapClient for DapBroker {
    async fn request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response> {
        let handle = self.send(command, arguments).await?;
        let response = handle
            .with_timeout(self.shared.config.request_timeout())
            .await?;
        check_success(response)
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

fn message_preview(message: &ProtocolMessage) -> String {
    use dapline_config::constants::DEFAULT_LOG_MESSAGE_PREVIEW_LEN;

    let json = serde_json::to_string(message).unwrap_or_else(|_| message.name().to_string());
    if json.len() <= DEFAULT_LOG_MESSAGE_PREVIEW_LEN {
        return json;
    }
    let mut end = DEFAULT_LOG_MESSAGE_PREVIEW_LEN;
    while !json.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &json[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{split, DuplexStream, ReadHalf, WriteHalf};

    struct Server {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Server {
        async fn recv(&mut self) -> ProtocolMessage {
            codec::read_message(&mut self.reader).await.unwrap().unwrap()
        }

        async fn recv_request(&mut self) -> Request {
            match self.recv().await {
                ProtocolMessage::Request(r) => r,
                other => panic!("Expected request, got {:?}", other),
            }
        }

        async fn send(&mut self, message: ProtocolMessage) {
            codec::write_message(&mut self.writer, &message).await.unwrap();
        }
    }

    fn broker_pair() -> (DapBroker, Server) {
        let (client, server) = tokio::io::duplex(8192);
        let (client_read, client_write) = split(client);
        let (server_read, server_write) = split(server);
        (
            DapBroker::new(client_read, client_write),
            Server {
                reader: BufReader::new(server_read),
                writer: server_write,
            },
        )
    }

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (broker, mut server) = broker_pair();

        let first = broker.send("threads", None).await.unwrap();
        let second = broker.send("stackTrace", None).await.unwrap();
        assert_eq!(first.seq(), 1);
        assert_eq!(second.seq(), 2);

        let req1 = server.recv_request().await;
        let req2 = server.recv_request().await;
        // Answer out of order
        server
            .send(ProtocolMessage::Response(Response::success(10, req2.seq, "stackTrace")))
            .await;
        server
            .send(ProtocolMessage::Response(Response::success(11, req1.seq, "threads")))
            .await;

        assert_eq!(second.await.unwrap().command, "stackTrace");
        assert_eq!(first.await.unwrap().command, "threads");
        assert_eq!(broker.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_resolves_without_response() {
        let (broker, mut server) = broker_pair();
        let handle = broker.send("evaluate", None).await.unwrap();
        let _ = server.recv_request().await;

        let canceller = handle.canceller();
        let waiter = tokio::spawn(handle);
        assert!(canceller.cancel());

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(broker.pending_request_count(), 0);
        // Second cancel is a no-op
        assert!(!canceller.cancel());
    }

    #[tokio::test]
    async fn test_dropped_handle_deregisters() {
        let (broker, mut server) = broker_pair();
        let handle = broker.send("threads", None).await.unwrap();
        assert_eq!(broker.pending_request_count(), 1);
        drop(handle);
        assert_eq!(broker.pending_request_count(), 0);

        // A late response is ignored and the channel stays usable
        let req = server.recv_request().await;
        server
            .send(ProtocolMessage::Response(Response::success(5, req.seq, "threads")))
            .await;
        let next = broker.send("threads", None).await.unwrap();
        let req = server.recv_request().await;
        server
            .send(ProtocolMessage::Response(Response::success(6, req.seq, "threads")))
            .await;
        assert!(next.await.unwrap().success);
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_rejects_sends() {
        let (broker, mut server) = broker_pair();
        let handle = broker.send("launch", None).await.unwrap();
        let _ = server.recv_request().await;
        let mut events = broker.subscribe_events();

        drop(server);

        let err = handle.await.unwrap_err();
        assert!(err.is_transport());
        broker.closed().await;
        assert!(broker.is_closed());
        assert!(events.recv().await.is_none());

        let err = broker.send("threads", None).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let (broker, mut server) = broker_pair();
        let mut all = broker.subscribe_events();
        let mut stopped_only = broker.subscribe_event("stopped");

        server
            .send(ProtocolMessage::Event(Event::new(1, "output")))
            .await;
        server
            .send(ProtocolMessage::Event(Event::new(2, "stopped")))
            .await;

        assert_eq!(all.recv().await.unwrap().event, "output");
        assert_eq!(all.recv().await.unwrap().event, "stopped");
        assert_eq!(stopped_only.recv().await.unwrap().event, "stopped");
        assert_eq!(broker.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_lossless_subscription_survives_a_full_listener() {
        let (client, server) = tokio::io::duplex(8192);
        let (client_read, client_write) = split(client);
        let (server_read, server_write) = split(server);
        let config = SessionConfig {
            event_channel_capacity: 1,
            ..SessionConfig::default()
        };
        let broker = DapBroker::new_with_config(client_read, client_write, config);
        let mut server = Server {
            reader: BufReader::new(server_read),
            writer: server_write,
        };
        let mut slow = broker.subscribe_events();
        let mut pump = broker.subscribe_events_lossless();

        for (seq, name) in [(1, "output"), (2, "stopped"), (3, "terminated")] {
            server.send(ProtocolMessage::Event(Event::new(seq, name))).await;
        }

        assert_eq!(pump.recv().await.unwrap().event, "output");
        assert_eq!(pump.recv().await.unwrap().event, "stopped");
        assert_eq!(pump.recv().await.unwrap().event, "terminated");
        // The bounded listener kept only what fit
        assert_eq!(slow.recv().await.unwrap().event, "output");
        assert!(slow.try_recv().is_err());
    }

    struct Echo;

    #[async_trait]
    impl ReverseRequestHandler for Echo {
        async fn handle(&self, request: &Request) -> Result<Option<serde_json::Value>> {
            Ok(request.arguments.clone())
        }
    }

    #[tokio::test]
    async fn test_reverse_request_answered() {
        let (broker, mut server) = broker_pair();
        broker.on_reverse_request("echo", Arc::new(Echo));

        server
            .send(ProtocolMessage::Request(
                Request::new(7, "echo").with_arguments(serde_json::json!({"x": 1})),
            ))
            .await;
        server
            .send(ProtocolMessage::Request(Request::new(8, "unknownThing")))
            .await;

        let mut responses = HashMap::new();
        for _ in 0..2 {
            match server.recv().await {
                ProtocolMessage::Response(r) => {
                    responses.insert(r.request_seq, r);
                }
                other => panic!("Expected response, got {:?}", other),
            }
        }
        assert!(responses[&7].success);
        assert_eq!(responses[&7].body, Some(serde_json::json!({"x": 1})));
        assert!(!responses[&8].success);
        assert!(responses[&8].message.as_deref().unwrap().contains("unknownThing"));
    }

    #[tokio::test]
    async fn test_request_maps_error_response() {
        let (broker, mut server) = broker_pair();
        let broker = Arc::new(broker);
        let client: Arc<dyn DapClient> = broker.clone();

        let call = tokio::spawn(async move { client.request("setVariable", None).await });
        let req = server.recv_request().await;
        server
            .send(ProtocolMessage::Response(Response::error(
                3,
                req.seq,
                "setVariable",
                "read-only",
            )))
            .await;

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, Error::request_failed("setVariable", "read-only"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (broker, _server) = broker_pair();
        broker.close().await;
        broker.close().await;
        assert!(broker.is_closed());
        assert!(broker.subscribe_events().recv().await.is_none());
    }

    #[test]
    fn test_message_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let message =
            ProtocolMessage::Event(Event::new(1, "output").with_body(serde_json::json!({ "output": long })));
        let preview = message_preview(&message);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= DEFAULT_PREVIEW_BOUND);
    }

    const DEFAULT_PREVIEW_BOUND: usize =
        dapline_config::constants::DEFAULT_LOG_MESSAGE_PREVIEW_LEN + 3;
}
