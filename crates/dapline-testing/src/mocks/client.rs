//! Recording [`DapClient`] for component tests
//!
//! Caches and the breakpoint reconciler only need a `DapClient`, so they can
//! be tested without framing or a session. Replies are queued per command;
//! once a queue is empty the command's standing reply (if any) is used, and
//! otherwise an empty success.

use async_trait::async_trait;
use dapline_dap::{DapClient, Error, Response, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Body(Option<Value>),
    Fail(String),
    Delayed(Duration, Option<Value>),
    Hang,
}

#[derive(Default)]
struct State {
    queued: HashMap<String, VecDeque<Reply>>,
    standing: HashMap<String, Reply>,
    write_delays: HashMap<String, VecDeque<Duration>>,
    requests: Vec<(String, Option<Value>)>,
}

#[derive(Default)]
pub struct RecordingClient {
    state: Mutex<State>,
    closed: AtomicBool,
    next_seq: AtomicI64,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queue(&self, command: &str, reply: Reply) -> &Self {
        self.state()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Answer the next `command` with `body`
    pub fn respond(&self, command: &str, body: Value) -> &Self {
        self.queue(command, Reply::Body(Some(body)))
    }

    /// Answer every `command` with `body` once the queue is drained
    pub fn respond_always(&self, command: &str, body: Value) -> &Self {
        self.state()
            .standing
            .insert(command.to_string(), Reply::Body(Some(body)));
        self
    }

    /// Refuse the next `command`
    pub fn fail(&self, command: &str, message: &str) -> &Self {
        self.queue(command, Reply::Fail(message.to_string()))
    }

    /// Answer the next `command` after `delay`
    pub fn respond_after(&self, command: &str, delay: Duration, body: Value) -> &Self {
        self.queue(command, Reply::Delayed(delay, Some(body)))
    }

    /// Hold the next `command` for `delay` before it is recorded, as if the
    /// write to the adapter were slow
    pub fn delay_write(&self, command: &str, delay: Duration) -> &Self {
        self.state()
            .write_delays
            .entry(command.to_string())
            .or_default()
            .push_back(delay);
        self
    }

    /// Never answer the next `command`
    pub fn hang(&self, command: &str) -> &Self {
        self.queue(command, Reply::Hang)
    }

    /// Every later request fails as if the transport were gone
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Commands and arguments in call order
    pub fn requests(&self) -> Vec<(String, Option<Value>)> {
        self.state().requests.clone()
    }

    pub fn requests_for(&self, command: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|(c, _)| c == command)
            .map(|(_, args)| args.unwrap_or(Value::Null))
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.requests_for(command).len()
    }

    fn next_reply(&self, command: &str, arguments: Option<Value>) -> Reply {
        let mut state = self.state();
        state.requests.push((command.to_string(), arguments));
        if let Some(reply) = state.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return reply;
        }
        state
            .standing
            .get(command)
            .cloned()
            .unwrap_or(Reply::Body(None))
    }
}

#[async_trait]
impl DapClient for RecordingClient {
    async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        if self.is_closed() {
            return Err(Error::Transport("Recording client closed".to_string()));
        }
        let write_delay = self
            .state()
            .write_delays
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        if let Some(delay) = write_delay {
            tokio::time::sleep(delay).await;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let body = match self.next_reply(command, arguments) {
            Reply::Body(body) => body,
            Reply::Fail(message) => return Err(Error::request_failed(command, message)),
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                body
            }
            Reply::Hang => std::future::pending().await,
        };
        let mut response = Response::success(seq, seq, command);
        response.body = body;
        Ok(response)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
