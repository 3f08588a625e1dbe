//! Fan-out of [`SessionEvent`]s to host subscribers
//!
//! Subscriptions are scoped to one session: [`EventBus::close`] drops every
//! sender, so subscribers see end-of-stream when the session terminates.

use dapline_core::SessionEvent;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{trace, warn};

pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Option<Vec<mpsc::Sender<SessionEvent>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    /// A closed bus returns a receiver that is already at end-of-stream
    pub fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Some(subscribers) = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            subscribers.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: SessionEvent) {
        let mut guard = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = guard.as_mut() else {
            trace!(?event, "Event after session close dropped");
            return;
        };
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(?event, "Session event dropped - subscriber channel full");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Close every subscription; later emits are dropped
    pub fn close(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }
}
