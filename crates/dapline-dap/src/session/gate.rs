//! One-shot gate completed by the adapter's `initialized` event

use crate::{Error, Result};
use tokio::sync::watch;

#[derive(Debug)]
pub struct InitializedGate {
    tx: watch::Sender<Option<Result<()>>>,
}

impl Default for InitializedGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitializedGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Open the gate; false if it was already resolved
    pub fn complete(&self) -> bool {
        self.resolve(Ok(()))
    }

    /// Fail every current and future waiter; false if already resolved
    pub fn fail(&self, error: Error) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Result<()>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let resolved = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Interrupted("Initialized gate dropped".to_string()))?;
        match &*resolved {
            Some(outcome) => outcome.clone(),
            None => Err(Error::Interrupted("Initialized gate dropped".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completes_exactly_once() {
        let gate = Arc::new(InitializedGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        assert!(gate.complete());
        assert!(!gate.complete());
        assert!(!gate.fail(Error::Cancelled));
        assert!(waiter.await.unwrap().is_ok());
        // Late waiters see the same outcome
        assert!(gate.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_reaches_waiters() {
        let gate = InitializedGate::new();
        gate.fail(Error::request_failed("launch", "no such program"));
        assert_eq!(
            gate.wait().await.unwrap_err(),
            Error::request_failed("launch", "no such program")
        );
    }
}
