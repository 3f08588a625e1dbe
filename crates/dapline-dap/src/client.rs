//! Request seam used by the caches and the breakpoint reconciler
//!
//! Components that only need "send a request, get the response" depend on
//! [`DapClient`] rather than the concrete broker so they can be driven by a
//! recording mock in tests.

use crate::{Error, Response, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

#[async_trait]
pub trait DapClient: Send + Sync {
    /// Send a request and wait for its response.
    ///
    /// Unsuccessful responses are returned as [`Error::RequestFailed`].
    async fn request(&self, command: &str, arguments: Option<serde_json::Value>)
        -> Result<Response>;

    /// True once the channel accepts no more requests
    fn is_closed(&self) -> bool;
}

pub type DapClientRef = Arc<dyn DapClient>;

/// Turn a non-success response into `RequestFailed`
pub fn check_success(response: Response) -> Result<Response> {
    if response.success {
        Ok(response)
    } else {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "no message".to_string());
        Err(Error::request_failed(response.command, message))
    }
}

/// Serialize request arguments
pub fn to_arguments<A: Serialize>(arguments: &A) -> Result<Option<serde_json::Value>> {
    Ok(Some(serde_json::to_value(arguments)?))
}

/// Send a request and deserialize the response body
pub async fn call<A, B>(client: &dyn DapClient, command: &str, arguments: &A) -> Result<B>
where
    A: Serialize + ?Sized,
    B: DeserializeOwned,
{
    let arguments = Some(serde_json::to_value(arguments)?);
    let response = client.request(command, arguments).await?;
    response
        .parse_body()
        .map_err(|e| Error::InvalidMessage(format!("'{}' response body: {}", command, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_success_maps_failure() {
        let ok = Response::success(2, 1, "threads");
        assert!(check_success(ok).is_ok());

        let failed = Response::error(2, 1, "stackTrace", "thread is running");
        match check_success(failed).unwrap_err() {
            Error::RequestFailed { command, message } => {
                assert_eq!(command, "stackTrace");
                assert_eq!(message, "thread is running");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
