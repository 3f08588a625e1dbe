//! Error types for DAP session operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The channel to the adapter is closed; nothing more can be sent.
    ///
    /// Every pending request fails with this once the read loop exits or a
    /// write fails, and the session treats it as termination.
    #[error("Transport closed: {0}")]
    Transport(String),

    /// A single request was refused by the adapter or could not be served
    #[error("Request '{command}' failed: {message}")]
    RequestFailed { command: String, message: String },

    /// The caller gave up waiting
    #[error("Request cancelled")]
    Cancelled,

    /// The waiting context itself was torn down before a result arrived
    #[error("Wait interrupted: {0}")]
    Interrupted(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// DAP framing and message-shape violations
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON parsing and deserialization failures
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Process spawn, socket and stream I/O failures outside the read loop
    #[error("Adapter communication error: {0}")]
    Communication(String),
}

impl Error {
    pub fn request_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RequestFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Cancellations are expected and need not be logged as failures
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidMessage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Communication(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Protocol(format!("Invalid UTF-8: {}", err))
    }
}

impl From<dapline_core::Error> for Error {
    fn from(err: dapline_core::Error) -> Self {
        Error::InitializationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::request_failed("stackTrace", "thread is running");
        assert_eq!(
            err.to_string(),
            "Request 'stackTrace' failed: thread is running"
        );
        assert_eq!(Error::Timeout(250).to_string(), "Request timed out after 250ms");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Interrupted("runtime shut down".into()).is_cancelled());
        assert!(Error::Transport("eof".into()).is_transport());
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }
}
