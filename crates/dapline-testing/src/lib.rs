//! Test utilities for dapline
//!
//! # Mocks
//!
//! - [`MockAdapter`] - in-process adapter speaking real DAP framing, driven by
//!   per-command [`Action`] scripts
//! - [`RecordingClient`] - a [`DapClient`](dapline_dap::DapClient) with
//!   queued replies, for testing caches and the reconciler without a wire
//!
//! # Fixtures
//!
//! - [`fixtures`] - launch parameters and canned response bodies
//!
//! # Usage
//!
//! ```no_run
//! use dapline_dap::{DebugSession, SessionOptions};
//! use dapline_testing::{fixtures, MockAdapter};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = MockAdapter::new();
//! let options = SessionOptions::new(fixtures::launch_parameters("app.py"));
//! let session = DebugSession::start(adapter.transport(), options).await?;
//! assert_eq!(adapter.commands()[0], "initialize");
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
mod mocks;

pub use mocks::{Action, MockAdapter, RecordingClient};
