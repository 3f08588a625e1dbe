//! Mock adapters for testing

mod adapter;
mod client;

pub use adapter::{Action, MockAdapter};
pub use client::RecordingClient;
