//! Dapline DAP - client-side Debug Adapter Protocol session engine
//!
//! Drives one debug adapter (debugpy, delve, CodeLLDB, ...) from the client
//! side: framing and correlation on the wire, the startup handshake,
//! breakpoint reconciliation and the suspended-state inspection caches.
//!
//! # Architecture
//!
//! - `transport` - byte streams to the adapter (child process or TCP)
//! - `broker` - request/response correlation, event fan-out, reverse requests
//! - `session` - lifecycle, execution control, termination policy
//! - `breakpoints` - host breakpoint store → `setBreakpoints`
//! - `threads` / `variables` - lazily fetched, identity-preserving caches
//! - `wait` - cancellable blocking for synchronous hosts

pub mod breakpoints;
pub mod broker;
pub mod client;
pub mod codec;
pub mod constants;
pub mod error;
pub mod events;
pub mod ext;
pub mod protocol;
pub mod session;
pub mod terminal;
pub mod threads;
pub mod transport;
pub mod variables;
pub mod wait;

pub use breakpoints::{BreakpointReconciler, SendReport};
pub use broker::{DapBroker, RequestCanceller, ResultHandle, ReverseRequestHandler};
pub use client::{DapClient, DapClientRef};
pub use error::{Error, Result};
pub use events::EventBus;
pub use ext::DebugResult;
pub use protocol::*;
pub use session::{DebugSession, SessionOptions};
pub use terminal::RunInTerminalHandler;
pub use threads::{StackFrameRef, StackFrameSlot, ThreadCache, ThreadInfo};
pub use transport::{AdapterCommand, Transport};
pub use variables::{VariableResolver, VariableValue};
pub use wait::{block_on_cancellable, wait_cancellable};
