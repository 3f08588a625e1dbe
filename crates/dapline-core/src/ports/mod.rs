//! Interfaces to host collaborators outside the session engine

mod breakpoints;
mod output;

pub use breakpoints::{BreakpointListener, BreakpointStore, BreakpointStoreRef, ListenerId};
pub use output::{BufferedOutputSink, NullOutputSink, OutputSink, OutputSinkRef};
