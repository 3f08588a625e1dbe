mod breakpoint;
mod event;
mod launch;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointKind, LineBreakpoint, Location, SourceKey};
pub use event::{
    ConfirmedBreakpoint, OutputEvent, OutputStream, ResumeDetail, SessionEvent, SessionState,
    SuspendDetail,
};
pub use launch::{LaunchParameters, RequestKind, SessionMode};
