//! Session lifecycle states and the events a session reports to its host

use crate::entities::breakpoint::SourceKey;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Session State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Initializing,
    Launching,
    Attaching,
    ConfigurationPending,
    Running,
    Terminating,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Launching => "launching",
            Self::Attaching => "attaching",
            Self::ConfigurationPending => "configuration_pending",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Resume / Suspend details
// ============================================================================

/// Why execution resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeDetail {
    StepOver,
    StepInto,
    StepReturn,
    ClientRequest,
    Unspecified,
}

/// Why execution suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendDetail {
    /// Breakpoint hit
    Breakpoint,
    /// Step completed
    StepEnd,
    /// User requested
    ClientRequest,
    Unspecified,
}

impl SuspendDetail {
    /// Map a `stopped` event reason to a detail category
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "breakpoint" | "entry" | "exception" => Self::Breakpoint,
            "step" => Self::StepEnd,
            "pause" => Self::ClientRequest,
            _ => Self::Unspecified,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Rendered output stream of the debuggee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One `output` event from the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub category: Option<String>,
    pub output: String,
}

impl OutputEvent {
    /// Stream this output renders to; `None` for categories that are not
    /// rendered (e.g. `telemetry`)
    pub fn stream(&self) -> Option<OutputStream> {
        match self.category.as_deref() {
            None | Some("console") | Some("stdout") => Some(OutputStream::Stdout),
            Some("stderr") => Some(OutputStream::Stderr),
            Some(_) => None,
        }
    }
}

// ============================================================================
// Breakpoint confirmations
// ============================================================================

/// Adapter's view of one installed breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedBreakpoint {
    pub id: Option<i64>,
    pub verified: bool,
    /// Actual line, which may differ from the requested one
    pub line: Option<i64>,
    pub message: Option<String>,
}

// ============================================================================
// Session Event
// ============================================================================

/// Notifications a session sends to its subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        state: SessionState,
    },
    /// `thread_id` is `None` when every thread resumed
    Resumed {
        thread_id: Option<i64>,
        detail: ResumeDetail,
    },
    /// `thread_id` is `None` when every thread suspended
    Suspended {
        thread_id: Option<i64>,
        detail: SuspendDetail,
        description: Option<String>,
    },
    ThreadsChanged,
    Output(OutputEvent),
    Exited {
        exit_code: i64,
    },
    /// Adapter-initiated breakpoint change (`breakpoint` event)
    BreakpointChanged {
        reason: String,
        breakpoint: ConfirmedBreakpoint,
    },
    /// Adapter's answer to a `setBreakpoints` request
    BreakpointsConfirmed {
        source: SourceKey,
        breakpoints: Vec<ConfirmedBreakpoint>,
    },
    ProcessStarted {
        name: String,
        process_id: Option<i64>,
    },
    Terminated,
}
