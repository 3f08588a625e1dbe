//! DAP protocol constants
//!
//! Command, event and category names used on the wire.

/// Events received from debug adapters
pub mod events {
    pub const INITIALIZED: &str = "initialized";
    pub const STOPPED: &str = "stopped";
    pub const CONTINUED: &str = "continued";
    pub const THREAD: &str = "thread";
    pub const OUTPUT: &str = "output";
    pub const BREAKPOINT: &str = "breakpoint";
    pub const PROCESS: &str = "process";
    pub const EXITED: &str = "exited";
    pub const TERMINATED: &str = "terminated";
}

/// Request command names
pub mod requests {
    pub const INITIALIZE: &str = "initialize";
    pub const LAUNCH: &str = "launch";
    pub const ATTACH: &str = "attach";
    pub const CONFIGURATION_DONE: &str = "configurationDone";
    pub const SET_BREAKPOINTS: &str = "setBreakpoints";
    pub const THREADS: &str = "threads";
    pub const STACK_TRACE: &str = "stackTrace";
    pub const SCOPES: &str = "scopes";
    pub const VARIABLES: &str = "variables";
    pub const SET_VARIABLE: &str = "setVariable";
    pub const EVALUATE: &str = "evaluate";
    pub const PAUSE: &str = "pause";
    pub const CONTINUE: &str = "continue";
    pub const NEXT: &str = "next";
    pub const STEP_IN: &str = "stepIn";
    pub const STEP_OUT: &str = "stepOut";
    pub const TERMINATE: &str = "terminate";
    pub const DISCONNECT: &str = "disconnect";
}

/// Reverse requests sent by the adapter
pub mod reverse_requests {
    pub const RUN_IN_TERMINAL: &str = "runInTerminal";
}

/// `stopped` event reasons
pub mod stop_reasons {
    pub const BREAKPOINT: &str = "breakpoint";
    pub const STEP: &str = "step";
    pub const PAUSE: &str = "pause";
    pub const EXCEPTION: &str = "exception";
    pub const ENTRY: &str = "entry";
}

/// `thread` event reasons
pub mod thread_reasons {
    pub const STARTED: &str = "started";
    pub const EXITED: &str = "exited";
}

/// `evaluate` contexts
pub mod eval_contexts {
    pub const HOVER: &str = "hover";
}

/// Values sent in the initialize request
pub mod client {
    pub const CLIENT_ID: &str = "dapline";
    pub const CLIENT_NAME: &str = "dapline";
    pub const PATH_FORMAT: &str = "path";
}

/// Line sent for a breakpoint whose line the host could not resolve
pub const UNKNOWN_LINE: i64 = -1;

/// Display name of a thread whose name has not been fetched yet
pub const PENDING_THREAD_NAME: &str = "<pending>";
