//! Default values for every configurable setting
//!
//! Grouped by concern. Config structs reference these through their
//! `#[serde(default = "...")]` functions so the TOML defaults and the
//! `Default` impls can never drift apart.

// ============================================================================
// CONNECTION
// ============================================================================

/// Loopback address used when an adapter is addressed as `localhost`
pub const LOCALHOST_IPV4: &str = "127.0.0.1";

/// Total time allowed for establishing a TCP connection to an adapter
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;

/// Initial delay between connection attempts
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Upper bound for the exponential backoff between connection attempts
pub const DEFAULT_MAX_RETRY_INTERVAL_MS: u64 = 5_000;

/// Consecutive "connection refused" results tolerated before giving up early
pub const DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS: u32 = 3;

/// Backoff growth factor between connection attempts
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Random jitter applied to each backoff delay (fraction of the delay)
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

/// TCP keepalive idle time before the first probe
pub const DEFAULT_TCP_KEEPALIVE_TIME_SECS: u64 = 30;

/// Interval between TCP keepalive probes
pub const DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// Unanswered keepalive probes before the connection is dropped
pub const DEFAULT_TCP_KEEPALIVE_RETRIES: u32 = 3;

// ============================================================================
// TIMEOUTS (milliseconds)
// ============================================================================

/// Timeout applied by the convenience request helpers
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Grace period for terminate/disconnect before forced teardown
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Polling interval of the bounded wait helper
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Delay after spawning a runInTerminal process before replying
pub const DEFAULT_RUN_IN_TERMINAL_DELAY_MS: u64 = 1_000;

// ============================================================================
// LIMITS
// ============================================================================

/// Capacity of each session event subscriber channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1_000;

/// Frames requested per `stackTrace` round trip
pub const DEFAULT_STACK_PAGE_SIZE: i64 = 20;

/// Longest message preview written to debug logs
pub const DEFAULT_LOG_MESSAGE_PREVIEW_LEN: usize = 200;

// ============================================================================
// LOGGING
// ============================================================================

/// Default log level when neither config nor RUST_LOG says otherwise
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default configuration file name looked up by the CLI
pub const DEFAULT_CONFIG_FILENAME: &str = "dapline.toml";
