//! Debug session configuration
//!
//! Timeouts, polling and cache sizing used by one DAP session, plus the
//! connection retry policy for adapters reached over TCP.

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_JITTER_RATIO, DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS, DEFAULT_MAX_RETRY_INTERVAL_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_RUN_IN_TERMINAL_DELAY_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_STACK_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Session Config
// ============================================================================

/// Configuration for a single debug session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Total time allowed for connecting to a TCP adapter
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Initial delay between TCP connection attempts
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Ceiling for the exponential backoff between connection attempts
    #[serde(default = "default_max_retry_interval_ms")]
    pub max_retry_interval_ms: u64,
    /// Maximum "connection refused" attempts before fast-fail
    /// When nothing is listening on the port, fail quickly instead of waiting for full timeout
    #[serde(default = "default_max_connection_refused_attempts")]
    pub max_connection_refused_attempts: u32,
    /// Backoff growth factor
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter ratio applied to each backoff delay (0.0 - 1.0)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    /// Timeout for request helpers that do not take an explicit deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Grace period for terminate/disconnect
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Polling interval of the bounded wait helper
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of session event subscriber channels
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Frames requested per `stackTrace` round trip
    #[serde(default = "default_stack_page_size")]
    pub stack_page_size: i64,
    /// Delay after spawning a runInTerminal process
    #[serde(default = "default_run_in_terminal_delay_ms")]
    pub run_in_terminal_delay_ms: u64,
    /// Protocol tracing
    #[serde(default)]
    pub trace: TraceConfig,
}

fn default_connection_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_max_retry_interval_ms() -> u64 {
    DEFAULT_MAX_RETRY_INTERVAL_MS
}

fn default_max_connection_refused_attempts() -> u32 {
    DEFAULT_MAX_CONNECTION_REFUSED_ATTEMPTS
}

fn default_backoff_multiplier() -> f64 {
    DEFAULT_BACKOFF_MULTIPLIER
}

fn default_jitter_ratio() -> f64 {
    DEFAULT_JITTER_RATIO
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_stack_page_size() -> i64 {
    DEFAULT_STACK_PAGE_SIZE
}

fn default_run_in_terminal_delay_ms() -> u64 {
    DEFAULT_RUN_IN_TERMINAL_DELAY_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connection_timeout_ms: default_connection_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retry_interval_ms: default_max_retry_interval_ms(),
            max_connection_refused_attempts: default_max_connection_refused_attempts(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            stack_page_size: default_stack_page_size(),
            run_in_terminal_delay_ms: default_run_in_terminal_delay_ms(),
            trace: TraceConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_in_terminal_delay(&self) -> Duration {
        Duration::from_millis(self.run_in_terminal_delay_ms)
    }

    /// Validate internal constraints, returning one message per violation
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.poll_interval_ms == 0 {
            errors.push("session.poll_interval_ms must be greater than 0".to_string());
        }
        if self.stack_page_size <= 0 {
            errors.push("session.stack_page_size must be greater than 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            errors.push("session.event_channel_capacity must be greater than 0".to_string());
        }
        if self.retry_interval_ms > self.max_retry_interval_ms {
            errors.push(format!(
                "session.retry_interval_ms ({}) must not exceed session.max_retry_interval_ms ({})",
                self.retry_interval_ms, self.max_retry_interval_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            errors.push("session.jitter_ratio must be between 0.0 and 1.0".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            errors.push("session.backoff_multiplier must be at least 1.0".to_string());
        }

        errors
    }
}

// ============================================================================
// Trace Config
// ============================================================================

/// Diagnostic mirroring of adapter traffic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Tee raw transport bytes (both directions) into the trace sink
    #[serde(default)]
    pub io: bool,
    /// Log every decoded protocol message at trace level
    #[serde(default)]
    pub messages: bool,
}
