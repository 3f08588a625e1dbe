//! Extension traits for best-effort operations.

/// Log-and-discard for results whose failure must not propagate.
///
/// Used during teardown and for optional refreshes, where a failure is
/// worth a debug line and nothing more.
///
/// ```text
/// broker.close().await.debug_ok("Failed to close adapter stdin");
/// ```
pub trait DebugResult<T> {
    /// Convert to Option, logging the error at debug level if Err.
    fn debug_ok(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> DebugResult<T> for Result<T, E> {
    fn debug_ok(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{}: {}", context, e);
                None
            }
        }
    }
}
