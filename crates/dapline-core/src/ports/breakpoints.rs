//! Breakpoint Store Port
//!
//! The host owns the user's breakpoints. A session reads them through
//! [`BreakpointStore`] and follows edits through [`BreakpointListener`].

use crate::entities::Breakpoint;
use std::sync::Arc;

/// Thread-safe reference to a breakpoint store
pub type BreakpointStoreRef = Arc<dyn BreakpointStore>;

/// Handle returned by [`BreakpointStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Host breakpoint storage
pub trait BreakpointStore: Send + Sync {
    /// Snapshot of every breakpoint the host knows about
    fn breakpoints(&self) -> Vec<Breakpoint>;

    /// Global "breakpoints enabled" toggle
    fn is_enabled(&self) -> bool;

    /// Register for change notifications
    fn subscribe(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId;

    /// Stop notifications; unknown ids are ignored
    fn unsubscribe(&self, id: ListenerId);
}

/// Receives breakpoint edits from the host.
///
/// Callbacks run on the host's thread and must not block.
pub trait BreakpointListener: Send + Sync {
    fn breakpoint_added(&self, breakpoint: &Breakpoint);

    fn breakpoint_removed(&self, breakpoint: &Breakpoint);

    /// Attributes changed, usually the enabled flag
    fn breakpoint_changed(&self, breakpoint: &Breakpoint);

    /// The global toggle flipped
    fn manager_enablement_changed(&self, enabled: bool);
}
