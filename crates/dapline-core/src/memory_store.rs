//! In-memory breakpoint store
//!
//! Used by the CLI and by tests in place of an editor's breakpoint manager.

use crate::entities::{Breakpoint, BreakpointId};
use crate::ports::{BreakpointListener, BreakpointStore, ListenerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

type Listeners = HashMap<ListenerId, Arc<dyn BreakpointListener>>;

#[derive(Default)]
pub struct InMemoryBreakpointStore {
    breakpoints: RwLock<Vec<Breakpoint>>,
    listeners: RwLock<Listeners>,
    disabled: AtomicBool,
    next_listener: AtomicU64,
}

impl InMemoryBreakpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with breakpoints, without notifications
    pub fn with_breakpoints(breakpoints: impl IntoIterator<Item = Breakpoint>) -> Self {
        let store = Self::new();
        store
            .write()
            .extend(breakpoints.into_iter().map(|bp| bp.with_registered(true)));
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Breakpoint>> {
        self.breakpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Breakpoint>> {
        self.breakpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> RwLockWriteGuard<'_, Listeners> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, breakpoint: Breakpoint) {
        let breakpoint = breakpoint.with_registered(true);
        {
            let mut all = self.write();
            all.retain(|bp| bp.id != breakpoint.id);
            all.push(breakpoint.clone());
        }
        debug!(id = %breakpoint.id, "Breakpoint added");
        self.notify(|l| l.breakpoint_added(&breakpoint));
    }

    /// Remove a breakpoint; returns it if it existed
    pub fn remove(&self, id: BreakpointId) -> Option<Breakpoint> {
        let removed = {
            let mut all = self.write();
            let index = all.iter().position(|bp| bp.id == id)?;
            all.remove(index)
        };
        debug!(id = %id, "Breakpoint removed");
        self.notify(|l| l.breakpoint_removed(&removed));
        Some(removed)
    }

    /// Flip one breakpoint's enabled flag; returns false for unknown ids
    pub fn set_breakpoint_enabled(&self, id: BreakpointId, enabled: bool) -> bool {
        let changed = {
            let mut all = self.write();
            all.iter_mut().find(|bp| bp.id == id).map(|bp| {
                bp.enabled = enabled;
                bp.clone()
            })
        };
        match changed {
            Some(bp) => {
                self.notify(|l| l.breakpoint_changed(&bp));
                true
            }
            None => false,
        }
    }

    /// Flip the global toggle
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = !self.disabled.swap(!enabled, Ordering::SeqCst);
        if was_enabled != enabled {
            self.notify(|l| l.manager_enablement_changed(enabled));
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Listeners are called without holding the lock so they may read the store
    fn notify(&self, f: impl Fn(&dyn BreakpointListener)) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            f(listener.as_ref());
        }
    }
}

impl BreakpointStore for InMemoryBreakpointStore {
    fn breakpoints(&self) -> Vec<Breakpoint> {
        self.read().clone()
    }

    fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::SeqCst)
    }

    fn subscribe(&self, listener: Arc<dyn BreakpointListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners().insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl BreakpointListener for Recorder {
        fn breakpoint_added(&self, bp: &Breakpoint) {
            self.calls.lock().unwrap().push(format!("add {}", bp.id));
        }
        fn breakpoint_removed(&self, bp: &Breakpoint) {
            self.calls.lock().unwrap().push(format!("remove {}", bp.id));
        }
        fn breakpoint_changed(&self, bp: &Breakpoint) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("change {} {}", bp.id, bp.enabled));
        }
        fn manager_enablement_changed(&self, enabled: bool) {
            self.calls.lock().unwrap().push(format!("manager {}", enabled));
        }
    }

    #[test]
    fn test_notifications_in_order() {
        let store = InMemoryBreakpointStore::new();
        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.add(Breakpoint::line(1, "/a.py", 5));
        assert!(store.set_breakpoint_enabled(BreakpointId(1), false));
        store.set_enabled(false);
        store.set_enabled(false);
        assert!(store.remove(BreakpointId(1)).is_some());
        assert!(store.remove(BreakpointId(1)).is_none());

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["add bp-1", "change bp-1 false", "manager false", "remove bp-1"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = InMemoryBreakpointStore::new();
        let recorder = Arc::new(Recorder::default());
        let id = store.subscribe(recorder.clone());
        assert_eq!(store.listener_count(), 1);

        store.unsubscribe(id);
        store.add(Breakpoint::line(1, "/a.py", 5));

        assert_eq!(store.listener_count(), 0);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_added_breakpoints_are_registered() {
        let store =
            InMemoryBreakpointStore::with_breakpoints([
                Breakpoint::line(1, "/a.py", 5).with_registered(false)
            ]);
        assert!(store.breakpoints()[0].registered);
        assert!(store.is_enabled());
    }

    #[test]
    fn test_poisoned_lock_still_records_edits() {
        let store = Arc::new(InMemoryBreakpointStore::new());
        let poisoner = Arc::clone(&store);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.breakpoints.write().unwrap();
            panic!("poison the breakpoint list");
        })
        .join();
        assert!(result.is_err());
        assert!(store.breakpoints.is_poisoned());

        let recorder = Arc::new(Recorder::default());
        store.subscribe(recorder.clone());
        store.add(Breakpoint::line(1, "/a.py", 5));

        assert_eq!(store.breakpoints().len(), 1);
        assert!(store.remove(BreakpointId(1)).is_some());
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["add bp-1", "remove bp-1"]
        );
    }
}
