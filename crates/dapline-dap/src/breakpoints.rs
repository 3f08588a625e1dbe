//! Breakpoint Reconciler - keeps the adapter's breakpoints in step with the host
//!
//! The reconciler tracks, per source file, the line breakpoints it believes
//! the adapter has. `setBreakpoints` replaces a file's whole list, so every
//! change re-sends the complete list for every tracked file. A file whose
//! list became empty is sent once more (to clear it in the adapter) and then
//! forgotten.

use crate::client::{call, DapClientRef};
use crate::constants::{requests, UNKNOWN_LINE};
use crate::events::EventBus;
use crate::{Error, SetBreakpointsArguments, SetBreakpointsResponseBody, Source, SourceBreakpoint};
use dapline_core::{
    Breakpoint, BreakpointListener, BreakpointStoreRef, ConfirmedBreakpoint, ListenerId,
    SessionEvent, SourceKey,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct SendReport {
    /// Sources a `setBreakpoints` request was issued for
    pub sources: Vec<SourceKey>,
    /// Sources whose request failed, with the cause
    pub failures: Vec<(SourceKey, Error)>,
}

impl SendReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct ReconcilerState {
    pending: BTreeMap<SourceKey, Vec<SourceBreakpoint>>,
    confirmed: BTreeMap<SourceKey, Vec<ConfirmedBreakpoint>>,
}

pub struct BreakpointReconciler {
    store: BreakpointStoreRef,
    client: DapClientRef,
    events: Arc<EventBus>,
    runtime: Handle,
    state: Mutex<ReconcilerState>,
    /// Serializes passes: a pass snapshots the pending set and holds this
    /// until its requests complete, so an older list never lands last
    send_lock: tokio::sync::Mutex<()>,
    listener: Mutex<Option<ListenerId>>,
    weak_self: Weak<BreakpointReconciler>,
}

impl BreakpointReconciler {
    pub fn new(
        store: BreakpointStoreRef,
        client: DapClientRef,
        events: Arc<EventBus>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            store,
            client,
            events,
            runtime,
            state: Mutex::new(ReconcilerState::default()),
            send_lock: tokio::sync::Mutex::new(()),
            listener: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, ReconcilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow host breakpoint edits and send every breakpoint once
    pub async fn install(&self) -> SendReport {
        {
            let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if listener.is_none() {
                let bridge = Arc::new(ListenerBridge {
                    reconciler: self.weak_self.clone(),
                });
                *listener = Some(self.store.subscribe(bridge));
            }
        }
        let report = self.resend_all(self.store.is_enabled()).await;
        info!(
            sources = report.sources.len(),
            failures = report.failures.len(),
            "Initial breakpoint sync complete"
        );
        report
    }

    /// Stop following host edits. Breakpoints already sent stay in the adapter.
    pub fn uninstall(&self) {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            self.store.unsubscribe(id);
            debug!("Breakpoint listener removed");
        }
    }

    pub fn is_installed(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Only line breakpoints on a file are forwarded
    pub fn supports(breakpoint: &Breakpoint) -> bool {
        breakpoint.is_supported()
    }

    /// Tracked lines per source
    pub fn pending(&self) -> BTreeMap<SourceKey, Vec<i64>> {
        self.state()
            .pending
            .iter()
            .map(|(source, bps)| (source.clone(), bps.iter().map(|bp| bp.line).collect()))
            .collect()
    }

    /// Adapter's answer to the last `setBreakpoints` for `source`
    pub fn confirmed(&self, source: &SourceKey) -> Option<Vec<ConfirmedBreakpoint>> {
        self.state().confirmed.get(source).cloned()
    }

    pub fn breakpoint_added(&self, breakpoint: &Breakpoint) {
        if !Self::supports(breakpoint) {
            return;
        }
        let relevant = (breakpoint.enabled && self.store.is_enabled()) || !breakpoint.registered;
        if relevant {
            self.add_to_pending(breakpoint);
            self.spawn_send();
        }
    }

    pub fn breakpoint_removed(&self, breakpoint: &Breakpoint) {
        if !Self::supports(breakpoint) {
            return;
        }
        self.remove_from_pending(breakpoint);
        self.spawn_send();
    }

    pub fn breakpoint_changed(&self, breakpoint: &Breakpoint) {
        if !Self::supports(breakpoint) {
            return;
        }
        if breakpoint.enabled && self.store.is_enabled() {
            self.breakpoint_added(breakpoint);
        } else {
            self.breakpoint_removed(breakpoint);
        }
    }

    pub fn manager_enablement_changed(&self, enabled: bool) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        self.runtime.spawn(async move {
            this.resend_all(enabled).await;
        });
    }

    /// Re-derive the pending set from the host's full list and send it.
    ///
    /// `enabled == false` removes every supported breakpoint.
    pub async fn resend_all(&self, enabled: bool) -> SendReport {
        for breakpoint in self.store.breakpoints() {
            if !Self::supports(&breakpoint) {
                continue;
            }
            if enabled && (breakpoint.enabled || !breakpoint.registered) {
                self.add_to_pending(&breakpoint);
            } else {
                self.remove_from_pending(&breakpoint);
            }
        }
        self.send().await
    }

    /// Send the full list of every tracked source concurrently.
    ///
    /// Resolves once every request has completed. Failures are reported,
    /// not retried. Passes run one at a time, in the order they were started.
    pub async fn send(&self) -> SendReport {
        let _pass = self.send_lock.lock().await;
        let batches: Vec<(SourceKey, Vec<SourceBreakpoint>)> = {
            let mut state = self.state();
            let batches = state
                .pending
                .iter()
                .map(|(source, bps)| (source.clone(), bps.clone()))
                .collect();
            // Told once that a file is empty, the adapter needs no further updates for it
            let emptied: Vec<SourceKey> = state
                .pending
                .iter()
                .filter(|(_, bps)| bps.is_empty())
                .map(|(source, _)| source.clone())
                .collect();
            for source in emptied {
                state.pending.remove(&source);
            }
            batches
        };

        let requests = batches
            .into_iter()
            .map(|(source, breakpoints)| self.send_source(source, breakpoints));
        let results = join_all(requests).await;

        let mut report = SendReport::default();
        for (source, result) in results {
            if let Err(e) = result {
                warn!(source = %source, "setBreakpoints failed: {}", e);
                report.failures.push((source.clone(), e));
            }
            report.sources.push(source);
        }
        report
    }

    async fn send_source(
        &self,
        source: SourceKey,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> (SourceKey, crate::Result<()>) {
        let arguments = SetBreakpointsArguments {
            source: Source::new(source.name.clone(), source.path.clone()),
            lines: Some(breakpoints.iter().map(|bp| bp.line).collect()),
            breakpoints: Some(breakpoints),
            source_modified: Some(false),
        };
        debug!(source = %source, lines = ?arguments.lines, "Sending breakpoints");

        let result: crate::Result<SetBreakpointsResponseBody> =
            call(self.client.as_ref(), requests::SET_BREAKPOINTS, &arguments).await;
        match result {
            Ok(body) => {
                let confirmed: Vec<ConfirmedBreakpoint> =
                    body.breakpoints.iter().map(ConfirmedBreakpoint::from).collect();
                {
                    let mut state = self.state();
                    if state.pending.contains_key(&source) {
                        state.confirmed.insert(source.clone(), confirmed.clone());
                    } else {
                        state.confirmed.remove(&source);
                    }
                }
                self.events.emit(SessionEvent::BreakpointsConfirmed {
                    source: source.clone(),
                    breakpoints: confirmed,
                });
                (source, Ok(()))
            }
            Err(e) => (source, Err(e)),
        }
    }

    fn spawn_send(&self) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        self.runtime.spawn(async move {
            this.send().await;
        });
    }

    fn add_to_pending(&self, breakpoint: &Breakpoint) {
        let Some((source, line)) = source_line(breakpoint) else {
            return;
        };
        let mut state = self.state();
        let lines = state.pending.entry(source).or_default();
        // Re-enabling an already tracked breakpoint must not duplicate it
        if !lines.iter().any(|bp| bp.line == line) {
            lines.push(SourceBreakpoint::at_line(line));
        }
    }

    fn remove_from_pending(&self, breakpoint: &Breakpoint) {
        let Some((source, line)) = source_line(breakpoint) else {
            return;
        };
        if let Some(lines) = self.state().pending.get_mut(&source) {
            lines.retain(|bp| bp.line != line);
        }
    }
}

/// Source identity and adapter line of a supported breakpoint
fn source_line(breakpoint: &Breakpoint) -> Option<(SourceKey, i64)> {
    let (path, line) = breakpoint.line_location()?;
    let line = line.map_or(UNKNOWN_LINE, i64::from);
    Some((SourceKey::from_path(path), line))
}

/// Registered with the host store; holds the reconciler weakly so the
/// store never keeps a finished session alive
struct ListenerBridge {
    reconciler: Weak<BreakpointReconciler>,
}

impl BreakpointListener for ListenerBridge {
    fn breakpoint_added(&self, breakpoint: &Breakpoint) {
        if let Some(r) = self.reconciler.upgrade() {
            r.breakpoint_added(breakpoint);
        }
    }

    fn breakpoint_removed(&self, breakpoint: &Breakpoint) {
        if let Some(r) = self.reconciler.upgrade() {
            r.breakpoint_removed(breakpoint);
        }
    }

    fn breakpoint_changed(&self, breakpoint: &Breakpoint) {
        if let Some(r) = self.reconciler.upgrade() {
            r.breakpoint_changed(breakpoint);
        }
    }

    fn manager_enablement_changed(&self, enabled: bool) {
        if let Some(r) = self.reconciler.upgrade() {
            r.manager_enablement_changed(enabled);
        }
    }
}
