//! Thread/Frame Cache - lazily refreshed mirror of the adapter's threads
//!
//! Two levels of dirty flags decide when a read costs a round trip: one for
//! the thread list, one per thread for its frames. Events only flip flags;
//! the next read does the fetch. Locks are never held across a request.
//!
//! Frames live in [`StackFrameRef`] slots. A refresh keeps the existing slot
//! at a depth when the new frame comes from the same source, so anything
//! cached on the slot (scopes) survives stepping within a function.

use crate::client::{call, DapClientRef};
use crate::constants::{requests, PENDING_THREAD_NAME};
use crate::variables::Variable;
use crate::{
    Error, Result, Source, StackFrame, StackTraceArguments, StackTraceResponseBody,
    ThreadsResponseBody,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

// ============================================================
// STACK FRAME SLOTS
// ============================================================

pub type StackFrameRef = Arc<StackFrameSlot>;

#[derive(Debug)]
struct SlotState {
    frame: StackFrame,
    /// Scopes fetched for `frame.id`
    scopes: Option<(i64, Vec<Variable>)>,
}

/// One cached stack frame at a fixed depth (0 = innermost)
#[derive(Debug)]
pub struct StackFrameSlot {
    thread_id: i64,
    depth: usize,
    state: Mutex<SlotState>,
}

impl StackFrameSlot {
    fn new(thread_id: i64, frame: StackFrame, depth: usize) -> Self {
        Self {
            thread_id,
            depth,
            state: Mutex::new(SlotState {
                frame,
                scopes: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn thread_id(&self) -> i64 {
        self.thread_id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Adapter frame id; changes when the slot is refreshed
    pub fn id(&self) -> i64 {
        self.state().frame.id
    }

    pub fn frame(&self) -> StackFrame {
        self.state().frame.clone()
    }

    pub fn name(&self) -> String {
        self.state().frame.name.clone()
    }

    pub fn source(&self) -> Option<Source> {
        self.state().frame.source.clone()
    }

    pub fn line(&self) -> i64 {
        self.state().frame.line
    }

    pub fn instruction_pointer(&self) -> Option<String> {
        self.state().frame.instruction_pointer_reference.clone()
    }

    /// Scopes cached for the current frame id
    pub fn cached_scopes(&self) -> Option<Vec<Variable>> {
        let state = self.state();
        match &state.scopes {
            Some((frame_id, scopes)) if *frame_id == state.frame.id => Some(scopes.clone()),
            _ => None,
        }
    }

    pub(crate) fn store_scopes(&self, frame_id: i64, scopes: Vec<Variable>) {
        let mut state = self.state();
        if state.frame.id == frame_id {
            state.scopes = Some((frame_id, scopes));
        }
    }

    /// Reuse this slot for `frame` when depth and source match, otherwise
    /// allocate a new one
    fn replace(self: &Arc<Self>, frame: StackFrame, depth: usize) -> StackFrameRef {
        {
            let mut state = self.state();
            if self.depth == depth && state.frame.source == frame.source {
                if state.frame.id != frame.id {
                    state.scopes = None;
                }
                state.frame = frame;
                return Arc::clone(self);
            }
        }
        Arc::new(StackFrameSlot::new(self.thread_id, frame, depth))
    }
}

/// Merge a fresh page of frames into `existing` by depth
fn merge_frames(thread_id: i64, existing: &mut Vec<StackFrameRef>, fresh: Vec<StackFrame>) {
    let fresh_len = fresh.len();
    for (depth, frame) in fresh.into_iter().enumerate() {
        if let Some(slot) = existing.get(depth) {
            let replaced = slot.replace(frame, depth);
            existing[depth] = replaced;
        } else {
            existing.push(Arc::new(StackFrameSlot::new(thread_id, frame, depth)));
        }
    }
    existing.truncate(fresh_len);
}

// ============================================================
// THREADS
// ============================================================

/// Snapshot of one cached thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: i64,
    /// `None` until the thread list has been fetched
    pub name: Option<String>,
    pub suspended: bool,
    pub stepping: bool,
    /// Last failed resume/step/pause
    pub error_message: Option<String>,
}

impl ThreadInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(PENDING_THREAD_NAME)
    }
}

#[derive(Debug)]
struct ThreadEntry {
    id: i64,
    name: Option<String>,
    suspended: bool,
    stepping: bool,
    error_message: Option<String>,
    frames: Vec<StackFrameRef>,
    frames_dirty: bool,
    /// Refresh count when the entry was created
    created_in: u64,
}

impl ThreadEntry {
    fn new(id: i64, name: Option<String>) -> Self {
        Self {
            id,
            name,
            suspended: false,
            stepping: false,
            error_message: None,
            frames: Vec::new(),
            frames_dirty: true,
            created_in: 0,
        }
    }

    fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            name: self.name.clone(),
            suspended: self.suspended,
            stepping: self.stepping,
            error_message: self.error_message.clone(),
        }
    }
}

#[derive(Debug)]
struct CacheState {
    threads_dirty: bool,
    /// Adapter order
    threads: Vec<ThreadEntry>,
    /// Incremented whenever a `threads` refresh starts
    refreshes: u64,
}

impl CacheState {
    fn find(&self, id: i64) -> Option<&ThreadEntry> {
        self.threads.iter().find(|t| t.id == id)
    }

    fn find_mut(&mut self, id: i64) -> Option<&mut ThreadEntry> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    fn get_or_insert(&mut self, id: i64) -> &mut ThreadEntry {
        let index = match self.threads.iter().position(|t| t.id == id) {
            Some(index) => index,
            None => {
                debug!(thread_id = id, "Creating thread entry for unseen thread");
                let mut entry = ThreadEntry::new(id, None);
                entry.created_in = self.refreshes;
                self.threads.push(entry);
                self.threads.len() - 1
            }
        };
        &mut self.threads[index]
    }

    fn snapshot(&self) -> Vec<ThreadInfo> {
        self.threads.iter().map(ThreadEntry::info).collect()
    }
}

pub struct ThreadCache {
    client: DapClientRef,
    page_size: i64,
    state: Mutex<CacheState>,
}

impl ThreadCache {
    pub fn new(client: DapClientRef, page_size: i64) -> Self {
        Self {
            client,
            page_size,
            state: Mutex::new(CacheState {
                threads_dirty: true,
                threads: Vec::new(),
                refreshes: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current threads, refreshed first if the list is dirty.
    ///
    /// Never fails: a failed refresh leaves the list dirty and returns the
    /// last known threads.
    pub async fn get_threads(&self) -> Vec<ThreadInfo> {
        let refresh = {
            let mut state = self.state();
            if !state.threads_dirty {
                return state.snapshot();
            }
            state.threads_dirty = false;
            state.refreshes += 1;
            state.refreshes
        };

        let result: Result<ThreadsResponseBody> =
            call(self.client.as_ref(), requests::THREADS, &serde_json::json!({})).await;

        let mut state = self.state();
        match result {
            Ok(body) => {
                let mut previous = std::mem::take(&mut state.threads);
                state.threads = body
                    .threads
                    .into_iter()
                    .map(|thread| {
                        let mut entry = match previous.iter().position(|t| t.id == thread.id) {
                            Some(index) => previous.swap_remove(index),
                            None => ThreadEntry::new(thread.id, None),
                        };
                        entry.name = Some(thread.name);
                        entry.frames_dirty = true;
                        entry
                    })
                    .collect();
                // Created by an event while the request was in flight; the
                // response predates them, so keep them and refresh again
                let (created_since, gone): (Vec<_>, Vec<_>) = previous
                    .into_iter()
                    .partition(|t| t.created_in == refresh);
                if !created_since.is_empty() {
                    state.threads.extend(created_since);
                    state.threads_dirty = true;
                }
                let previous = gone;
                if !previous.is_empty() {
                    debug!("Dropped {} thread(s) no longer reported", previous.len());
                }
            }
            Err(e) => {
                state.threads_dirty = true;
                if !self.client.is_closed() {
                    warn!("Failed to refresh threads: {}", e);
                }
            }
        }
        state.snapshot()
    }

    /// Frames of a suspended thread, refreshed first if dirty.
    ///
    /// Running or unknown threads have no frames. Failures after the
    /// channel closed are reported as no frames.
    pub async fn get_stack_frames(&self, thread_id: i64) -> Result<Vec<StackFrameRef>> {
        {
            let mut state = self.state();
            let Some(thread) = state.find_mut(thread_id) else {
                return Ok(Vec::new());
            };
            if !thread.suspended {
                return Ok(Vec::new());
            }
            if !thread.frames_dirty {
                return Ok(thread.frames.clone());
            }
            thread.frames_dirty = false;
        }

        // Only the first page is fetched
        let arguments = StackTraceArguments {
            thread_id,
            start_frame: Some(0),
            levels: Some(self.page_size),
        };
        let result: Result<StackTraceResponseBody> =
            call(self.client.as_ref(), requests::STACK_TRACE, &arguments).await;

        let mut state = self.state();
        match result {
            Ok(body) => match state.find_mut(thread_id) {
                Some(thread) => {
                    merge_frames(thread_id, &mut thread.frames, body.stack_frames);
                    Ok(thread.frames.clone())
                }
                None => Ok(body
                    .stack_frames
                    .into_iter()
                    .enumerate()
                    .map(|(depth, frame)| Arc::new(StackFrameSlot::new(thread_id, frame, depth)))
                    .collect()),
            },
            Err(e) => {
                if let Some(thread) = state.find_mut(thread_id) {
                    thread.frames_dirty = true;
                }
                if self.client.is_closed() {
                    return Ok(Vec::new());
                }
                Err(match e {
                    Error::RequestFailed { .. } | Error::Cancelled => e,
                    other => Error::request_failed(requests::STACK_TRACE, other.to_string()),
                })
            }
        }
    }

    /// Top frame of a thread, if it has any
    pub async fn top_frame(&self, thread_id: i64) -> Result<Option<StackFrameRef>> {
        Ok(self.get_stack_frames(thread_id).await?.into_iter().next())
    }

    pub fn cached_threads(&self) -> Vec<ThreadInfo> {
        self.state().snapshot()
    }

    pub fn thread(&self, thread_id: i64) -> Option<ThreadInfo> {
        self.state().find(thread_id).map(ThreadEntry::info)
    }

    /// Thread name, or a placeholder that schedules a thread list refresh
    pub fn display_name(&self, thread_id: i64) -> String {
        let mut state = self.state();
        match state.find(thread_id).and_then(|t| t.name.clone()) {
            Some(name) => name,
            None => {
                state.threads_dirty = true;
                PENDING_THREAD_NAME.to_string()
            }
        }
    }

    pub fn first_thread_id(&self) -> Option<i64> {
        self.state().threads.first().map(|t| t.id)
    }

    pub fn is_threads_dirty(&self) -> bool {
        self.state().threads_dirty
    }

    pub fn is_frames_dirty(&self, thread_id: i64) -> Option<bool> {
        self.state().find(thread_id).map(|t| t.frames_dirty)
    }

    pub fn mark_threads_dirty(&self) {
        self.state().threads_dirty = true;
    }

    /// Apply a `stopped` event.
    ///
    /// With `all_threads` every known thread is suspended and dirtied;
    /// otherwise only `thread_id`, which is created if unseen.
    pub fn on_stopped(&self, thread_id: Option<i64>, all_threads: bool) {
        let mut state = self.state();
        if all_threads {
            for thread in state.threads.iter_mut() {
                Self::mark_stopped(thread);
            }
        }
        if let Some(id) = thread_id {
            Self::mark_stopped(state.get_or_insert(id));
        }
    }

    /// Apply a `continued` event or a successful resume.
    ///
    /// With `all_threads` every known thread is resumed and dirtied;
    /// `thread_id`, if given, is created when unseen.
    pub fn on_continued(&self, thread_id: Option<i64>, all_threads: bool) {
        let mut state = self.state();
        if all_threads {
            for thread in state.threads.iter_mut() {
                Self::mark_continued(thread);
            }
        }
        if let Some(id) = thread_id {
            Self::mark_continued(state.get_or_insert(id));
        }
    }

    /// A resume or step was requested on `thread_id`
    pub fn on_resume_requested(&self, thread_id: i64) {
        let mut state = self.state();
        let thread = state.get_or_insert(thread_id);
        Self::mark_continued(thread);
        thread.stepping = true;
        thread.error_message = None;
    }

    /// A resume/step failed: the thread is still where it was
    pub fn on_resume_failed(&self, thread_id: i64, message: String) {
        let mut state = self.state();
        let thread = state.get_or_insert(thread_id);
        Self::mark_stopped(thread);
        thread.error_message = Some(message);
    }

    pub fn set_error_message(&self, thread_id: i64, message: String) {
        if let Some(thread) = self.state().find_mut(thread_id) {
            thread.error_message = Some(message);
        }
    }

    pub fn any_suspended(&self) -> bool {
        self.state().threads.iter().any(|t| t.suspended)
    }

    pub fn is_empty(&self) -> bool {
        self.state().threads.is_empty()
    }

    /// Forget everything; used at session end
    pub fn clear(&self) {
        let mut state = self.state();
        state.threads.clear();
        state.threads_dirty = false;
    }

    fn mark_stopped(thread: &mut ThreadEntry) {
        thread.suspended = true;
        thread.stepping = false;
        thread.frames_dirty = true;
    }

    fn mark_continued(thread: &mut ThreadEntry) {
        thread.suspended = false;
        thread.frames_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: i64, path: &str, line: i64) -> StackFrame {
        StackFrame {
            id,
            name: format!("fn{}", id),
            source: Some(Source::new(path.rsplit('/').next().unwrap_or(path), path)),
            line,
            column: 1,
            instruction_pointer_reference: None,
        }
    }

    #[test]
    fn test_merge_reuses_slot_with_same_source() {
        let mut frames = Vec::new();
        merge_frames(1, &mut frames, vec![frame(10, "/a.py", 3), frame(11, "/b.py", 7)]);
        let top = Arc::clone(&frames[0]);
        let second = Arc::clone(&frames[1]);

        merge_frames(1, &mut frames, vec![frame(20, "/a.py", 4), frame(21, "/c.py", 9)]);

        assert!(Arc::ptr_eq(&top, &frames[0]));
        assert_eq!(frames[0].id(), 20);
        assert_eq!(frames[0].line(), 4);
        assert!(!Arc::ptr_eq(&second, &frames[1]));
        assert_eq!(frames[1].depth(), 1);
    }

    #[test]
    fn test_merge_trims_and_appends() {
        let mut frames = Vec::new();
        merge_frames(1, &mut frames, vec![frame(1, "/a.py", 1), frame(2, "/b.py", 2), frame(3, "/c.py", 3)]);
        merge_frames(1, &mut frames, vec![frame(4, "/a.py", 1)]);
        assert_eq!(frames.len(), 1);

        merge_frames(1, &mut frames, vec![frame(5, "/a.py", 1), frame(6, "/d.py", 8)]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].depth(), 1);
        assert_eq!(frames[1].id(), 6);
    }

    #[test]
    fn test_scopes_survive_only_same_frame_id() {
        let mut frames = Vec::new();
        merge_frames(1, &mut frames, vec![frame(10, "/a.py", 3)]);
        frames[0].store_scopes(10, Vec::new());
        assert!(frames[0].cached_scopes().is_some());

        // Same id: adapter reused the frame
        merge_frames(1, &mut frames, vec![frame(10, "/a.py", 5)]);
        assert!(frames[0].cached_scopes().is_some());

        merge_frames(1, &mut frames, vec![frame(11, "/a.py", 6)]);
        assert!(frames[0].cached_scopes().is_none());
    }

    #[test]
    fn test_display_name_placeholder() {
        let info = ThreadInfo {
            id: 1,
            name: None,
            suspended: false,
            stepping: false,
            error_message: None,
        };
        assert_eq!(info.display_name(), "<pending>");
    }
}
