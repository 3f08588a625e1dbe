//! Adapter event handling
//!
//! Events are applied in arrival order by the session's event pump. Each
//! handler updates the caches first and then notifies subscribers, so a
//! subscriber reacting to `Suspended` already sees the stopped thread.

use super::DebugSession;
use crate::constants::events;
use crate::{
    BreakpointEventBody, ContinuedEventBody, Event, ExitedEventBody, OutputEventBody,
    ProcessEventBody, StoppedEventBody, ThreadEventBody,
};
use dapline_core::{OutputEvent, SessionEvent, SuspendDetail};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

impl DebugSession {
    pub(super) async fn handle_event(&self, event: Event) {
        trace!(event = %event.event, "Adapter event");
        match event.event.as_str() {
            events::INITIALIZED => {
                if !self.initialized.complete() {
                    debug!("Duplicate 'initialized' event ignored");
                }
            }
            events::STOPPED => {
                if let Some(body) = parse_body::<StoppedEventBody>(&event) {
                    self.on_stopped(body);
                }
            }
            events::CONTINUED => {
                if let Some(body) = parse_body::<ContinuedEventBody>(&event) {
                    self.on_continued(body);
                }
            }
            events::THREAD => {
                if let Some(body) = parse_body::<ThreadEventBody>(&event) {
                    debug!(thread_id = body.thread_id, reason = %body.reason, "Thread event");
                }
                self.threads.mark_threads_dirty();
                self.events.emit(SessionEvent::ThreadsChanged);
            }
            events::OUTPUT => {
                if let Some(body) = parse_body::<OutputEventBody>(&event) {
                    self.on_output(body);
                }
            }
            events::EXITED => {
                if let Some(body) = parse_body::<ExitedEventBody>(&event) {
                    debug!(exit_code = body.exit_code, "Debuggee exited");
                    self.events.emit(SessionEvent::Exited {
                        exit_code: body.exit_code,
                    });
                }
            }
            events::BREAKPOINT => {
                if let Some(body) = parse_body::<BreakpointEventBody>(&event) {
                    self.events.emit(SessionEvent::BreakpointChanged {
                        reason: body.reason,
                        breakpoint: (&body.breakpoint).into(),
                    });
                }
            }
            events::PROCESS => {
                if let Some(body) = parse_body::<ProcessEventBody>(&event) {
                    self.events.emit(SessionEvent::ProcessStarted {
                        name: body.name,
                        process_id: body.system_process_id,
                    });
                }
            }
            events::TERMINATED => self.finish().await,
            other => debug!(event = other, "Unhandled adapter event"),
        }
    }

    fn on_stopped(&self, body: StoppedEventBody) {
        // A stop without a thread id can only mean the whole program
        let all_threads = body.all_threads_stopped == Some(true) || body.thread_id.is_none();
        self.threads.on_stopped(body.thread_id, all_threads);
        self.variables.clear();

        let detail = SuspendDetail::from_reason(&body.reason);
        debug!(
            thread_id = ?body.thread_id,
            reason = %body.reason,
            all_threads,
            "Execution stopped"
        );
        self.events.emit(SessionEvent::Suspended {
            thread_id: if all_threads { None } else { body.thread_id },
            detail,
            description: body.description,
        });
    }

    fn on_continued(&self, body: ContinuedEventBody) {
        let all_threads = body.all_threads_continued != Some(false);
        self.threads.on_continued(Some(body.thread_id), all_threads);
        self.variables.clear();
        self.events.emit(SessionEvent::Resumed {
            thread_id: if all_threads { None } else { Some(body.thread_id) },
            detail: dapline_core::ResumeDetail::Unspecified,
        });
    }

    fn on_output(&self, body: OutputEventBody) {
        let output = OutputEvent {
            category: body.category,
            output: body.output,
        };
        match output.stream() {
            Some(stream) => self.output.write(stream, &output.output),
            None => debug!(
                category = ?output.category,
                "Adapter output: {}",
                output.output.trim_end()
            ),
        }
        self.events.emit(SessionEvent::Output(output));
    }
}

fn parse_body<T: DeserializeOwned>(event: &Event) -> Option<T> {
    match event.parse_body() {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(event = %event.event, "Malformed event body: {}", e);
            None
        }
    }
}
