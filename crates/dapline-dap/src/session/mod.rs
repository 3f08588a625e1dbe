//! Session Controller - one debug session from connect to terminate
//!
//! ```text
//! Connecting → Initializing → Launching|Attaching → ConfigurationPending → Running
//!                                                        (debug mode only)
//! Running → Terminating → Terminated
//! ```
//!
//! Startup sends `initialize`, then `launch`/`attach`. In debug mode it then
//! waits for the adapter's `initialized` event, sends every breakpoint and
//! finishes with `configurationDone`. The launch response is accepted in
//! either order relative to `initialized`.
//!
//! The session ends on a `terminated` event, on a completed `disconnect`,
//! or when the transport fails. Ending runs the terminal actions exactly
//! once.

mod gate;
mod handlers;

pub use gate::InitializedGate;

use crate::breakpoints::BreakpointReconciler;
use crate::broker::DapBroker;
use crate::client::{call, DapClient, DapClientRef};
use crate::constants::{client, requests, reverse_requests};
use crate::events::EventBus;
use crate::ext::DebugResult;
use crate::terminal::RunInTerminalHandler;
use crate::threads::{StackFrameRef, ThreadCache, ThreadInfo};
use crate::transport::{Cleanup, Transport, TracingTraceSink};
use crate::variables::{Variable, VariableResolver};
use crate::{
    Capabilities, ContinueResponseBody, DisconnectArguments, Error, InitializeRequestArguments,
    Result, TerminateArguments, ThreadArguments,
};
use dapline_config::SessionConfig;
use dapline_core::{
    BreakpointStoreRef, LaunchParameters, NullOutputSink, OutputSinkRef, RequestKind,
    ResumeDetail, SessionEvent, SessionMode, SessionState, SuspendDetail,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a session needs besides its transport
pub struct SessionOptions {
    parameters: LaunchParameters,
    mode: SessionMode,
    config: SessionConfig,
    breakpoints: Option<BreakpointStoreRef>,
    output: OutputSinkRef,
}

impl SessionOptions {
    pub fn new(parameters: LaunchParameters) -> Self {
        Self {
            parameters,
            mode: SessionMode::Debug,
            config: SessionConfig::default(),
            breakpoints: None,
            output: Arc::new(NullOutputSink),
        }
    }

    pub fn mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Host breakpoint store; without one no breakpoints are sent
    pub fn breakpoints(mut self, store: BreakpointStoreRef) -> Self {
        self.breakpoints = Some(store);
        self
    }

    pub fn output(mut self, output: OutputSinkRef) -> Self {
        self.output = output;
        self
    }
}

pub struct DebugSession {
    broker: Arc<DapBroker>,
    client: DapClientRef,
    config: SessionConfig,
    parameters: LaunchParameters,
    mode: SessionMode,
    target_name: String,
    capabilities: RwLock<Capabilities>,
    state: watch::Sender<SessionState>,
    sent_terminate: AtomicBool,
    finished: AtomicBool,
    initialized: InitializedGate,
    threads: ThreadCache,
    variables: VariableResolver,
    reconciler: Option<Arc<BreakpointReconciler>>,
    events: Arc<EventBus>,
    output: OutputSinkRef,
    terminal: Arc<RunInTerminalHandler>,
    cleanup: Mutex<Option<Cleanup>>,
}

impl DebugSession {
    /// Connect over `transport` and run the startup handshake.
    ///
    /// On failure the session is torn down (cleanup included) before the
    /// error is returned.
    pub async fn start(transport: Transport, options: SessionOptions) -> Result<Arc<Self>> {
        let session = Self::connect(transport, options);
        if let Err(e) = session.run_startup().await {
            warn!("Debug session startup failed: {}", e);
            session.finish().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Build the session and start listening; no request is sent yet
    fn connect(transport: Transport, options: SessionOptions) -> Arc<Self> {
        let SessionOptions {
            mut parameters,
            mode,
            config,
            breakpoints,
            output,
        } = options;
        parameters.set_no_debug(mode);

        let transport = if config.trace.io {
            transport.with_trace(Arc::new(TracingTraceSink))
        } else {
            transport
        };
        let (reader, writer, cleanup) = transport.into_parts();
        let broker = Arc::new(DapBroker::new_with_config(reader, writer, config.clone()));
        let client: DapClientRef = broker.clone();

        let events = Arc::new(EventBus::new(config.event_channel_capacity));
        let terminal = Arc::new(RunInTerminalHandler::new(
            Arc::clone(&output),
            Arc::clone(&events),
            config.run_in_terminal_delay(),
        ));
        broker.on_reverse_request(reverse_requests::RUN_IN_TERMINAL, terminal.clone());

        let reconciler = match (mode.syncs_breakpoints(), breakpoints) {
            (true, Some(store)) => Some(BreakpointReconciler::new(
                store,
                Arc::clone(&client),
                Arc::clone(&events),
                tokio::runtime::Handle::current(),
            )),
            _ => None,
        };

        let adapter_events = broker.subscribe_events_lossless();
        let (state, _) = watch::channel(SessionState::Connecting);

        let session = Arc::new(Self {
            threads: ThreadCache::new(Arc::clone(&client), config.stack_page_size),
            variables: VariableResolver::new(Arc::clone(&client)),
            target_name: parameters.target_name(),
            broker,
            client,
            config,
            parameters,
            mode,
            capabilities: RwLock::new(Capabilities::default()),
            state,
            sent_terminate: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            initialized: InitializedGate::new(),
            reconciler,
            events,
            output,
            terminal,
            cleanup: Mutex::new(cleanup),
        });
        Self::spawn_event_pump(&session, adapter_events);
        session
    }

    #[tracing::instrument(skip(self), fields(program = %self.target_name))]
    async fn run_startup(&self) -> Result<()> {
        self.set_state(SessionState::Initializing);
        let arguments = InitializeRequestArguments {
            client_id: Some(client::CLIENT_ID.to_string()),
            client_name: Some(client::CLIENT_NAME.to_string()),
            adapter_id: self.parameters.adapter_id().to_string(),
            locale: None,
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some(client::PATH_FORMAT.to_string()),
            supports_variable_type: Some(true),
            supports_variable_paging: Some(true),
            supports_run_in_terminal_request: Some(true),
        };
        let capabilities: Capabilities = call(self.client.as_ref(), requests::INITIALIZE, &arguments)
            .await
            .map_err(|e| Error::InitializationFailed(format!("initialize: {}", e)))?;
        debug!(?capabilities, "Adapter capabilities");
        *self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = capabilities;

        let kind = self.parameters.request_kind();
        self.set_state(match kind {
            RequestKind::Launch => SessionState::Launching,
            RequestKind::Attach => SessionState::Attaching,
        });
        let mut launch = self
            .broker
            .send(kind.command(), Some(self.parameters.to_value()))
            .await?;

        if !self.mode.syncs_breakpoints() {
            self.await_launch(&mut launch).await?;
            self.set_state(SessionState::Running);
            return Ok(());
        }

        let gate_timeout = self.config.request_timeout();
        let mut launch_done = false;
        tokio::select! {
            result = &mut launch => {
                launch_done = true;
                self.check_launch(kind, result)?;
                self.wait_initialized(gate_timeout).await?;
            }
            result = self.wait_initialized(gate_timeout) => result?,
        }

        self.set_state(SessionState::ConfigurationPending);
        if let Some(reconciler) = &self.reconciler {
            let report = reconciler.install().await;
            if !report.is_success() {
                warn!(
                    failed = report.failures.len(),
                    "Some breakpoints could not be set"
                );
            }
        }
        if self.capabilities().configuration_done() {
            self.client
                .request(requests::CONFIGURATION_DONE, None)
                .await?;
        }
        if !launch_done {
            self.await_launch(&mut launch).await?;
        }

        self.set_state(SessionState::Running);
        info!(program = %self.target_name, "Debug session running");
        Ok(())
    }

    async fn await_launch(&self, launch: &mut crate::ResultHandle) -> Result<()> {
        let kind = self.parameters.request_kind();
        let result = match tokio::time::timeout(self.config.request_timeout(), launch).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.config.request_timeout_ms)),
        };
        self.check_launch(kind, result)
    }

    fn check_launch(&self, kind: RequestKind, result: Result<crate::Response>) -> Result<()> {
        let outcome = result.and_then(crate::client::check_success);
        if let Err(e) = &outcome {
            // Anything waiting for `initialized` would otherwise hang
            self.initialized.fail(e.clone());
            return Err(Error::InitializationFailed(format!("{}: {}", kind.command(), e)));
        }
        Ok(())
    }

    async fn wait_initialized(&self, timeout: std::time::Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.initialized.wait()).await {
            Ok(result) => result,
            Err(_) => Err(Error::InitializationFailed(
                "Adapter never sent 'initialized'".to_string(),
            )),
        }
    }

    fn spawn_event_pump(
        session: &Arc<Self>,
        mut adapter_events: mpsc::UnboundedReceiver<crate::Event>,
    ) {
        let weak = Arc::downgrade(session);
        tokio::spawn(async move {
            while let Some(event) = adapter_events.recv().await {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                session.handle_event(event).await;
            }
            // Channel closed: transport failure or our own teardown
            if let Some(session) = weak.upgrade() {
                session.finish().await;
            }
        });
    }

    // ============================================================
    // ACCESSORS
    // ============================================================

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow state transitions
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_terminated(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn parameters(&self) -> &LaunchParameters {
        &self.parameters
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<DapBroker> {
        &self.broker
    }

    /// Send `command` and block the calling thread until it is answered or
    /// `token` is cancelled, polling at the configured interval.
    ///
    /// For synchronous hosts; never call this from a runtime worker thread.
    pub fn request_blocking(
        &self,
        runtime: &tokio::runtime::Handle,
        command: &str,
        arguments: Option<serde_json::Value>,
        token: &CancellationToken,
    ) -> Result<crate::Response> {
        let broker = Arc::clone(&self.broker);
        let command = command.to_string();
        crate::wait::block_on_cancellable(
            runtime,
            async move { broker.send(&command, arguments).await?.await },
            token,
            self.config.poll_interval(),
        )
    }

    pub fn threads(&self) -> &ThreadCache {
        &self.threads
    }

    pub fn variables(&self) -> &VariableResolver {
        &self.variables
    }

    pub fn breakpoints(&self) -> Option<&Arc<BreakpointReconciler>> {
        self.reconciler.as_ref()
    }

    /// Resolves once the adapter has sent `initialized`
    pub async fn initialized(&self) -> Result<()> {
        self.initialized.wait().await
    }

    /// Subscribe to session events; the stream ends when the session terminates
    pub fn subscribe(&self) -> mpsc::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            // Terminated is final
            if *current == state || current.is_terminated() {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(state = %state, "Session state changed");
            self.events.emit(SessionEvent::StateChanged { state });
        }
    }

    // ============================================================
    // INSPECTION
    // ============================================================

    pub async fn get_threads(&self) -> Vec<ThreadInfo> {
        if self.is_terminated() {
            return Vec::new();
        }
        self.threads.get_threads().await
    }

    pub async fn get_stack_frames(&self, thread_id: i64) -> Result<Vec<StackFrameRef>> {
        if self.is_terminated() {
            return Ok(Vec::new());
        }
        self.threads.get_stack_frames(thread_id).await
    }

    /// Thread name, or `<pending>` while the thread list is being fetched
    pub fn thread_display_name(&self, thread_id: i64) -> String {
        self.threads.display_name(thread_id)
    }

    pub async fn frame_scopes(&self, frame: &StackFrameRef) -> Result<Vec<Variable>> {
        self.variables.scopes(frame).await
    }

    pub async fn get_variables(&self, reference: i64) -> Result<Vec<Variable>> {
        self.variables.get_variables(reference).await
    }

    pub async fn set_value(&self, variable: &Variable, expression: &str) -> Result<Variable> {
        self.variables.set_value(variable, expression).await
    }

    pub async fn evaluate(&self, frame_id: Option<i64>, expression: &str) -> Result<Variable> {
        self.variables.evaluate(frame_id, expression).await
    }

    // ============================================================
    // EXECUTION CONTROL
    // ============================================================

    pub async fn resume_thread(&self, thread_id: i64) -> Result<()> {
        self.begin_resume(thread_id, ResumeDetail::ClientRequest);
        let response: ContinueResponseBody = match call(
            self.client.as_ref(),
            requests::CONTINUE,
            &ThreadArguments { thread_id },
        )
        .await
        {
            Ok(body) => body,
            Err(e) => return Err(self.resume_failed(thread_id, e)),
        };

        if response.all_threads_continued != Some(false) {
            self.threads.on_continued(None, true);
            self.events.emit(SessionEvent::Resumed {
                thread_id: None,
                detail: ResumeDetail::ClientRequest,
            });
        }
        Ok(())
    }

    pub async fn step_over(&self, thread_id: i64) -> Result<()> {
        self.step(thread_id, requests::NEXT, ResumeDetail::StepOver)
            .await
    }

    pub async fn step_into(&self, thread_id: i64) -> Result<()> {
        self.step(thread_id, requests::STEP_IN, ResumeDetail::StepInto)
            .await
    }

    pub async fn step_return(&self, thread_id: i64) -> Result<()> {
        self.step(thread_id, requests::STEP_OUT, ResumeDetail::StepReturn)
            .await
    }

    pub async fn suspend_thread(&self, thread_id: i64) -> Result<()> {
        let arguments = crate::client::to_arguments(&ThreadArguments { thread_id })?;
        if let Err(e) = self.client.request(requests::PAUSE, arguments).await {
            warn!(thread_id, "Failed to suspend thread: {}", e);
            self.threads.set_error_message(thread_id, e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Resume the first known thread
    pub async fn resume(&self) -> Result<()> {
        match self.first_thread().await {
            Some(id) => self.resume_thread(id).await,
            None => Ok(()),
        }
    }

    /// Pause the first known thread
    pub async fn suspend(&self) -> Result<()> {
        match self.first_thread().await {
            Some(id) => self.suspend_thread(id).await,
            None => Ok(()),
        }
    }

    pub fn is_suspended(&self) -> bool {
        !self.is_terminated() && self.threads.any_suspended()
    }

    pub fn can_resume(&self) -> bool {
        !self.is_terminated() && self.is_suspended() && !self.threads.is_empty()
    }

    pub fn can_suspend(&self) -> bool {
        !self.is_terminated() && !self.is_suspended() && !self.threads.is_empty()
    }

    async fn first_thread(&self) -> Option<i64> {
        self.get_threads().await.first().map(|t| t.id)
    }

    async fn step(&self, thread_id: i64, command: &str, detail: ResumeDetail) -> Result<()> {
        self.begin_resume(thread_id, detail);
        let arguments = crate::client::to_arguments(&ThreadArguments { thread_id })?;
        match self.client.request(command, arguments).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.resume_failed(thread_id, e)),
        }
    }

    fn begin_resume(&self, thread_id: i64, detail: ResumeDetail) {
        self.threads.on_resume_requested(thread_id);
        self.variables.clear();
        self.events.emit(SessionEvent::Resumed {
            thread_id: Some(thread_id),
            detail,
        });
    }

    fn resume_failed(&self, thread_id: i64, error: Error) -> Error {
        warn!(thread_id, "Failed to resume thread: {}", error);
        self.threads.on_resume_failed(thread_id, error.to_string());
        self.events.emit(SessionEvent::Suspended {
            thread_id: Some(thread_id),
            detail: SuspendDetail::ClientRequest,
            description: Some(error.to_string()),
        });
        error
    }

    // ============================================================
    // TERMINATION
    // ============================================================

    /// End the session gracefully.
    ///
    /// Sends `terminate` once per session if the adapter supports it and
    /// the program was launched; otherwise, or on a second call,
    /// disconnects. Attached programs are never sent `terminate`.
    pub async fn terminate(&self) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }
        let should_send_terminate = !self.sent_terminate.load(Ordering::SeqCst)
            && self.capabilities().terminate()
            && self.parameters.request_kind() == RequestKind::Launch;

        if !should_send_terminate {
            return self.disconnect().await;
        }

        self.sent_terminate.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Terminating);
        info!("Sending terminate request");
        let arguments = crate::client::to_arguments(&TerminateArguments::default())?;
        // The adapter ends the session with a `terminated` event
        if let Some(handle) = self
            .broker
            .send(requests::TERMINATE, arguments)
            .await
            .debug_ok("Failed to send terminate")
        {
            handle
                .with_timeout(self.config.shutdown_timeout())
                .await
                .debug_ok("Terminate request did not complete");
        }
        Ok(())
    }

    /// End the session unconditionally, terminating the debuggee.
    ///
    /// Waits at most the shutdown grace period for the adapter, then tears
    /// down regardless.
    pub async fn disconnect(&self) -> Result<()> {
        if self.is_terminated() {
            return Ok(());
        }
        self.set_state(SessionState::Terminating);
        info!("Sending disconnect request");
        let arguments = crate::client::to_arguments(&DisconnectArguments {
            restart: None,
            terminate_debuggee: Some(true),
        })?;
        if let Some(handle) = self
            .broker
            .send(requests::DISCONNECT, arguments)
            .await
            .debug_ok("Failed to send disconnect")
        {
            handle
                .with_timeout(self.config.shutdown_timeout())
                .await
                .debug_ok("Disconnect request did not complete");
        }
        self.finish().await;
        Ok(())
    }

    /// Terminal actions; only the first call does anything
    async fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(program = %self.target_name, "Debug session terminated");

        if let Some(reconciler) = &self.reconciler {
            reconciler.uninstall();
        }
        self.initialized
            .fail(Error::Transport("Session terminated".to_string()));
        self.broker.close().await;
        self.terminal.kill_all();
        self.threads.clear();
        self.variables.clear();
        self.run_cleanup();

        self.set_state(SessionState::Terminated);
        self.events.emit(SessionEvent::Terminated);
        self.events.close();
    }

    fn run_cleanup(&self) {
        let cleanup = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleanup) = cleanup {
            // Teardown is best effort; a panicking callback must not abort it
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)).is_err() {
                warn!("Session cleanup callback panicked");
            }
        }
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            self.run_cleanup();
        }
    }
}
