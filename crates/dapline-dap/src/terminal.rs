//! `runInTerminal` reverse request
//!
//! Starts the debuggee on the adapter's behalf. The process runs as a plain
//! child with its output forwarded to the session's output sink; there is
//! no real terminal. The response never carries a process id.

use crate::broker::ReverseRequestHandler;
use crate::events::EventBus;
use crate::{Error, Request, Result, RunInTerminalRequestArguments, RunInTerminalResponseBody};
use async_trait::async_trait;
use dapline_core::{OutputSinkRef, OutputStream, SessionEvent};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Display form of a command line; arguments containing spaces are quoted
pub fn quote_command_line(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.contains(' ') {
                format!("\"{}\"", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the command for a `runInTerminal` request.
///
/// A `None` environment value removes that variable from the inherited
/// environment instead of setting it empty.
pub fn build_command(arguments: &RunInTerminalRequestArguments) -> Result<Command> {
    let (program, rest) = arguments
        .args
        .split_first()
        .ok_or_else(|| Error::Protocol("runInTerminal without arguments".to_string()))?;

    let mut command = Command::new(program);
    command.args(rest);
    if !arguments.cwd.is_empty() {
        command.current_dir(&arguments.cwd);
    }
    if let Some(env) = &arguments.env {
        for (name, value) in env {
            match value {
                Some(value) => command.env(name, value),
                None => command.env_remove(name),
            };
        }
    }
    Ok(command)
}

pub struct RunInTerminalHandler {
    output: OutputSinkRef,
    events: Arc<EventBus>,
    ready_delay: Duration,
    children: Mutex<Vec<Child>>,
}

impl RunInTerminalHandler {
    pub fn new(output: OutputSinkRef, events: Arc<EventBus>, ready_delay: Duration) -> Self {
        Self {
            output,
            events,
            ready_delay,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Kill every process started through this handler that is still running
    pub fn kill_all(&self) {
        let children: Vec<Child> = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for mut child in children {
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill terminal process: {}", e);
            }
        }
    }

    fn forward<R>(&self, reader: R, stream: OutputStream)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let output = Arc::clone(&self.output);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                output.write(stream, &format!("{}\n", line));
            }
        });
    }
}

#[async_trait]
impl ReverseRequestHandler for RunInTerminalHandler {
    async fn handle(&self, request: &Request) -> Result<Option<serde_json::Value>> {
        let arguments: RunInTerminalRequestArguments = request.parse_arguments()?;
        let label = quote_command_line(&arguments.args);
        info!(kind = ?arguments.kind, "Launching: {}", label);

        let mut command = build_command(&arguments)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Communication(format!("Failed to start '{}': {}", label, e)))?;

        if let Some(stdout) = child.stdout.take() {
            self.forward(stdout, OutputStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.forward(stderr, OutputStream::Stderr);
        }
        self.events.emit(SessionEvent::ProcessStarted {
            name: label,
            process_id: child.id().map(i64::from),
        });
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(child);

        // Some adapters misbehave when told the process is ready too early
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }

        let body = RunInTerminalResponseBody {
            process_id: None,
            shell_process_id: None,
        };
        match serde_json::to_value(body) {
            Ok(body) => Ok(Some(body)),
            Err(e) => {
                warn!("Failed to encode runInTerminal response: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapline_core::BufferedOutputSink;
    use std::collections::HashMap;

    fn arguments(args: &[&str]) -> RunInTerminalRequestArguments {
        RunInTerminalRequestArguments {
            kind: Some("integrated".to_string()),
            title: None,
            cwd: String::new(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: None,
        }
    }

    #[test]
    fn test_quote_command_line() {
        let args: Vec<String> = ["python", "/tmp/my script.py", "--flag"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            quote_command_line(&args),
            "python \"/tmp/my script.py\" --flag"
        );
        assert_eq!(quote_command_line(&[]), "");
    }

    #[test]
    fn test_empty_args_rejected() {
        assert!(build_command(&arguments(&[])).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_override_and_removal() {
        std::env::set_var("DAPLINE_TERMINAL_REMOVED", "present");
        let mut args = arguments(&["sh", "-c", "echo \"$DAPLINE_SET-${DAPLINE_TERMINAL_REMOVED:-gone}\""]);
        args.env = Some(HashMap::from([
            ("DAPLINE_SET".to_string(), Some("yes".to_string())),
            ("DAPLINE_TERMINAL_REMOVED".to_string(), None),
        ]));

        let output = build_command(&args).unwrap().output().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "yes-gone");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_handler_spawns_and_omits_process_id() {
        let sink = Arc::new(BufferedOutputSink::new());
        let events = Arc::new(EventBus::new(8));
        let mut rx = events.subscribe();
        let handler = RunInTerminalHandler::new(sink.clone(), events.clone(), Duration::ZERO);

        let request = Request::new(1, "runInTerminal").with_arguments(
            serde_json::to_value(arguments(&["sh", "-c", "echo hello from terminal"])).unwrap(),
        );
        let body = handler.handle(&request).await.unwrap().unwrap();
        assert!(body.get("processId").is_none());

        match rx.recv().await.unwrap() {
            SessionEvent::ProcessStarted { name, .. } => {
                assert_eq!(name, "sh -c \"echo hello from terminal\"")
            }
            other => panic!("unexpected event: {:?}", other),
        }

        for _ in 0..50 {
            if sink.text(OutputStream::Stdout).contains("hello from terminal") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sink.text(OutputStream::Stdout), "hello from terminal\n");
        handler.kill_all();
    }
}
