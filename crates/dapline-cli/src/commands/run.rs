//! `dapline run` - one session from start to finish
//!
//! Prints adapter output as it arrives. Whenever execution suspends, the
//! top frames of every suspended thread are printed and the program is
//! resumed. Ctrl-C terminates the session; a second Ctrl-C disconnects.

use crate::console::ConsoleSink;
use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use dapline_config::Config;
use dapline_core::{
    Breakpoint, EnvSubstitution, InMemoryBreakpointStore, LaunchParameters, Location, SessionEvent,
    SessionMode,
};
use dapline_dap::{AdapterCommand, DebugSession, SessionOptions, Transport};
use dapline_logging::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

/// Frames printed per suspended thread
const PRINTED_FRAMES: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    #[default]
    Debug,
    Run,
}

impl From<Mode> for SessionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Debug => SessionMode::Debug,
            Mode::Run => SessionMode::Run,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Adapter executable, spoken to over stdio
    #[arg(long, conflicts_with = "connect", required_unless_present = "connect")]
    pub adapter: Option<String>,

    /// Argument for the adapter executable (repeatable)
    #[arg(long = "adapter-arg", allow_hyphen_values = true, requires = "adapter")]
    pub adapter_args: Vec<String>,

    /// Adapter already listening on HOST:PORT
    #[arg(long)]
    pub connect: Option<String>,

    /// Launch parameters: a JSON object or a file containing one
    #[arg(long)]
    pub params: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::Debug)]
    pub mode: Mode,

    /// Line breakpoint as FILE:LINE (repeatable)
    #[arg(long = "break", value_name = "FILE:LINE")]
    pub breakpoints: Vec<String>,

    /// Log every byte exchanged with the adapter
    #[arg(long)]
    pub trace_io: bool,
}

/// Split `HOST:PORT`; the last `:` separates the port
fn parse_connect(address: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Expected HOST:PORT, got '{}'", address))?;
    if host.is_empty() {
        bail!("Missing host in '{}'", address);
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in '{}'", address))?;
    Ok((host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
}

/// Inline JSON if it looks like an object, otherwise a file path
fn load_parameters(params: Option<&str>) -> anyhow::Result<LaunchParameters> {
    let Some(params) = params else {
        return Ok(LaunchParameters::new().with("request", "launch"));
    };
    let json = if params.trim_start().starts_with('{') {
        params.to_string()
    } else {
        std::fs::read_to_string(Path::new(params))
            .with_context(|| format!("Failed to read launch parameters from {}", params))?
    };
    Ok(LaunchParameters::from_json_with_substitution(
        &json,
        &EnvSubstitution::new(),
    )?)
}

fn breakpoint_store(locations: &[String]) -> anyhow::Result<InMemoryBreakpointStore> {
    let mut breakpoints = Vec::with_capacity(locations.len());
    for (i, location) in locations.iter().enumerate() {
        let location = Location::parse(location)?;
        let file = std::path::absolute(&location.file).unwrap_or(location.file);
        breakpoints.push(Breakpoint::line(i as u64 + 1, file, location.line));
    }
    Ok(InMemoryBreakpointStore::with_breakpoints(breakpoints))
}

async fn open_transport(args: &RunArgs, config: &Config) -> anyhow::Result<Transport> {
    if let Some(address) = &args.connect {
        let (host, port) = parse_connect(address)?;
        info!("Connecting to debug adapter at {}:{}", host, port);
        return Ok(Transport::connect_tcp(&host, port, &config.session).await?);
    }
    let Some(adapter) = &args.adapter else {
        bail!("Either --adapter or --connect is required");
    };
    let command = AdapterCommand::new(adapter).args(args.adapter_args.iter().cloned());
    info!("Starting debug adapter: {}", adapter);
    Ok(Transport::spawn(&command)?)
}

pub async fn run(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    config.session.trace.io |= args.trace_io;
    let parameters = load_parameters(args.params.as_deref())?;
    let store = Arc::new(breakpoint_store(&args.breakpoints)?);

    let transport = open_transport(&args, &config).await?;
    let options = SessionOptions::new(parameters)
        .mode(args.mode.into())
        .config(config.session.clone())
        .breakpoints(store)
        .output(Arc::new(ConsoleSink));
    let session = DebugSession::start(transport, options)
        .await
        .context("Debug session failed to start")?;
    let mut events = session.subscribe();
    info!(program = %session.target_name(), "Session started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Suspended { .. }) => {
                    print_suspended(&session).await;
                    resume_suspended(&session).await;
                }
                Some(SessionEvent::Exited { exit_code }) => {
                    eprintln!("Process exited with code {}", exit_code);
                }
                Some(SessionEvent::BreakpointsConfirmed { source, breakpoints }) => {
                    let unverified = breakpoints.iter().filter(|bp| !bp.verified).count();
                    if unverified > 0 {
                        warn!(source = %source, unverified, "Adapter did not verify all breakpoints");
                    }
                }
                Some(SessionEvent::Terminated) | None => break,
                Some(other) => debug!(?other, "Session event"),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, terminating session");
                session.terminate().await?;
            }
        }
    }

    info!("Session ended");
    Ok(())
}

async fn print_suspended(session: &DebugSession) {
    for thread in session.get_threads().await {
        if !thread.suspended {
            continue;
        }
        eprintln!("Thread {} ({}) suspended", thread.id, thread.display_name());
        match session.get_stack_frames(thread.id).await {
            Ok(frames) => {
                for frame in frames.iter().take(PRINTED_FRAMES) {
                    let location = frame
                        .source()
                        .and_then(|s| s.path.or(s.name))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    eprintln!(
                        "  #{} {} at {}:{}",
                        frame.depth(),
                        frame.name(),
                        location,
                        frame.line()
                    );
                }
            }
            Err(e) => eprintln!("  <frames unavailable: {}>", e),
        }
    }
}

async fn resume_suspended(session: &DebugSession) {
    let suspended: Vec<i64> = session
        .threads()
        .cached_threads()
        .into_iter()
        .filter(|t| t.suspended)
        .map(|t| t.id)
        .collect();
    for thread_id in suspended {
        // An earlier resume may have continued every thread
        let still_suspended = session
            .threads()
            .thread(thread_id)
            .is_some_and(|t| t.suspended);
        if still_suspended {
            if let Err(e) = session.resume_thread(thread_id).await {
                warn!(thread_id, "Failed to resume: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            parse_connect("localhost:5678").unwrap(),
            ("localhost".to_string(), 5678)
        );
        assert_eq!(parse_connect("[::1]:4711").unwrap(), ("::1".to_string(), 4711));
        assert!(parse_connect("localhost").is_err());
        assert!(parse_connect(":5678").is_err());
        assert!(parse_connect("host:port").is_err());
    }

    #[test]
    fn test_parameters_inline_and_from_file() {
        let inline = load_parameters(Some(r#"{"type": "python", "program": "app.py"}"#)).unwrap();
        assert_eq!(inline.adapter_id(), "python");
        assert_eq!(inline.target_name(), "app.py");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"request": "attach", "type": "go"}}"#).unwrap();
        let from_file = load_parameters(file.path().to_str()).unwrap();
        assert_eq!(from_file.request_kind(), dapline_core::RequestKind::Attach);

        assert!(load_parameters(Some("/no/such/params.json")).is_err());
        assert!(load_parameters(Some("[1, 2]")).is_err());
    }

    #[test]
    fn test_default_parameters_launch() {
        let params = load_parameters(None).unwrap();
        assert_eq!(params.request_kind(), dapline_core::RequestKind::Launch);
    }

    #[test]
    fn test_breakpoint_store_from_locations() {
        use dapline_core::BreakpointStore;

        let store =
            breakpoint_store(&["/src/app.py:10".to_string(), "/src/util.py:3".to_string()])
                .unwrap();
        let breakpoints = store.breakpoints();
        assert_eq!(breakpoints.len(), 2);
        assert!(breakpoints.iter().all(|bp| bp.registered && bp.enabled));

        assert!(breakpoint_store(&["app.py".to_string()]).is_err());
        assert!(breakpoint_store(&["app.py:0".to_string()]).is_err());
    }

    #[test]
    fn test_mode_maps_to_session_mode() {
        assert_eq!(SessionMode::from(Mode::Run), SessionMode::Run);
        assert_eq!(SessionMode::from(Mode::default()), SessionMode::Debug);
    }
}
