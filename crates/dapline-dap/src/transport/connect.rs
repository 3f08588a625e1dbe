//! Adapter process spawning and TCP connection
//!
//! TCP connection uses retry with exponential backoff and jitter, and
//! configures keep-alive so idle sessions survive aggressive NAT/OS
//! timeouts.

use super::Transport;
use crate::{Error, Result};
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use dapline_config::constants::DEFAULT_TCP_KEEPALIVE_RETRIES;
use dapline_config::constants::{
    DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS, DEFAULT_TCP_KEEPALIVE_TIME_SECS, LOCALHOST_IPV4,
};
use dapline_config::SessionConfig;
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use std::collections::HashMap;
use std::net::Shutdown;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, trace, warn};

/// How to start a debug adapter that speaks DAP over stdio
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AdapterCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Spawn the adapter with piped stdio
pub(super) fn spawn(command: &AdapterCommand) -> Result<Transport> {
    info!(
        "Launching adapter: {} {}",
        command.command,
        command.args.join(" ")
    );

    let mut cmd = Command::new(&command.command);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &command.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|e| {
        Error::Communication(format!("Failed to spawn '{}': {}", command.command, e))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Communication("Failed to get stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Communication("Failed to get stdout".to_string()))?;
    if let Some(stderr) = child.stderr.take() {
        drain_stderr(stderr);
    }

    let child = Mutex::new(Some(child));
    Ok(Transport::from_streams(stdout, stdin).with_cleanup(move || kill_child(&child)))
}

fn kill_child(child: &Mutex<Option<Child>>) {
    let Some(mut child) = child.lock().ok().and_then(|mut c| c.take()) else {
        return;
    };
    match child.start_kill() {
        Ok(()) => debug!(pid = ?child.id(), "Adapter process killed"),
        // Already exited
        Err(e) => trace!("Failed to kill adapter process: {}", e),
    }
}

fn drain_stderr(stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "dapline_dap::adapter_stderr", "{}", line);
        }
    });
}

/// Connect to an adapter listening on TCP
pub(super) async fn connect_tcp(host: &str, port: u16, config: &SessionConfig) -> Result<Transport> {
    // "localhost" may resolve to ::1 first while adapters usually bind IPv4
    let host = if host == "localhost" {
        LOCALHOST_IPV4
    } else {
        host
    };
    let address = format!("{}:{}", host, port);
    info!("Connecting to DAP server at {}...", address);

    let stream = connect_with_retry(&address, config).await?;
    configure_tcp_keepalive(&stream);
    info!("Connected to DAP server at {}", address);

    // Keep a second handle to the socket so cleanup can shut it down
    // while the reader half is still parked in a read
    let std_stream = stream.into_std()?;
    let shutdown_handle = std_stream.try_clone()?;
    let stream = TcpStream::from_std(std_stream)?;

    let (reader, writer) = stream.into_split();
    Ok(Transport::from_streams(reader, writer).with_cleanup(move || {
        if let Err(e) = shutdown_handle.shutdown(Shutdown::Both) {
            trace!("Socket shutdown failed: {}", e);
        }
    }))
}

/// Connect with exponential backoff and jitter
///
/// Fails fast when the port keeps refusing connections: nothing is
/// listening, so waiting for the full timeout would only delay the error.
async fn connect_with_retry(address: &str, config: &SessionConfig) -> Result<TcpStream> {
    use rand::Rng;

    let start = std::time::Instant::now();
    let timeout = config.connection_timeout();

    let mut retry_interval_ms = config.retry_interval_ms;
    let mut attempt = 0u32;
    let mut connection_refused_count = 0u32;

    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                attempt += 1;

                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    connection_refused_count += 1;
                    if connection_refused_count >= config.max_connection_refused_attempts {
                        return Err(Error::Communication(format!(
                            "No debug adapter listening on {} (connection refused {} times)",
                            address, connection_refused_count
                        )));
                    }
                } else {
                    connection_refused_count = 0;
                }

                if start.elapsed() > timeout {
                    return Err(Error::Communication(format!(
                        "Timeout connecting to debug adapter at {} after {} attempts: {}",
                        address, attempt, e
                    )));
                }

                let max_jitter = (retry_interval_ms as f64 * config.jitter_ratio) as u64;
                let jitter_ms = if max_jitter > 0 {
                    rand::rng().random_range(0..=max_jitter)
                } else {
                    0
                };
                let wait_ms = retry_interval_ms.saturating_add(jitter_ms);

                trace!(
                    "Connection attempt {} failed, retrying in {}ms (backoff: {}ms + jitter: {}ms)",
                    attempt,
                    wait_ms,
                    retry_interval_ms,
                    jitter_ms
                );

                tokio::time::sleep(Duration::from_millis(wait_ms)).await;

                retry_interval_ms = ((retry_interval_ms as f64 * config.backoff_multiplier) as u64)
                    .min(config.max_retry_interval_ms);
            }
        }
    }
}

fn configure_tcp_keepalive(stream: &TcpStream) {
    let socket = SockRef::from(stream);

    // Small request/response messages; Nagle only adds latency
    if let Err(e) = socket.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_TIME_SECS))
        .with_interval(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_INTERVAL_SECS));

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let keepalive = keepalive.with_retries(DEFAULT_TCP_KEEPALIVE_RETRIES);

    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keep-alive: {}", e);
    } else {
        debug!("TCP keep-alive configured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_adapter_command_builder() {
        let cmd = AdapterCommand::new("python")
            .args(["-m", "debugpy.adapter"])
            .arg("--log-stderr")
            .cwd("/work")
            .env("PYTHONUNBUFFERED", "1");
        assert_eq!(cmd.args, vec!["-m", "debugpy.adapter", "--log-stderr"]);
        assert_eq!(cmd.cwd.as_deref(), Some("/work"));
        assert_eq!(cmd.env["PYTHONUNBUFFERED"], "1");
    }

    #[tokio::test]
    async fn test_connect_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let transport = connect_tcp("localhost", port, &SessionConfig::default())
            .await
            .unwrap();
        let (mut reader, mut writer, cleanup) = transport.into_parts();
        writer.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        assert!(cleanup.is_some());
    }

    #[tokio::test]
    async fn test_connect_refused_fails_fast() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = SessionConfig {
            retry_interval_ms: 10,
            max_connection_refused_attempts: 2,
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let result = connect_tcp("127.0.0.1", port, &config).await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("connection refused"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let result = spawn(&AdapterCommand::new("dapline-no-such-adapter-binary"));
        let err = result.err().unwrap();
        assert!(matches!(err, Error::Communication(_)));
    }
}
