//! Transport - duplex byte stream to a debug adapter
//!
//! A transport knows nothing about DAP. It is a reader, a writer and an
//! optional cleanup callback run once when the session ends.
//!
//! ```rust,ignore
//! let transport = Transport::spawn(&AdapterCommand::new("python").args(["-m", "debugpy.adapter"]))?
//!     .with_trace(Arc::new(TracingTraceSink));
//! ```

mod connect;
mod trace;

pub use connect::AdapterCommand;
pub use trace::{Direction, TeeReader, TeeWriter, TraceSink, TracingTraceSink, WriterTraceSink};

use crate::Result;
use dapline_config::SessionConfig;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Runs once at session end; failures inside are swallowed
pub type Cleanup = Box<dyn FnOnce() + Send>;

pub struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
    cleanup: Option<Cleanup>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("cleanup", &self.cleanup.is_some())
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            cleanup: None,
        }
    }

    /// Spawn an adapter process and talk to it over stdio.
    ///
    /// The cleanup kills the process.
    pub fn spawn(command: &AdapterCommand) -> Result<Self> {
        connect::spawn(command)
    }

    /// Connect to an adapter listening on `host:port`, retrying per `config`.
    ///
    /// The cleanup shuts the socket down.
    pub async fn connect_tcp(host: &str, port: u16, config: &SessionConfig) -> Result<Self> {
        connect::connect_tcp(host, port, config).await
    }

    /// Add a cleanup callback; runs after any previously attached one
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(match self.cleanup.take() {
            Some(previous) => Box::new(move || {
                previous();
                cleanup();
            }),
            None => Box::new(cleanup),
        });
        self
    }

    /// Mirror all bytes in both directions into `sink`
    pub fn with_trace(self, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            reader: Box::new(TeeReader::new(self.reader, sink.clone())),
            writer: Box::new(TeeWriter::new(self.writer, sink)),
            cleanup: self.cleanup,
        }
    }

    pub fn into_parts(self) -> (BoxedReader, BoxedWriter, Option<Cleanup>) {
        (self.reader, self.writer, self.cleanup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cleanups_run_in_attach_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (order.clone(), order.clone());
        let (client, _server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(client);

        let transport = Transport::from_streams(r, w)
            .with_cleanup(move || a.lock().unwrap().push("first"))
            .with_cleanup(move || b.lock().unwrap().push("second"));

        let (_, _, cleanup) = transport.into_parts();
        (cleanup.unwrap())();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
