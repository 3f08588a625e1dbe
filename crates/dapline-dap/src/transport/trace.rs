//! Raw byte tracing
//!
//! [`TeeReader`] and [`TeeWriter`] mirror every byte passing through a
//! transport into a [`TraceSink`] without altering the stream.

use std::fmt;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Adapter to client
    Inbound,
    /// Client to adapter
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("<<"),
            Direction::Outbound => f.write_str(">>"),
        }
    }
}

/// Receives a copy of transport traffic
pub trait TraceSink: Send + Sync {
    fn record(&self, direction: Direction, bytes: &[u8]);
}

/// Logs traffic at trace level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTraceSink;

impl TraceSink for TracingTraceSink {
    fn record(&self, direction: Direction, bytes: &[u8]) {
        trace!(%direction, "{}", String::from_utf8_lossy(bytes));
    }
}

/// Writes traffic to any `io::Write`, one chunk per line prefixed by direction
pub struct WriterTraceSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterTraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> TraceSink for WriterTraceSink<W> {
    fn record(&self, direction: Direction, bytes: &[u8]) {
        // Trace output is diagnostic only; write failures are dropped
        if let Ok(mut w) = self.writer.lock() {
            let _ = write!(w, "{} ", direction);
            let _ = w.write_all(bytes);
            let _ = w.write_all(b"\n");
            let _ = w.flush();
        }
    }
}

pub struct TeeReader<R> {
    inner: R,
    sink: Arc<dyn TraceSink>,
}

impl<R> TeeReader<R> {
    pub fn new(inner: R, sink: Arc<dyn TraceSink>) -> Self {
        Self { inner, sink }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = &buf.filled()[before..];
            if !read.is_empty() {
                this.sink.record(Direction::Inbound, read);
            }
        }
        poll
    }
}

pub struct TeeWriter<W> {
    inner: W,
    sink: Arc<dyn TraceSink>,
}

impl<W> TeeWriter<W> {
    pub fn new(inner: W, sink: Arc<dyn TraceSink>) -> Self {
        Self { inner, sink }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TeeWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            if *n > 0 {
                this.sink.record(Direction::Outbound, &buf[..*n]);
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
