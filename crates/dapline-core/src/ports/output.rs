//! Process Output Port

use crate::entities::OutputStream;
use std::sync::{Arc, Mutex};

pub type OutputSinkRef = Arc<dyn OutputSink>;

/// Accepts categorized debuggee output for rendering
pub trait OutputSink: Send + Sync {
    fn write(&self, stream: OutputStream, text: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutputSink;

impl OutputSink for NullOutputSink {
    fn write(&self, _stream: OutputStream, _text: &str) {}
}

/// Keeps every write in memory, in order
#[derive(Debug, Default)]
pub struct BufferedOutputSink {
    writes: Mutex<Vec<(OutputStream, String)>>,
}

impl BufferedOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(OutputStream, String)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Concatenated text written to one stream
    pub fn text(&self, stream: OutputStream) -> String {
        self.writes()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, text)| text)
            .collect()
    }
}

impl OutputSink for BufferedOutputSink {
    fn write(&self, stream: OutputStream, text: &str) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((stream, text.to_string()));
        }
    }
}
