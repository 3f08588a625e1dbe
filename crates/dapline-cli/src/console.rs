//! Debuggee output on the terminal

use dapline_core::{OutputSink, OutputStream};
use std::io::Write;

/// Writes stdout-category output to stdout and stderr-category to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write(&self, stream: OutputStream, text: &str) {
        // A closed terminal is not worth failing the session over
        let _ = match stream {
            OutputStream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            OutputStream::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(text.as_bytes()).and_then(|_| err.flush())
            }
        };
    }
}
