//! Host breakpoints as seen by the session engine
//!
//! The host may know many kinds of breakpoints; only line breakpoints tied
//! to a file on disk are ever forwarded to an adapter. Everything else is
//! carried as an opaque kind so it can be recognized and rejected.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Host-assigned breakpoint identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BreakpointId(pub u64);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bp-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointKind {
    Line(LineBreakpoint),
    Function { name: String },
    Exception { filter: String },
    Watch { expression: String },
}

/// A breakpoint on a line of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBreakpoint {
    /// On-disk location of the resource; `None` for editor-only buffers
    pub resource: Option<PathBuf>,
    /// 1-based line; `None` when the host cannot resolve it
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub enabled: bool,
    /// Whether the host's store already knows about this breakpoint
    pub registered: bool,
}

impl Breakpoint {
    /// Enabled, registered line breakpoint at `path:line`
    pub fn line(id: u64, path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            id: BreakpointId(id),
            kind: BreakpointKind::Line(LineBreakpoint {
                resource: Some(path.into()),
                line: Some(line),
            }),
            enabled: true,
            registered: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_registered(mut self, registered: bool) -> Self {
        self.registered = registered;
        self
    }

    /// Only line breakpoints on a concrete file can be installed in an adapter
    pub fn is_supported(&self) -> bool {
        matches!(
            &self.kind,
            BreakpointKind::Line(LineBreakpoint {
                resource: Some(_),
                ..
            })
        )
    }

    /// The (file, line) pair of a supported breakpoint
    pub fn line_location(&self) -> Option<(&Path, Option<u32>)> {
        match &self.kind {
            BreakpointKind::Line(LineBreakpoint {
                resource: Some(path),
                line,
            }) => Some((path.as_path(), *line)),
            _ => None,
        }
    }
}

/// Identity of a source file as told to the adapter
///
/// Keyed by value rather than by host object because the host may
/// recreate its breakpoint objects at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    /// Display name (last path segment)
    pub name: String,
    pub path: String,
}

impl SourceKey {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A `file:line` pair as typed on a command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
}

impl Location {
    /// Parse `file:line`; the last `:` separates the line so Windows
    /// drive letters survive
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidLocation(
                "Location cannot be empty".to_string(),
            ));
        }

        let (file, line) = s.rsplit_once(':').ok_or_else(|| {
            Error::InvalidLocation(format!("Expected format FILE:LINE, got '{}'", s))
        })?;

        if file.is_empty() {
            return Err(Error::InvalidLocation(
                "File path cannot be empty".to_string(),
            ));
        }

        let line = line
            .parse::<u32>()
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| Error::InvalidLocation("Line must be a positive integer".to_string()))?;

        Ok(Location {
            file: PathBuf::from(file),
            line,
        })
    }
}
