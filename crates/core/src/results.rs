//! Result types for project operations
//!
//! This module contains the structured results handed back to the CLI layer,
//! which owns all formatting of them.

use std::fmt;

use serde::Serialize;

use crate::types::{PinionError, PinionResult};

/// Integrity state of one declared tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Missing,
    Mismatch,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToolStatus::Ok => "ok",
            ToolStatus::Missing => "missing",
            ToolStatus::Mismatch => "mismatch",
        };
        f.write_str(label)
    }
}

/// One row of a tool check. `want` is the locked SHA-256, `have` the one
/// computed from disk; either is empty when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatusRow {
    pub name: String,
    pub bin: String,
    pub want: String,
    pub have: String,
    pub status: ToolStatus,
}

/// Outcome of reconciling the tool directory against the lockfile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub rows: Vec<ToolStatusRow>,
    pub missing: usize,
    pub mismatched: usize,
    /// Binaries in the tool directory that no requirement declares
    pub extra_binaries: Vec<String>,
}

impl CheckReport {
    pub fn is_ready(&self) -> bool {
        self.missing == 0 && self.mismatched == 0
    }

    /// The gate used before running any task
    pub fn ensure_ready(&self) -> PinionResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PinionError::ToolsNotReady {
                missing: self.missing,
                mismatched: self.mismatched,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Installed,
    Unchanged,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Installed => f.write_str("installed"),
            SyncAction::Unchanged => f.write_str("unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRow {
    pub name: String,
    pub bin: String,
    pub resolved: String,
    pub action: SyncAction,
}

/// Result of a successful sync; the lockfile has already been written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub rows: Vec<SyncRow>,
    /// Detected toolchain version, when the manifest pins one
    pub toolchain: Option<String>,
    pub extra_binaries: Vec<String>,
}

/// Summary of a declared task for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub name: String,
    pub command: String,
    pub depends_on: Vec<String>,
    pub watch: Vec<String>,
}
