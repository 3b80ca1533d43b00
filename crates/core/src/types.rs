use std::path::PathBuf;

use thiserror::Error;

/// The main error type for pinion operations
#[derive(Debug, Error)]
pub enum PinionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error in {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("Failed to parse lockfile: {0}")]
    LockfileParse(#[from] toml::de::Error),

    #[error("Failed to serialize lockfile: {0}")]
    LockfileSerialize(#[from] toml::ser::Error),

    #[error("Invalid lockfile: {field}: {message}")]
    LockfileInvalid { field: String, message: String },

    #[error("Lockfile is out of date: {0} (run `pinion sync`)")]
    Consistency(String),

    #[error("Failed to resolve {module}@{version}: {message}")]
    Resolution {
        module: String,
        version: String,
        message: String,
    },

    #[error("Circular task dependency detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Task '{0}' not found")]
    UnknownTask(String),

    #[error("Task '{task}' depends on '{dependency}' which is not declared")]
    UnknownDependency { task: String, dependency: String },

    #[error("Tool '{name}' is not installed at {} (run `pinion sync`)", path.display())]
    ToolNotInstalled { name: String, path: PathBuf },

    #[error("Executable '{0}' not found")]
    ExecutableNotFound(String),

    #[error("Task '{task}' failed: {message}")]
    Task { task: String, message: String },

    #[error("Tool check failed: {missing} missing, {mismatched} mismatched (run `pinion sync`)")]
    ToolsNotReady { missing: usize, mismatched: usize },

    #[error("Toolchain error: {0}")]
    Toolchain(String),

    #[error("Dev supervisor error: {0}")]
    Supervisor(String),
}

impl PinionError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LockfileInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            task: task.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for pinion operations
pub type PinionResult<T> = Result<T, PinionError>;
