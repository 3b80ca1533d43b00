//! Pinion Core Library
//!
//! This is the core library for the pinion task runner. It provides all the
//! business logic for pinned tool integrity, task ordering and execution, and
//! the supervised `dev` loop.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`project`] - High-level project interface
//! - [`configs`] - `pinion.toml` parsing into typed tasks and tool pins
//! - [`lockfile`] - Lockfile model, validation and deterministic serialization
//! - [`tools`] - Tool identity, version resolution, sync and reconciliation
//! - [`graph`] - Task dependency graph and ordering
//! - [`execution`] - Command construction and sequential task execution
//! - [`dev`] - Watcher supervision for the `dev` task
//! - [`env`] - Subprocess environment construction
//! - [`results`] - Result types handed to the CLI
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! The primary entry point is [`Project`]:
//!
//! ```rust,no_run
//! use pinion_core::{Project, ProjectConfig};
//!
//! # fn example() -> pinion_core::PinionResult<()> {
//! let project = Project::load(&ProjectConfig {
//!     manifest_path: None,
//!     start_dir: std::env::current_dir()?,
//! })?;
//!
//! let order = project.task_order("build")?;
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod dev;
pub mod env;
pub mod execution;
pub mod graph;
pub mod lockfile;
pub mod project;
pub mod results;
pub mod tools;
pub mod types;

// Re-export the main types for easier usage
pub use project::{Project, ProjectConfig};
pub use types::{PinionError, PinionResult};
