//! Task execution module
//!
//! This module turns declared tasks into processes: argv construction,
//! executable resolution and sequential execution of a dependency chain.

pub mod command;
pub mod runner;

pub use command::{tokenize, CommandExecutor, PreparedCommand};
pub use runner::TaskRunner;
