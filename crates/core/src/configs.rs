//! Manifest configuration
//!
//! `pinion.toml` is decoded into a generic TOML tree first and then projected
//! field by field into strongly typed specs, so that every unsupported key is
//! reported by name.

pub mod manifest;
pub mod tasks;

pub use manifest::{find_manifest, load_manifest, parse_manifest, Manifest, ToolRequirements};
pub use tasks::{TaskSpec, DEV_TASK};
