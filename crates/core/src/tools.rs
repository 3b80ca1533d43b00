//! Pinned tool management
//!
//! Tools are Go module binaries pinned in `[tools]`, resolved into the
//! lockfile by [`version`], installed by [`sync`] into the project-local tool
//! directory and verified by [`reconcile`] before anything runs.

pub mod identity;
pub mod pool;
pub mod reconcile;
pub mod sync;
pub mod toolchain;
pub mod version;

use std::fs::File;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::PinionResult;

pub use identity::{resolve_identity, ToolIdentity};
pub use reconcile::{check_installed_tools, verify_lockfile_matches, verify_toolchain};
pub use toolchain::{GoToolchain, ModuleInfo, Toolchain};
pub use version::{normalize_version, resolve_locked_tools};

/// Project-local tool directory, relative to the manifest directory
pub const TOOL_DIR: &str = ".pinion/bin";

/// Reserved requirement name for the Go toolchain itself. It is never locked
/// as a tool or installed; executables named after it resolve through `PATH`.
pub const TOOLCHAIN_NAME: &str = "go";

/// Watcher binary that drives `pinion dev`
pub const WATCHER_TOOL: &str = "reflex";

pub const EXE_SUFFIX: &str = std::env::consts::EXE_SUFFIX;

pub fn tool_dir(project_root: &Path) -> PathBuf {
    project_root.join(TOOL_DIR)
}

/// Path of `bin` inside the tool directory, with the platform suffix
pub fn binary_path(tool_dir: &Path, bin: &str) -> PathBuf {
    tool_dir.join(format!("{}{}", bin, EXE_SUFFIX))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> PinionResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
