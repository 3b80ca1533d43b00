//! Lockfile model
//!
//! The lockfile (`pinion.lock`) binds every declared tool to the exact module
//! version it resolved to, the module content sum, and the SHA-256 of the
//! installed binary. It is rewritten wholesale by `sync` and only read
//! everywhere else.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::types::{PinionError, PinionResult};

pub const LOCKFILE_NAME: &str = "pinion.lock";

/// The only lockfile schema this version understands
pub const SCHEMA_VERSION: u32 = 0;

pub const TOOL_KIND: &str = "go-binary";
pub const TOOLCHAIN_KIND: &str = "go-toolchain";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lockfile {
    pub schema: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainLocks>,
    #[serde(default)]
    pub tools: Vec<LockedTool>,
}

/// The `[toolchain.*]` tables. Only the Go toolchain is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainLocks {
    pub go: LockedToolchain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockedToolchain {
    pub kind: String,
    pub requested: String,
    pub detected: String,
}

/// One `[[tools]]` entry. Field order here is the on-disk field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockedTool {
    pub kind: String,
    /// `name@version` as declared (version normalized)
    pub requested: String,
    /// `module@version` as resolved
    pub resolved: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Strict `name@version` split: exactly one `@`, both sides non-empty.
pub fn split_at_version(value: &str) -> Option<(&str, &str)> {
    let (name, version) = value.split_once('@')?;
    if name.is_empty() || version.is_empty() || version.contains('@') {
        return None;
    }
    Some((name, version))
}

impl LockedTool {
    /// Declared tool name from `requested`
    pub fn name(&self) -> Option<&str> {
        split_at_version(&self.requested).map(|(name, _)| name)
    }

    pub fn requested_version(&self) -> Option<&str> {
        split_at_version(&self.requested).map(|(_, version)| version)
    }

    pub fn resolved_version(&self) -> Option<&str> {
        split_at_version(&self.resolved).map(|(_, version)| version)
    }
}

impl Lockfile {
    pub fn new() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            toolchain: None,
            tools: Vec::new(),
        }
    }

    /// Find the entry whose `requested` name is `name`
    pub fn tool(&self, name: &str) -> Option<&LockedTool> {
        self.tools.iter().find(|tool| tool.name() == Some(name))
    }

    /// Find the entry that produces the binary `bin`
    pub fn tool_by_bin(&self, bin: &str) -> Option<&LockedTool> {
        self.tools
            .iter()
            .find(|tool| tool.bin.as_deref() == Some(bin))
    }

    pub fn toolchain(&self) -> Option<&LockedToolchain> {
        self.toolchain.as_ref().map(|locks| &locks.go)
    }
}

/// Check the structural invariants of a lockfile. Nothing is corrected.
pub fn validate(lockfile: &Lockfile) -> PinionResult<()> {
    if lockfile.schema != SCHEMA_VERSION {
        return Err(PinionError::invalid(
            "schema",
            format!(
                "unsupported schema version {} (expected {})",
                lockfile.schema, SCHEMA_VERSION
            ),
        ));
    }

    if let Some(toolchain) = lockfile.toolchain() {
        if toolchain.kind != TOOLCHAIN_KIND {
            return Err(PinionError::invalid(
                "toolchain.go.kind",
                format!(
                    "unrecognized kind '{}' (expected '{}')",
                    toolchain.kind, TOOLCHAIN_KIND
                ),
            ));
        }
        if toolchain.requested.trim().is_empty() {
            return Err(PinionError::invalid("toolchain.go.requested", "must not be empty"));
        }
        if toolchain.detected.trim().is_empty() {
            return Err(PinionError::invalid("toolchain.go.detected", "must not be empty"));
        }
    }

    for (index, tool) in lockfile.tools.iter().enumerate() {
        validate_tool(index, tool)?;
    }

    Ok(())
}

fn validate_tool(index: usize, tool: &LockedTool) -> PinionResult<()> {
    let field = |name: &str| format!("tools[{}].{}", index, name);

    if tool.kind.trim().is_empty() {
        return Err(PinionError::invalid(field("kind"), "must not be empty"));
    }
    if tool.requested.trim().is_empty() {
        return Err(PinionError::invalid(field("requested"), "must not be empty"));
    }
    if split_at_version(&tool.requested).is_none() {
        return Err(PinionError::invalid(
            field("requested"),
            format!("'{}' is not of the form name@version", tool.requested),
        ));
    }
    if tool.resolved.trim().is_empty() {
        return Err(PinionError::invalid(field("resolved"), "must not be empty"));
    }
    if split_at_version(&tool.resolved).is_none() {
        return Err(PinionError::invalid(
            field("resolved"),
            format!("'{}' is not of the form module@version", tool.resolved),
        ));
    }

    let has_module = tool.module.as_deref().is_some_and(|m| !m.is_empty());
    let has_url = tool.url.as_deref().is_some_and(|u| !u.is_empty());
    match (has_module, has_url) {
        (true, true) => {
            return Err(PinionError::invalid(
                field("module"),
                "'module' and 'url' are mutually exclusive",
            ))
        }
        (false, false) => {
            return Err(PinionError::invalid(
                field("module"),
                "one of 'module' or 'url' is required",
            ))
        }
        _ => {}
    }

    if let Some(bin) = &tool.bin {
        if bin.is_empty() {
            return Err(PinionError::invalid(field("bin"), "must not be empty"));
        }
    }

    if let Some(sha256) = &tool.sha256 {
        let well_formed = sha256.len() == 64 && sha256.bytes().all(|b| b.is_ascii_hexdigit());
        if !well_formed {
            return Err(PinionError::invalid(
                field("sha256"),
                format!("'{}' is not a hex SHA-256 digest", sha256),
            ));
        }
    }

    Ok(())
}

/// Serialize deterministically: tools sorted by `requested`, fixed field
/// order, trailing newline.
pub fn marshal(lockfile: &Lockfile) -> PinionResult<String> {
    let mut sorted = lockfile.clone();
    sorted
        .tools
        .sort_by(|a, b| a.requested.cmp(&b.requested));

    let mut out = toml::to_string(&sorted)?;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Structural parse followed by [`validate`]
pub fn parse(content: &str) -> PinionResult<Lockfile> {
    let lockfile: Lockfile = toml::from_str(content)?;
    validate(&lockfile)?;
    Ok(lockfile)
}

pub fn read_lockfile(path: &Path) -> PinionResult<Lockfile> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Write the lockfile through a temp file in the destination directory and
/// rename it into place. On failure the destination is left untouched and
/// the temp file is removed.
pub fn atomic_write(path: &Path, lockfile: &Lockfile) -> PinionResult<()> {
    validate(lockfile)?;
    let content = marshal(lockfile)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| PinionError::Io(e.error))?;

    tracing::debug!(path = %path.display(), tools = lockfile.tools.len(), "wrote lockfile");
    Ok(())
}
