//! Tool version resolution
//!
//! Turns the declared `[tools]` pins into [`LockedTool`] entries by asking
//! the toolchain for each module's concrete version and content sum.

use std::path::Path;
use std::sync::Arc;

use crate::configs::ToolRequirements;
use crate::env::Environment;
use crate::lockfile::{LockedTool, TOOL_KIND};
use crate::tools::identity::resolve_identity;
use crate::tools::pool::{run_bounded, PoolConfig};
use crate::tools::toolchain::Toolchain;
use crate::tools::TOOLCHAIN_NAME;
use crate::types::{PinionError, PinionResult};

pub const LATEST: &str = "latest";

/// Canonical form of a declared version: bare semver gains a `v` prefix,
/// `latest` and already-prefixed versions are unchanged.
pub fn normalize_version(version: &str) -> String {
    let version = version.trim();
    if version == LATEST {
        return LATEST.to_string();
    }
    if version.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("v{}", version);
    }
    version.to_string()
}

/// Requirements that are lock-managed tools (the toolchain is excluded)
pub fn managed_tools(requirements: &ToolRequirements) -> impl Iterator<Item = (&String, &String)> {
    requirements
        .iter()
        .filter(|(name, _)| name.as_str() != TOOLCHAIN_NAME)
}

/// Resolve every managed requirement. Output is in declared-name order; any
/// single failure fails the whole batch.
pub async fn resolve_locked_tools(
    requirements: &ToolRequirements,
    work_dir: &Path,
    env: &Environment,
    toolchain: Arc<dyn Toolchain>,
    pool: &PoolConfig,
) -> PinionResult<Vec<LockedTool>> {
    let mut jobs = Vec::new();
    for (name, declared) in managed_tools(requirements) {
        let identity = resolve_identity(name);
        let version = normalize_version(declared);
        if version.is_empty() {
            return Err(PinionError::Resolution {
                module: identity.module,
                version: declared.clone(),
                message: format!(
                    "tool '{}' has an empty version; pin a version or use \"{}\"",
                    name, LATEST
                ),
            });
        }
        jobs.push((name.clone(), version));
    }

    let workers = pool.workers_for(jobs.len());
    tracing::info!(tools = jobs.len(), workers, "resolving tool versions");

    let work_dir = work_dir.to_path_buf();
    let env = env.clone();
    run_bounded(jobs, workers, move |(name, version)| {
        let toolchain = Arc::clone(&toolchain);
        let work_dir = work_dir.clone();
        let env = env.clone();
        async move { resolve_one(&name, &version, &work_dir, &env, toolchain.as_ref()).await }
    })
    .await
}

async fn resolve_one(
    name: &str,
    version: &str,
    work_dir: &Path,
    env: &Environment,
    toolchain: &dyn Toolchain,
) -> PinionResult<LockedTool> {
    let identity = resolve_identity(name);
    let resolution_error = |message: String| PinionError::Resolution {
        module: identity.module.clone(),
        version: version.to_string(),
        message,
    };

    let info = toolchain
        .query_module(&identity.module, version, work_dir, env)
        .await
        .map_err(|e| resolution_error(e.to_string()))?;
    if info.version.trim().is_empty() {
        return Err(resolution_error("toolchain returned an empty version".to_string()));
    }

    tracing::debug!(tool = name, requested = version, resolved = %info.version, "resolved tool");

    Ok(LockedTool {
        kind: TOOL_KIND.to_string(),
        requested: format!("{}@{}", name, version),
        resolved: format!("{}@{}", identity.module, info.version),
        module: Some(identity.module.clone()),
        url: None,
        bin: Some(identity.binary_name.clone()),
        sum: info.sum,
        sha256: None,
    })
}
