//! Sync: resolve, install, then write the lockfile
//!
//! The lockfile is written once, at the very end, and only if every
//! resolution and install succeeded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configs::Manifest;
use crate::env::Environment;
use crate::lockfile::{atomic_write, LockedTool, LockedToolchain, Lockfile, ToolchainLocks, TOOLCHAIN_KIND};
use crate::results::{SyncAction, SyncReport, SyncRow};
use crate::tools::identity::resolve_identity;
use crate::tools::pool::{run_bounded, PoolConfig};
use crate::tools::reconcile::{extra_binaries, toolchain_satisfies};
use crate::tools::toolchain::Toolchain;
use crate::tools::version::resolve_locked_tools;
use crate::tools::{binary_path, is_executable, sha256_file, tool_dir, TOOLCHAIN_NAME};
use crate::types::{PinionError, PinionResult};

/// Bring the tool directory and lockfile in line with the manifest.
///
/// `previous` is the lockfile currently on disk, if any; tools whose
/// resolution and installed digest are unchanged are not reinstalled.
pub async fn sync_tools(
    manifest: &Manifest,
    previous: Option<&Lockfile>,
    lockfile_path: &Path,
    toolchain: Arc<dyn Toolchain>,
    env: &Environment,
    pool: &PoolConfig,
) -> PinionResult<SyncReport> {
    let work_dir = manifest.dir.clone();
    let bin_dir = tool_dir(&manifest.dir);

    let toolchain_lock = match manifest.tools.get(TOOLCHAIN_NAME) {
        Some(requested) => Some(lock_toolchain(requested, toolchain.as_ref(), &work_dir, env).await?),
        None => None,
    };

    let locked = resolve_locked_tools(
        &manifest.tools,
        &work_dir,
        env,
        Arc::clone(&toolchain),
        pool,
    )
    .await?;

    std::fs::create_dir_all(&bin_dir)?;

    let jobs: Vec<(LockedTool, Option<LockedTool>)> = locked
        .into_iter()
        .map(|tool| {
            let prior = previous
                .zip(tool.name())
                .and_then(|(lockfile, name)| lockfile.tool(name))
                .cloned();
            (tool, prior)
        })
        .collect();

    let workers = pool.workers_for(jobs.len());
    tracing::info!(tools = jobs.len(), workers, dir = %bin_dir.display(), "installing tools");

    let installed = {
        let bin_dir = bin_dir.clone();
        let env = env.clone();
        run_bounded(jobs, workers, move |(tool, prior)| {
            let toolchain = Arc::clone(&toolchain);
            let bin_dir = bin_dir.clone();
            let work_dir = work_dir.clone();
            let env = env.clone();
            async move {
                install_one(tool, prior, toolchain.as_ref(), &bin_dir, &work_dir, &env).await
            }
        })
        .await?
    };

    let mut lockfile = Lockfile::new();
    lockfile.toolchain = toolchain_lock.clone().map(|go| ToolchainLocks { go });

    let mut rows = Vec::with_capacity(installed.len());
    let mut declared_bins = BTreeSet::new();
    for (tool, action) in installed {
        let bin = tool.bin.clone().unwrap_or_default();
        declared_bins.insert(bin.clone());
        rows.push(SyncRow {
            name: tool.name().unwrap_or_default().to_string(),
            bin,
            resolved: tool.resolved.clone(),
            action,
        });
        lockfile.tools.push(tool);
    }
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    atomic_write(lockfile_path, &lockfile)?;
    tracing::info!(path = %lockfile_path.display(), "lockfile updated");

    Ok(SyncReport {
        rows,
        toolchain: toolchain_lock.map(|lock| lock.detected),
        extra_binaries: extra_binaries(&bin_dir, &declared_bins)?,
    })
}

async fn lock_toolchain(
    requested: &str,
    toolchain: &dyn Toolchain,
    work_dir: &Path,
    env: &Environment,
) -> PinionResult<LockedToolchain> {
    let requested = requested.trim();
    if requested.is_empty() {
        return Err(PinionError::Toolchain(format!(
            "toolchain '{}' has an empty version",
            TOOLCHAIN_NAME
        )));
    }

    let detected = toolchain.detect_version(work_dir, env).await?;
    if !toolchain_satisfies(requested, &detected) {
        return Err(PinionError::Toolchain(format!(
            "manifest requires {} {} but {} is installed",
            TOOLCHAIN_NAME, requested, detected
        )));
    }

    Ok(LockedToolchain {
        kind: TOOLCHAIN_KIND.to_string(),
        requested: requested.to_string(),
        detected,
    })
}

async fn install_one(
    mut tool: LockedTool,
    prior: Option<LockedTool>,
    toolchain: &dyn Toolchain,
    bin_dir: &Path,
    work_dir: &Path,
    env: &Environment,
) -> PinionResult<(LockedTool, SyncAction)> {
    let name = tool.name().unwrap_or_default().to_string();
    let identity = resolve_identity(&name);
    let bin = tool.bin.clone().unwrap_or_else(|| identity.binary_name.clone());
    let path: PathBuf = binary_path(bin_dir, &bin);

    if let Some(digest) = unchanged_digest(&tool, prior.as_ref(), &path)? {
        tracing::debug!(tool = %name, "binary unchanged, skipping install");
        tool.sha256 = Some(digest);
        return Ok((tool, SyncAction::Unchanged));
    }

    let version = tool
        .resolved_version()
        .ok_or_else(|| PinionError::invalid("resolved", tool.resolved.clone()))?
        .to_string();

    tracing::info!(tool = %name, target = %identity.install_target, %version, "installing");
    toolchain
        .install(&identity.install_target, &version, bin_dir, work_dir, env)
        .await?;

    if !is_executable(&path) {
        return Err(PinionError::ToolNotInstalled { name, path });
    }
    tool.sha256 = Some(sha256_file(&path)?);
    Ok((tool, SyncAction::Installed))
}

/// Digest of the installed binary when it is exactly what the previous
/// lockfile recorded for the same resolution
fn unchanged_digest(
    tool: &LockedTool,
    prior: Option<&LockedTool>,
    path: &Path,
) -> PinionResult<Option<String>> {
    let Some(prior) = prior else {
        return Ok(None);
    };
    let Some(recorded) = prior.sha256.as_deref() else {
        return Ok(None);
    };
    if prior.resolved != tool.resolved || !is_executable(path) {
        return Ok(None);
    }
    let digest = sha256_file(path)?;
    Ok((digest == recorded).then_some(digest))
}
