//! Integrity reconciliation
//!
//! Cross-checks the lockfile against the declared requirements, then
//! classifies each installed binary as ok, missing or mismatched. Nothing in
//! here writes to disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::configs::ToolRequirements;
use crate::env::Environment;
use crate::lockfile::{LockedTool, Lockfile};
use crate::results::{CheckReport, ToolStatus, ToolStatusRow};
use crate::tools::identity::resolve_identity;
use crate::tools::toolchain::Toolchain;
use crate::tools::version::{managed_tools, normalize_version};
use crate::tools::{binary_path, is_executable, sha256_file, tool_dir, EXE_SUFFIX, TOOLCHAIN_NAME};
use crate::types::{PinionError, PinionResult};

/// Binary name a requirement produces, preferring the one recorded in the
/// lockfile
fn expected_bin(name: &str, locked: Option<&LockedTool>) -> String {
    locked
        .and_then(|tool| tool.bin.clone())
        .unwrap_or_else(|| resolve_identity(name).binary_name)
}

/// Fail unless the lockfile records exactly what the manifest declares
pub fn verify_lockfile_matches(
    requirements: &ToolRequirements,
    lockfile: &Lockfile,
) -> PinionResult<()> {
    let mut locked: BTreeMap<&str, &LockedTool> = BTreeMap::new();
    for tool in &lockfile.tools {
        let name = tool.name().ok_or_else(|| {
            PinionError::Consistency(format!(
                "locked tool '{}' is not of the form name@version",
                tool.requested
            ))
        })?;
        if locked.insert(name, tool).is_some() {
            return Err(PinionError::Consistency(format!(
                "tool '{}' is locked more than once",
                name
            )));
        }
    }

    for (name, declared) in managed_tools(requirements) {
        let tool = locked.get(name.as_str()).ok_or_else(|| {
            PinionError::Consistency(format!("tool '{}' is declared but not locked", name))
        })?;

        let want = normalize_version(declared);
        let have = tool.requested_version().unwrap_or_default();
        if want != have {
            return Err(PinionError::Consistency(format!(
                "tool '{}' is declared at {} but locked at {}",
                name, want, have
            )));
        }

        let identity = resolve_identity(name);
        if tool.module.as_deref() != Some(identity.module.as_str()) {
            return Err(PinionError::Consistency(format!(
                "tool '{}' should come from module {} but is locked to {}",
                name,
                identity.module,
                tool.module.as_deref().unwrap_or("<none>")
            )));
        }

        if let Some(bin) = &tool.bin {
            if *bin != identity.binary_name {
                return Err(PinionError::Consistency(format!(
                    "tool '{}' should produce binary '{}' but is locked as '{}'",
                    name, identity.binary_name, bin
                )));
            }
        }
    }

    for name in locked.keys() {
        let declared = *name != TOOLCHAIN_NAME && requirements.contains_key(*name);
        if !declared {
            return Err(PinionError::Consistency(format!(
                "tool '{}' is locked but not declared",
                name
            )));
        }
    }

    match (requirements.get(TOOLCHAIN_NAME), lockfile.toolchain()) {
        (Some(declared), Some(locked)) => {
            if declared.trim() != locked.requested {
                return Err(PinionError::Consistency(format!(
                    "toolchain '{}' is declared at {} but locked at {}",
                    TOOLCHAIN_NAME,
                    declared.trim(),
                    locked.requested
                )));
            }
        }
        (Some(_), None) => {
            return Err(PinionError::Consistency(format!(
                "toolchain '{}' is declared but not locked",
                TOOLCHAIN_NAME
            )))
        }
        (None, Some(_)) => {
            return Err(PinionError::Consistency(
                "lockfile pins a toolchain the manifest does not declare".to_string(),
            ))
        }
        (None, None) => {}
    }

    Ok(())
}

/// Reconcile the project tool directory against the lockfile.
///
/// The lockfile must match the requirements first; a mismatch there is an
/// error rather than a status row.
pub fn check_installed_tools(
    requirements: &ToolRequirements,
    lockfile: &Lockfile,
    project_root: &Path,
) -> PinionResult<CheckReport> {
    verify_lockfile_matches(requirements, lockfile)?;

    let dir = tool_dir(project_root);
    let mut report = CheckReport::default();
    let mut declared_bins = BTreeSet::new();

    for (name, _) in managed_tools(requirements) {
        let locked = lockfile.tool(name);
        let bin = expected_bin(name, locked);
        declared_bins.insert(bin.clone());

        let want = locked
            .and_then(|tool| tool.sha256.clone())
            .unwrap_or_default();
        let path = binary_path(&dir, &bin);

        let (have, status) = if !is_executable(&path) {
            (String::new(), ToolStatus::Missing)
        } else {
            let have = sha256_file(&path)?;
            // No recorded digest counts as a mismatch, never as ok
            let status = if !want.is_empty() && want == have {
                ToolStatus::Ok
            } else {
                ToolStatus::Mismatch
            };
            (have, status)
        };

        match status {
            ToolStatus::Missing => report.missing += 1,
            ToolStatus::Mismatch => report.mismatched += 1,
            ToolStatus::Ok => {}
        }

        tracing::debug!(tool = %name, path = %path.display(), %status, "checked tool");
        report.rows.push(ToolStatusRow {
            name: name.clone(),
            bin,
            want,
            have,
            status,
        });
    }

    report.extra_binaries = extra_binaries(&dir, &declared_bins)?;
    Ok(report)
}

/// Files in the tool directory that no requirement accounts for, sorted
pub(crate) fn extra_binaries(dir: &Path, declared_bins: &BTreeSet<String>) -> PinionResult<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut extras = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let stem = if EXE_SUFFIX.is_empty() {
            file_name.as_str()
        } else {
            file_name.strip_suffix(EXE_SUFFIX).unwrap_or(&file_name)
        };
        if !declared_bins.contains(stem) {
            extras.push(file_name.clone());
        }
    }
    extras.sort();
    Ok(extras)
}

/// Whether a detected toolchain version satisfies a declared one:
/// `go1.22.3` satisfies `1.22`, `1.22.3`, `go1.22` and `latest`.
pub fn toolchain_satisfies(requested: &str, detected: &str) -> bool {
    let requested = requested.trim();
    if requested == crate::tools::version::LATEST {
        return true;
    }
    let requested = requested
        .trim_start_matches("go")
        .trim_start_matches('v');
    let detected = detected.trim().trim_start_matches("go");
    detected == requested || detected.starts_with(&format!("{}.", requested))
}

/// Compare the ambient toolchain against the version frozen in the lockfile.
///
/// This is drift detection against the detected value, not the requested
/// one: an open requirement still fails if the toolchain changed since sync.
pub async fn verify_toolchain(
    requirements: &ToolRequirements,
    lockfile: &Lockfile,
    toolchain: &dyn Toolchain,
    work_dir: &Path,
    env: &Environment,
) -> PinionResult<()> {
    if !requirements.contains_key(TOOLCHAIN_NAME) {
        return Ok(());
    }
    let locked = lockfile.toolchain().ok_or_else(|| {
        PinionError::Consistency(format!(
            "toolchain '{}' is declared but not locked",
            TOOLCHAIN_NAME
        ))
    })?;

    let detected = toolchain.detect_version(work_dir, env).await?;
    if detected != locked.detected {
        return Err(PinionError::Toolchain(format!(
            "ambient {} is {} but the lockfile was synced with {} (run `pinion sync`)",
            TOOLCHAIN_NAME, detected, locked.detected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::{LockedToolchain, ToolchainLocks, TOOLCHAIN_KIND, TOOL_KIND};
    use crate::tools::version::testing::StubToolchain;

    fn requirements(pairs: &[(&str, &str)]) -> ToolRequirements {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn locked(name: &str, version: &str, sha256: Option<String>) -> LockedTool {
        let identity = resolve_identity(name);
        LockedTool {
            kind: TOOL_KIND.to_string(),
            requested: format!("{}@{}", name, version),
            resolved: format!("{}@v1.0.0", identity.module),
            module: Some(identity.module),
            url: None,
            bin: Some(identity.binary_name),
            sum: None,
            sha256,
        }
    }

    fn write_binary(root: &Path, bin: &str, contents: &str) -> String {
        let dir = tool_dir(root);
        std::fs::create_dir_all(&dir).unwrap();
        let path = binary_path(&dir, bin);
        std::fs::write(&path, contents).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        sha256_file(&path).unwrap()
    }

    #[test]
    fn test_classification() {
        let root = tempfile::tempdir().unwrap();
        let ok_sum = write_binary(root.path(), "gofumpt", "gofumpt v0.6.0");
        write_binary(root.path(), "staticcheck", "tampered");
        write_binary(root.path(), "stray-tool", "left over");

        let reqs = requirements(&[
            ("gofumpt", "v0.6.0"),
            ("staticcheck", "latest"),
            ("goimports", "latest"),
        ]);
        let mut lockfile = Lockfile::new();
        lockfile.tools = vec![
            locked("gofumpt", "v0.6.0", Some(ok_sum.clone())),
            locked("staticcheck", "latest", Some("0".repeat(64))),
            locked("goimports", "latest", Some("1".repeat(64))),
        ];

        let report = check_installed_tools(&reqs, &lockfile, root.path()).unwrap();

        let status: Vec<(&str, ToolStatus)> = report
            .rows
            .iter()
            .map(|row| (row.name.as_str(), row.status))
            .collect();
        assert_eq!(
            status,
            vec![
                ("gofumpt", ToolStatus::Ok),
                ("goimports", ToolStatus::Missing),
                ("staticcheck", ToolStatus::Mismatch),
            ]
        );
        assert_eq!(report.missing, 1);
        assert_eq!(report.mismatched, 1);
        assert_eq!(report.rows[0].have, ok_sum);
        assert_eq!(
            report.extra_binaries,
            vec![format!("stray-tool{}", EXE_SUFFIX)]
        );
        assert!(report.rows.iter().all(|row| row.name != "stray-tool"));
        assert!(report.ensure_ready().is_err());
    }

    #[test]
    fn test_missing_recorded_sum_is_mismatch() {
        let root = tempfile::tempdir().unwrap();
        write_binary(root.path(), "gofumpt", "gofumpt");

        let reqs = requirements(&[("gofumpt", "latest")]);
        let mut lockfile = Lockfile::new();
        lockfile.tools = vec![locked("gofumpt", "latest", None)];

        let report = check_installed_tools(&reqs, &lockfile, root.path()).unwrap();
        assert_eq!(report.rows[0].status, ToolStatus::Mismatch);
        assert_eq!(report.mismatched, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_is_missing() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let sum = write_binary(root.path(), "gofumpt", "gofumpt");
        let path = binary_path(&tool_dir(root.path()), "gofumpt");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let reqs = requirements(&[("gofumpt", "latest")]);
        let mut lockfile = Lockfile::new();
        lockfile.tools = vec![locked("gofumpt", "latest", Some(sum))];

        let report = check_installed_tools(&reqs, &lockfile, root.path()).unwrap();
        assert_eq!(report.rows[0].status, ToolStatus::Missing);
    }

    #[test]
    fn test_missing_tool_dir_reports_all_missing() {
        let root = tempfile::tempdir().unwrap();
        let reqs = requirements(&[("gofumpt", "latest")]);
        let mut lockfile = Lockfile::new();
        lockfile.tools = vec![locked("gofumpt", "latest", Some("a".repeat(64)))];

        let report = check_installed_tools(&reqs, &lockfile, root.path()).unwrap();
        assert_eq!(report.missing, 1);
        assert!(report.extra_binaries.is_empty());
    }

    #[test]
    fn test_consistency_errors() {
        let reqs = requirements(&[("gofumpt", "v0.6.0")]);

        let mut lockfile = Lockfile::new();
        assert!(verify_lockfile_matches(&reqs, &lockfile)
            .unwrap_err()
            .to_string()
            .contains("declared but not locked"));

        lockfile.tools = vec![locked("gofumpt", "v0.5.0", None)];
        assert!(verify_lockfile_matches(&reqs, &lockfile)
            .unwrap_err()
            .to_string()
            .contains("declared at v0.6.0 but locked at v0.5.0"));

        lockfile.tools = vec![
            locked("gofumpt", "v0.6.0", None),
            locked("staticcheck", "latest", None),
        ];
        assert!(verify_lockfile_matches(&reqs, &lockfile)
            .unwrap_err()
            .to_string()
            .contains("locked but not declared"));

        lockfile.tools = vec![locked("gofumpt", "v0.6.0", None), locked("gofumpt", "v0.6.0", None)];
        assert!(verify_lockfile_matches(&reqs, &lockfile)
            .unwrap_err()
            .to_string()
            .contains("more than once"));

        let mut wrong_module = locked("gofumpt", "v0.6.0", None);
        wrong_module.module = Some("example.com/fork/gofumpt".to_string());
        lockfile.tools = vec![wrong_module];
        assert!(verify_lockfile_matches(&reqs, &lockfile).is_err());
    }

    #[test]
    fn test_bare_semver_matches_prefixed_lock() {
        let reqs = requirements(&[("gofumpt", "0.6.0")]);
        let mut lockfile = Lockfile::new();
        lockfile.tools = vec![locked("gofumpt", "v0.6.0", None)];
        assert!(verify_lockfile_matches(&reqs, &lockfile).is_ok());
    }

    #[test]
    fn test_toolchain_entry_requires_declaration() {
        let mut lockfile = Lockfile::new();
        lockfile.toolchain = Some(ToolchainLocks {
            go: LockedToolchain {
                kind: TOOLCHAIN_KIND.to_string(),
                requested: "1.22".to_string(),
                detected: "go1.22.3".to_string(),
            },
        });

        let err = verify_lockfile_matches(&ToolRequirements::new(), &lockfile).unwrap_err();
        assert!(err.to_string().contains("does not declare"));

        let reqs = requirements(&[("go", "1.22")]);
        assert!(verify_lockfile_matches(&reqs, &lockfile).is_ok());
        assert!(verify_lockfile_matches(&reqs, &Lockfile::new()).is_err());
    }

    #[test]
    fn test_toolchain_satisfies() {
        assert!(toolchain_satisfies("1.22", "go1.22.3"));
        assert!(toolchain_satisfies("1.22.3", "go1.22.3"));
        assert!(toolchain_satisfies("go1.22", "go1.22.3"));
        assert!(toolchain_satisfies("latest", "go1.21.0"));
        assert!(!toolchain_satisfies("1.21", "go1.22.3"));
        assert!(!toolchain_satisfies("1.2", "go1.22.3"));
    }

    #[tokio::test]
    async fn test_verify_toolchain_detects_drift() {
        let reqs = requirements(&[("go", "latest")]);
        let mut lockfile = Lockfile::new();
        lockfile.toolchain = Some(ToolchainLocks {
            go: LockedToolchain {
                kind: TOOLCHAIN_KIND.to_string(),
                requested: "latest".to_string(),
                detected: "go1.21.0".to_string(),
            },
        });
        let toolchain = StubToolchain::new(&[]);
        let env = Environment::new();

        let err = verify_toolchain(&reqs, &lockfile, &toolchain, Path::new("."), &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("go1.22.3"));

        if let Some(locks) = lockfile.toolchain.as_mut() {
            locks.go.detected = "go1.22.3".to_string();
        }
        verify_toolchain(&reqs, &lockfile, &toolchain, Path::new("."), &env)
            .await
            .unwrap();
    }
}
