//! The external toolchain seam
//!
//! All module resolution, installation and version detection goes through
//! the [`Toolchain`] trait so it can be replaced in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::env::{search_path, Environment};
use crate::tools::TOOLCHAIN_NAME;
use crate::types::{PinionError, PinionResult};

/// Result of a module metadata query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Concrete version, e.g. `v1.59.1`
    pub version: String,
    /// Module content sum (`h1:...`), when the toolchain reports one
    pub sum: Option<String>,
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Resolve `module@version` to a concrete version and content sum
    async fn query_module(
        &self,
        module: &str,
        version: &str,
        work_dir: &Path,
        env: &Environment,
    ) -> PinionResult<ModuleInfo>;

    /// Build `target@version` and place the binary in `bin_dir`
    async fn install(
        &self,
        target: &str,
        version: &str,
        bin_dir: &Path,
        work_dir: &Path,
        env: &Environment,
    ) -> PinionResult<()>;

    /// Version string of the ambient toolchain, e.g. `go1.22.3`
    async fn detect_version(&self, work_dir: &Path, env: &Environment) -> PinionResult<String>;
}

/// [`Toolchain`] backed by the `go` command found on `PATH`
#[derive(Debug, Default, Clone)]
pub struct GoToolchain {
    program: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModDownload {
    #[serde(default)]
    version: String,
    #[serde(default)]
    sum: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GoToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit `go` binary instead of searching `PATH`
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    fn program(&self, env: &Environment) -> PinionResult<PathBuf> {
        if let Some(program) = &self.program {
            return Ok(program.clone());
        }
        search_path(TOOLCHAIN_NAME, env).ok_or_else(|| {
            PinionError::Toolchain(format!("'{}' was not found on PATH", TOOLCHAIN_NAME))
        })
    }

    async fn run(
        &self,
        args: &[&str],
        work_dir: &Path,
        env: &Environment,
    ) -> PinionResult<std::process::Output> {
        let program = self.program(env)?;
        tracing::debug!(program = %program.display(), ?args, "running toolchain command");

        let output = Command::new(&program)
            .args(args)
            .current_dir(work_dir)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                PinionError::Toolchain(format!("failed to run '{}': {}", program.display(), e))
            })?;
        Ok(output)
    }
}

#[async_trait]
impl Toolchain for GoToolchain {
    async fn query_module(
        &self,
        module: &str,
        version: &str,
        work_dir: &Path,
        env: &Environment,
    ) -> PinionResult<ModuleInfo> {
        let spec = format!("{}@{}", module, version);
        let output = self
            .run(&["mod", "download", "-json", &spec], work_dir, env)
            .await?;

        // `go mod download -json` reports failures in the JSON body as well
        let decoded: Option<ModDownload> = serde_json::from_slice(&output.stdout).ok();
        if let Some(ModDownload {
            error: Some(error), ..
        }) = &decoded
        {
            return Err(PinionError::Toolchain(error.trim().to_string()));
        }
        if !output.status.success() {
            return Err(PinionError::Toolchain(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let decoded = decoded.ok_or_else(|| {
            PinionError::Toolchain(format!("unexpected output from go mod download for {}", spec))
        })?;
        if decoded.version.is_empty() {
            return Err(PinionError::Toolchain(format!(
                "go mod download returned no version for {}",
                spec
            )));
        }

        Ok(ModuleInfo {
            version: decoded.version,
            sum: decoded.sum.filter(|sum| !sum.is_empty()),
        })
    }

    async fn install(
        &self,
        target: &str,
        version: &str,
        bin_dir: &Path,
        work_dir: &Path,
        env: &Environment,
    ) -> PinionResult<()> {
        let mut env = env.clone();
        env.insert("GOBIN".to_string(), bin_dir.display().to_string());

        let spec = format!("{}@{}", target, version);
        let output = self.run(&["install", &spec], work_dir, &env).await?;
        if !output.status.success() {
            return Err(PinionError::Toolchain(format!(
                "go install {} failed: {}",
                spec,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn detect_version(&self, work_dir: &Path, env: &Environment) -> PinionResult<String> {
        let output = self.run(&["env", "GOVERSION"], work_dir, env).await?;
        if !output.status.success() {
            return Err(PinionError::Toolchain(format!(
                "go env GOVERSION failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if version.is_empty() {
            return Err(PinionError::Toolchain(
                "go env GOVERSION printed nothing".to_string(),
            ));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mod_download() {
        let body = br#"{"Path":"mvdan.cc/gofumpt","Version":"v0.6.0","Sum":"h1:abc=","GoModSum":"h1:def="}"#;
        let decoded: ModDownload = serde_json::from_slice(body).unwrap();
        assert_eq!(decoded.version, "v0.6.0");
        assert_eq!(decoded.sum.as_deref(), Some("h1:abc="));
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_decode_mod_download_error() {
        let body = br#"{"Path":"example.com/nope","Version":"v9.9.9","Error":"unknown revision v9.9.9"}"#;
        let decoded: ModDownload = serde_json::from_slice(body).unwrap();
        assert_eq!(decoded.error.as_deref(), Some("unknown revision v9.9.9"));
    }

    #[tokio::test]
    async fn test_missing_go_binary_is_reported() {
        let toolchain = GoToolchain::new();
        let env = Environment::new();
        let err = toolchain
            .detect_version(Path::new("."), &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));
    }
}
