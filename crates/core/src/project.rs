//! High-level project interface
//!
//! This module provides the [`Project`] which serves as the primary interface
//! for all pinion operations. It owns the loaded manifest and knows where the
//! lockfile and the tool directory live.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pinion_core::project::{Project, ProjectConfig};
//! use pinion_core::tools::GoToolchain;
//!
//! # async fn example() -> pinion_core::types::PinionResult<()> {
//! let project = Project::load(&ProjectConfig {
//!     manifest_path: None,
//!     start_dir: std::env::current_dir()?,
//! })?;
//!
//! // Verify installed tools
//! let report = project.check()?;
//!
//! // Run a task
//! project.run_task("test", &[], &GoToolchain::new(), |_| {}).await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::configs::{find_manifest, load_manifest, Manifest};
use crate::dev::{run_dev, SupervisorConfig};
use crate::env::{ambient_environment, task_environment, Environment};
use crate::execution::{PreparedCommand, TaskRunner};
use crate::graph::TaskGraph;
use crate::lockfile::{read_lockfile, Lockfile, LOCKFILE_NAME};
use crate::results::{CheckReport, SyncReport, TaskInfo};
use crate::tools::pool::PoolConfig;
use crate::tools::sync::sync_tools;
use crate::tools::{check_installed_tools, tool_dir, Toolchain};
use crate::types::{PinionError, PinionResult};

/// Where to find the manifest
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Explicit manifest path; when `None`, search upward from `start_dir`
    pub manifest_path: Option<PathBuf>,
    pub start_dir: PathBuf,
}

/// A loaded project
pub struct Project {
    pub manifest: Manifest,
    pub lockfile_path: PathBuf,
    pub tool_dir: PathBuf,
    ambient: Environment,
}

impl Project {
    pub fn load(config: &ProjectConfig) -> PinionResult<Self> {
        let path = match &config.manifest_path {
            Some(path) => path.clone(),
            None => find_manifest(&config.start_dir)?,
        };
        Ok(Self::from_manifest(load_manifest(&path)?))
    }

    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            lockfile_path: manifest.dir.join(LOCKFILE_NAME),
            tool_dir: tool_dir(&manifest.dir),
            manifest,
            ambient: ambient_environment(),
        }
    }

    /// Replace the captured process environment
    pub fn with_environment(mut self, ambient: Environment) -> Self {
        self.ambient = ambient;
        self
    }

    /// The lockfile on disk; a missing file means the project was never synced
    pub fn read_lockfile(&self) -> PinionResult<Lockfile> {
        if !self.lockfile_path.exists() {
            return Err(PinionError::Consistency(format!(
                "{} not found",
                self.lockfile_path.display()
            )));
        }
        read_lockfile(&self.lockfile_path)
    }

    /// Reconcile the tool directory against the lockfile
    pub fn check(&self) -> PinionResult<CheckReport> {
        let lockfile = self.read_lockfile()?;
        check_installed_tools(&self.manifest.tools, &lockfile, &self.manifest.dir)
    }

    /// Resolve, install and lock every declared tool
    pub async fn sync(
        &self,
        toolchain: Arc<dyn Toolchain>,
        pool: &PoolConfig,
    ) -> PinionResult<SyncReport> {
        let previous = if self.lockfile_path.exists() {
            match read_lockfile(&self.lockfile_path) {
                Ok(lockfile) => Some(lockfile),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable lockfile, reinstalling all tools");
                    None
                }
            }
        } else {
            None
        };

        let env = task_environment(&self.ambient, &self.tool_dir, &Default::default())?;
        sync_tools(
            &self.manifest,
            previous.as_ref(),
            &self.lockfile_path,
            toolchain,
            &env,
            pool,
        )
        .await
    }

    pub fn task_graph(&self) -> TaskGraph {
        TaskGraph::build(&self.manifest.tasks)
    }

    pub fn task_order(&self, name: &str) -> PinionResult<Vec<String>> {
        self.task_graph().resolve_order(name)
    }

    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.manifest
            .tasks
            .values()
            .map(|task| TaskInfo {
                name: task.name.clone(),
                command: task.command.clone(),
                depends_on: task.depends_on.clone(),
                watch: task.watch.clone(),
            })
            .collect()
    }

    /// Run `name` and its dependencies. `on_start` sees each task before it
    /// is spawned.
    pub async fn run_task(
        &self,
        name: &str,
        passthrough: &[String],
        toolchain: &dyn Toolchain,
        on_start: impl Fn(&PreparedCommand) + Send + Sync + 'static,
    ) -> PinionResult<()> {
        let lockfile = self.read_lockfile()?;
        let runner = TaskRunner::new(&self.manifest, &lockfile, self.ambient.clone())
            .on_task_start(on_start);
        runner.run_task(name, passthrough, toolchain).await
    }

    /// Run the `dev` task under the watcher until stopped
    pub async fn dev(
        &self,
        passthrough: &[String],
        toolchain: &dyn Toolchain,
        config: &SupervisorConfig,
        on_start: impl Fn(&PreparedCommand) + Send + Sync + 'static,
    ) -> PinionResult<()> {
        let lockfile = self.read_lockfile()?;
        let runner = TaskRunner::new(&self.manifest, &lockfile, self.ambient.clone())
            .on_task_start(on_start);
        run_dev(&runner, passthrough, toolchain, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::manifest::MANIFEST_NAME;

    const MANIFEST: &str = r#"
[tasks.generate]
command = "go generate ./..."

[tasks.build]
command = "go build ./..."
depends_on = ["generate"]

[tasks.test]
command = "go test ./..."
depends_on = ["build"]
"#;

    fn project(content: &str) -> (tempfile::TempDir, Project) {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(MANIFEST_NAME), content).unwrap();
        std::fs::create_dir(root.path().join("pkg")).unwrap();
        let project = Project::load(&ProjectConfig {
            manifest_path: None,
            start_dir: root.path().join("pkg"),
        })
        .unwrap();
        (root, project)
    }

    #[test]
    fn test_load_walks_up_to_manifest() {
        let (root, project) = project(MANIFEST);
        assert_eq!(project.manifest.dir, std::path::absolute(root.path()).unwrap());
        assert_eq!(project.lockfile_path, project.manifest.dir.join(LOCKFILE_NAME));
        assert_eq!(project.tool_dir, project.manifest.dir.join(".pinion/bin"));
    }

    #[test]
    fn test_missing_lockfile_is_consistency_error() {
        let (_root, project) = project(MANIFEST);
        let err = project.check().unwrap_err();
        assert!(matches!(err, PinionError::Consistency(_)));
        assert!(err.to_string().contains("pinion sync"));
    }

    #[test]
    fn test_task_queries() {
        let (_root, project) = project(MANIFEST);
        assert_eq!(project.task_order("test").unwrap(), vec!["generate", "build", "test"]);

        let names: Vec<String> = project.list_tasks().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["build", "generate", "test"]);
        assert_eq!(project.task_graph().dependencies("build"), vec!["generate"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sync_then_check_is_ready() {
        use crate::tools::version::testing::StubToolchain;

        let (_root, project) = project("[tools]\ngofumpt = \"0.6.0\"\n");
        let toolchain = Arc::new(StubToolchain::new(&[("mvdan.cc/gofumpt", "v0.6.0")]));

        let report = project.sync(toolchain, &PoolConfig::default()).await.unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].resolved, "mvdan.cc/gofumpt@v0.6.0");

        let check = project.check().unwrap();
        assert!(check.is_ready());
        assert!(check.extra_binaries.is_empty());
    }
}
