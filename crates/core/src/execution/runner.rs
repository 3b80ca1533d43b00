//! High-level task runner
//!
//! Gates on tool integrity, resolves the dependency order and runs each task
//! in it, strictly one after another.

use std::path::PathBuf;

use crate::configs::Manifest;
use crate::env::{task_environment, Environment};
use crate::execution::command::{tokenize, CommandExecutor, PreparedCommand};
use crate::graph::resolve_order;
use crate::lockfile::Lockfile;
use crate::tools::{check_installed_tools, tool_dir, verify_toolchain, Toolchain};
use crate::types::{PinionError, PinionResult};

type StartHook = Box<dyn Fn(&PreparedCommand) + Send + Sync>;

/// Runs tasks from one manifest against one lockfile snapshot
pub struct TaskRunner<'a> {
    manifest: &'a Manifest,
    lockfile: &'a Lockfile,
    tool_dir: PathBuf,
    ambient: Environment,
    on_start: Option<StartHook>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(manifest: &'a Manifest, lockfile: &'a Lockfile, ambient: Environment) -> Self {
        Self {
            manifest,
            lockfile,
            tool_dir: tool_dir(&manifest.dir),
            ambient,
            on_start: None,
        }
    }

    /// Called right before each task is spawned
    pub fn on_task_start(mut self, hook: impl Fn(&PreparedCommand) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    pub fn manifest(&self) -> &Manifest {
        self.manifest
    }

    pub fn executor(&self) -> CommandExecutor<'_> {
        CommandExecutor::new(self.lockfile, &self.tool_dir)
    }

    /// Refuse to run anything unless every tool is installed and intact and
    /// the ambient toolchain matches the one recorded at sync time
    pub async fn ensure_ready(&self, toolchain: &dyn Toolchain) -> PinionResult<()> {
        check_installed_tools(&self.manifest.tools, self.lockfile, &self.manifest.dir)?.ensure_ready()?;

        let env = task_environment(&self.ambient, &self.tool_dir, &Default::default())?;
        verify_toolchain(
            &self.manifest.tools,
            self.lockfile,
            toolchain,
            &self.manifest.dir,
            &env,
        )
        .await
    }

    /// Build argv, working directory and environment for `name`
    pub fn prepare(&self, name: &str, extra_args: &[String]) -> PinionResult<PreparedCommand> {
        let task = self
            .manifest
            .tasks
            .get(name)
            .ok_or_else(|| PinionError::UnknownTask(name.to_string()))?;

        let mut argv = tokenize(&task.command).map_err(|e| PinionError::task(name, e))?;
        if argv.is_empty() {
            return Err(PinionError::task(name, "command is empty"));
        }
        let program = argv.remove(0);

        let cwd = match &task.cwd {
            Some(cwd) => self.manifest.dir.join(cwd),
            None => self.manifest.dir.clone(),
        };
        let env = task_environment(&self.ambient, &self.tool_dir, &task.env)?;
        let program = self
            .executor()
            .resolve(&program, &cwd, &env)
            .map_err(|e| PinionError::task(name, e.to_string()))?;

        argv.extend(extra_args.iter().cloned());
        tracing::debug!(task = name, program = %program.display(), args = ?argv, "prepared task");

        Ok(PreparedCommand {
            task: name.to_string(),
            program,
            args: argv,
            cwd,
            env,
        })
    }

    /// Run `name` after its dependencies. `passthrough` goes to `name` only.
    pub async fn run_task(
        &self,
        name: &str,
        passthrough: &[String],
        toolchain: &dyn Toolchain,
    ) -> PinionResult<()> {
        self.ensure_ready(toolchain).await?;
        let order = resolve_order(&self.manifest.tasks, name)?;
        self.run_sequence(&order, name, passthrough).await
    }

    /// Run `order` in sequence, stopping at the first failure
    pub async fn run_sequence(
        &self,
        order: &[String],
        root: &str,
        passthrough: &[String],
    ) -> PinionResult<()> {
        let executor = self.executor();
        for task in order {
            let extra: &[String] = if task == root { passthrough } else { &[] };
            let prepared = self.prepare(task, extra)?;
            if let Some(hook) = &self.on_start {
                hook(&prepared);
            }
            tracing::info!(task = %task, "running task");
            executor.execute(&prepared).await?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::configs::TaskSpec;
    use crate::env::{ambient_environment, path_key};
    use crate::lockfile::{LockedTool, TOOL_KIND};
    use crate::tools::version::testing::StubToolchain;

    fn shell_task(name: &str, script: &str, deps: &[&str]) -> TaskSpec {
        let mut task = TaskSpec::new(name, format!("sh -c '{}' sh", script));
        task.depends_on = deps.iter().map(|d| d.to_string()).collect();
        task
    }

    fn chain(root: &Path) -> Manifest {
        Manifest::new(root)
            .with_task(shell_task("dep1", "echo dep1 >> log", &[]))
            .with_task(shell_task("dep2", "echo dep2 \"$@\" >> log", &["dep1"]))
            .with_task(shell_task("main", "echo main \"$@\" >> log", &["dep2"]))
    }

    #[tokio::test]
    async fn test_runs_dependencies_first_with_passthrough_on_root() {
        let root = tempfile::tempdir().unwrap();
        let manifest = chain(root.path());
        let lockfile = Lockfile::new();
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment());

        runner
            .run_task("main", &["--fast".to_string()], &StubToolchain::new(&[]))
            .await
            .unwrap();

        let log = std::fs::read_to_string(root.path().join("log")).unwrap();
        assert_eq!(log, "dep1\ndep2\nmain --fast\n");
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_chain() {
        let root = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(root.path())
            .with_task(shell_task("generate", "exit 4", &[]))
            .with_task(shell_task("build", "echo built >> log", &["generate"]));
        let lockfile = Lockfile::new();
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment());

        let err = runner
            .run_task("build", &[], &StubToolchain::new(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Task 'generate' failed: exited with code 4");
        assert!(!root.path().join("log").exists());
    }

    #[tokio::test]
    async fn test_start_hook_sees_each_task() {
        let root = tempfile::tempdir().unwrap();
        let manifest = chain(root.path());
        let lockfile = Lockfile::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment())
            .on_task_start(move |prepared| sink.lock().unwrap().push(prepared.task.clone()));

        runner.run_task("dep2", &[], &StubToolchain::new(&[])).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["dep1", "dep2"]);
    }

    #[test]
    fn test_prepare_sets_cwd_and_environment() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("backend")).unwrap();
        let mut task = TaskSpec::new("api", "sh -c 'exit 0'");
        task.cwd = Some(PathBuf::from("backend"));
        task.env.insert("GOFLAGS".to_string(), "-mod=mod".to_string());
        let manifest = Manifest::new(root.path()).with_task(task);
        let lockfile = Lockfile::new();

        let mut ambient = ambient_environment();
        ambient.insert("GOFLAGS".to_string(), "-mod=vendor".to_string());
        let runner = TaskRunner::new(&manifest, &lockfile, ambient);

        let prepared = runner.prepare("api", &[]).unwrap();
        assert_eq!(prepared.cwd, root.path().join("backend"));
        assert_eq!(prepared.args, vec!["-c", "exit 0"]);
        assert_eq!(prepared.env["GOFLAGS"], "-mod=mod");

        let path = &prepared.env[&path_key(&prepared.env)];
        let first = std::env::split_paths(path).next().unwrap();
        assert_eq!(first, tool_dir(root.path()));
    }

    #[test]
    fn test_prepare_rejects_bad_commands() {
        let root = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(root.path())
            .with_task(TaskSpec::new("quote", "echo 'unterminated"))
            .with_task(TaskSpec::new("ghost", "definitely-not-a-real-binary-xyz"));
        let lockfile = Lockfile::new();
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment());

        assert!(matches!(runner.prepare("quote", &[]), Err(PinionError::Task { .. })));
        let err = runner.prepare("ghost", &[]).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(matches!(runner.prepare("absent", &[]), Err(PinionError::UnknownTask(_))));
    }

    #[tokio::test]
    async fn test_gate_blocks_before_any_task_runs() {
        let root = tempfile::tempdir().unwrap();
        let manifest = chain(root.path()).with_tool("gofumpt", "v0.6.0");
        let mut lockfile = Lockfile::new();
        lockfile.tools.push(LockedTool {
            kind: TOOL_KIND.to_string(),
            requested: "gofumpt@v0.6.0".to_string(),
            resolved: "mvdan.cc/gofumpt@v0.6.0".to_string(),
            module: Some("mvdan.cc/gofumpt".to_string()),
            url: None,
            bin: Some("gofumpt".to_string()),
            sum: None,
            sha256: Some("0".repeat(64)),
        });
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment());

        let err = runner
            .run_task("main", &[], &StubToolchain::new(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PinionError::ToolsNotReady { missing: 1, mismatched: 0 }));
        assert!(!root.path().join("log").exists());
    }

    #[tokio::test]
    async fn test_toolchain_drift_blocks_run() {
        let root = tempfile::tempdir().unwrap();
        let manifest = chain(root.path()).with_tool("go", "1.22");
        let mut lockfile = Lockfile::new();
        lockfile.toolchain = Some(crate::lockfile::ToolchainLocks {
            go: crate::lockfile::LockedToolchain {
                kind: crate::lockfile::TOOLCHAIN_KIND.to_string(),
                requested: "1.22".to_string(),
                detected: "go1.22.1".to_string(),
            },
        });
        let runner = TaskRunner::new(&manifest, &lockfile, ambient_environment());

        let err = runner
            .run_task("main", &[], &StubToolchain::new(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PinionError::Toolchain(_)));
        assert!(!root.path().join("log").exists());
    }
}
