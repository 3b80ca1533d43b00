//! `pinion dev`: run the `dev` task under the file watcher
//!
//! File events are detected by the watcher tool, not by us. We translate the
//! task's watch globs into its `-r` expression, wrap the resolved command and
//! supervise the watcher process.

pub mod keys;
pub mod supervisor;
pub mod watch;

use tokio::sync::mpsc;

use crate::configs::DEV_TASK;
use crate::execution::{PreparedCommand, TaskRunner};
use crate::graph::resolve_order;
use crate::tools::{resolve_identity, Toolchain, TOOLCHAIN_NAME, WATCHER_TOOL};
use crate::types::{PinionError, PinionResult};

pub use supervisor::{
    CommandLauncher, ControlEvent, Launcher, Supervisor, SupervisorConfig, SupervisorState,
};
pub use watch::{glob_to_regex, watch_regex};

/// Everything `pinion dev` needs once its preconditions hold
#[derive(Debug, Clone)]
pub struct DevPlan {
    /// Dependencies of `dev`, run once before supervision
    pub dependencies: Vec<String>,
    /// The watcher invocation wrapping the dev command
    pub watcher: PreparedCommand,
}

/// Check the dev preconditions and build the watcher command.
///
/// Fails if the task or its watch patterns are missing, the watcher tool is
/// not declared, or the dev command itself does not resolve.
pub fn plan_dev(runner: &TaskRunner<'_>, passthrough: &[String]) -> PinionResult<DevPlan> {
    let manifest = runner.manifest();
    let task = manifest
        .tasks
        .get(DEV_TASK)
        .ok_or_else(|| PinionError::UnknownTask(DEV_TASK.to_string()))?;
    if task.command.trim().is_empty() {
        return Err(PinionError::task(DEV_TASK, "command is empty"));
    }
    let pattern = watch_regex(&task.watch)?;

    let watcher_declared = manifest
        .tools
        .keys()
        .filter(|name| name.as_str() != TOOLCHAIN_NAME)
        .any(|name| resolve_identity(name).binary_name == WATCHER_TOOL);
    if !watcher_declared {
        return Err(PinionError::Supervisor(format!(
            "'{}' must be declared in [tools] to use dev",
            WATCHER_TOOL
        )));
    }

    let mut order = resolve_order(&manifest.tasks, DEV_TASK)?;
    order.pop();

    let command = runner.prepare(DEV_TASK, passthrough)?;
    let watcher_path = runner
        .executor()
        .resolve(WATCHER_TOOL, &command.cwd, &command.env)?;

    let mut args = vec![
        "--decoration=none".to_string(),
        "-s".to_string(),
        "-r".to_string(),
        pattern,
        "--".to_string(),
        command.program.display().to_string(),
    ];
    args.extend(command.args.iter().cloned());

    Ok(DevPlan {
        dependencies: order,
        watcher: PreparedCommand {
            task: DEV_TASK.to_string(),
            program: watcher_path,
            args,
            cwd: command.cwd,
            env: command.env,
        },
    })
}

/// Gate, run the dependencies once, then supervise until stopped
pub async fn run_dev(
    runner: &TaskRunner<'_>,
    passthrough: &[String],
    toolchain: &dyn Toolchain,
    config: &SupervisorConfig,
) -> PinionResult<()> {
    runner.ensure_ready(toolchain).await?;
    let plan = plan_dev(runner, passthrough)?;

    runner
        .run_sequence(&plan.dependencies, DEV_TASK, &[])
        .await?;

    tracing::info!(watcher = %plan.watcher.display_line(), "starting dev loop");

    let (tx, rx) = mpsc::channel(16);
    let signals = supervisor::spawn_signal_listener(tx.clone())?;

    let raw_mode = if config.hotkeys {
        keys::RawModeGuard::enable()
    } else {
        None
    };
    let _keys = raw_mode.as_ref().map(|_| keys::KeyReader::spawn(tx.clone()));
    drop(tx);

    let mut supervisor = Supervisor::new(CommandLauncher::new(plan.watcher), config.clone());
    let result = supervisor.run(rx).await;
    signals.abort();
    result
}
