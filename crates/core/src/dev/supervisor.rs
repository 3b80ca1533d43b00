//! Dev supervisor
//!
//! Keeps exactly one watcher process alive. Control events (reload, stop)
//! come from signals and hotkeys through one channel; the loop waits on that
//! channel and on the child's exit, whichever fires first.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::execution::PreparedCommand;
use crate::types::{PinionError, PinionResult};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

const RESTART_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Reload,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Restarting,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL
    pub grace_period: Duration,
    /// Read Ctrl-R / Ctrl-C from an interactive terminal
    pub hotkeys: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            hotkeys: true,
        }
    }
}

/// Starts one instance of the supervised process. On Unix the child must
/// lead its own process group.
pub trait Launcher: Send {
    fn launch(&mut self) -> PinionResult<Child>;
}

/// Launches a prepared command in its own process group
pub struct CommandLauncher {
    prepared: PreparedCommand,
}

impl CommandLauncher {
    pub fn new(prepared: PreparedCommand) -> Self {
        Self { prepared }
    }
}

impl Launcher for CommandLauncher {
    fn launch(&mut self) -> PinionResult<Child> {
        let mut command = self.prepared.to_command();
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        command.spawn().map_err(|e| {
            PinionError::Supervisor(format!(
                "failed to start {}: {}",
                self.prepared.program.display(),
                e
            ))
        })
    }
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Control(ControlEvent),
}

pub struct Supervisor<L: Launcher> {
    launcher: L,
    config: SupervisorConfig,
    restart_delay: Duration,
    state: SupervisorState,
}

impl<L: Launcher> Supervisor<L> {
    pub fn new(launcher: L, config: SupervisorConfig) -> Self {
        Self {
            launcher,
            config,
            restart_delay: RESTART_DELAY,
            state: SupervisorState::Stopped,
        }
    }

    /// Pause before relaunching a child that exited with an error
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    fn transition(&mut self, state: SupervisorState) {
        tracing::info!(from = ?self.state, to = ?state, "supervisor");
        self.state = state;
    }

    /// Run until a stop event or a clean child exit. A closed event channel
    /// only removes that wake source.
    pub async fn run(&mut self, mut events: mpsc::Receiver<ControlEvent>) -> PinionResult<()> {
        let mut events_open = true;

        loop {
            self.transition(SupervisorState::Starting);
            let mut child = self.launcher.launch()?;
            // Outlives `child.id()`, which is gone once the leader is reaped
            let group = child.id();
            self.transition(SupervisorState::Running);

            let wake = loop {
                tokio::select! {
                    status = child.wait() => break Wake::Exited(status),
                    event = events.recv(), if events_open => match event {
                        Some(event) => break Wake::Control(event),
                        None => events_open = false,
                    },
                }
            };

            match wake {
                Wake::Exited(Ok(status)) if status.success() => {
                    tracing::info!("watcher exited cleanly");
                    self.transition(SupervisorState::Stopping);
                    self.terminate(&mut child, group).await?;
                    self.transition(SupervisorState::Stopped);
                    return Ok(());
                }
                Wake::Exited(Ok(status)) => {
                    tracing::info!(%status, "watcher exited, restarting");
                    self.transition(SupervisorState::Restarting);
                    self.terminate(&mut child, group).await?;
                    tokio::select! {
                        _ = tokio::time::sleep(self.restart_delay) => {}
                        event = events.recv(), if events_open => match event {
                            Some(ControlEvent::Stop) => {
                                self.transition(SupervisorState::Stopped);
                                return Ok(());
                            }
                            Some(ControlEvent::Reload) => {}
                            None => events_open = false,
                        },
                    }
                }
                Wake::Exited(Err(e)) => {
                    self.transition(SupervisorState::Stopping);
                    if let Err(cleanup) = self.terminate(&mut child, group).await {
                        tracing::warn!(error = %cleanup, "failed to clean up watcher");
                    }
                    self.transition(SupervisorState::Stopped);
                    return Err(PinionError::Supervisor(format!(
                        "failed to wait for watcher: {}",
                        e
                    )));
                }
                Wake::Control(ControlEvent::Reload) => {
                    self.transition(SupervisorState::Restarting);
                    self.terminate(&mut child, group).await?;
                }
                Wake::Control(ControlEvent::Stop) => {
                    self.transition(SupervisorState::Stopping);
                    self.terminate(&mut child, group).await?;
                    self.transition(SupervisorState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    /// Stop the child and everything in its process group: SIGTERM, then
    /// SIGKILL after the grace period. Returns once the leader is reaped and
    /// the group is empty, or the group outlived SIGKILL.
    async fn terminate(&self, child: &mut Child, group: Option<u32>) -> PinionResult<()> {
        #[cfg(unix)]
        {
            if let Some(pgid) = group {
                return self.terminate_group(child, pgid).await;
            }
        }
        #[cfg(not(unix))]
        let _ = group;

        let exited = child
            .try_wait()
            .map_err(|e| PinionError::Supervisor(format!("failed to reap watcher: {}", e)))?;
        if exited.is_some() {
            return Ok(());
        }
        child
            .kill()
            .await
            .map_err(|e| PinionError::Supervisor(format!("failed to kill watcher: {}", e)))
    }

    #[cfg(unix)]
    async fn terminate_group(&self, child: &mut Child, pgid: u32) -> PinionResult<()> {
        use nix::sys::signal::Signal;

        if group_settled(child, pgid)? {
            return Ok(());
        }

        signal_group(pgid, Signal::SIGTERM);
        if wait_settled(child, pgid, self.config.grace_period).await? {
            return Ok(());
        }

        tracing::warn!(
            pgid,
            grace_ms = self.config.grace_period.as_millis() as u64,
            "watcher group ignored SIGTERM, killing"
        );
        signal_group(pgid, Signal::SIGKILL);
        if !wait_settled(child, pgid, self.config.grace_period.max(KILL_TIMEOUT)).await? {
            tracing::warn!(pgid, "process group still present after SIGKILL");
        }
        child
            .wait()
            .await
            .map_err(|e| PinionError::Supervisor(format!("failed to reap watcher: {}", e)))?;
        Ok(())
    }
}

#[cfg(unix)]
const KILL_TIMEOUT: Duration = Duration::from_secs(1);

#[cfg(unix)]
const GROUP_POLL: Duration = Duration::from_millis(20);

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
        tracing::debug!(pgid, ?signal, error = %e, "killpg failed");
    }
}

/// Whether any process is still a member of group `pgid`
#[cfg(unix)]
fn group_alive(pgid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pgid as i32), None).is_ok()
}

/// Leader reaped and no group member left
#[cfg(unix)]
fn group_settled(child: &mut Child, pgid: u32) -> PinionResult<bool> {
    let exited = child
        .try_wait()
        .map_err(|e| PinionError::Supervisor(format!("failed to reap watcher: {}", e)))?;
    Ok(exited.is_some() && !group_alive(pgid))
}

#[cfg(unix)]
async fn wait_settled(child: &mut Child, pgid: u32, timeout: Duration) -> PinionResult<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if group_settled(child, pgid)? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(GROUP_POLL).await;
    }
}

/// Forward process signals as control events: interrupt reloads, terminate
/// stops.
pub fn spawn_signal_listener(events: mpsc::Sender<ControlEvent>) -> PinionResult<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(()) = interrupt.recv() => ControlEvent::Reload,
                    Some(()) = terminate.recv() => ControlEvent::Stop,
                    else => break,
                };
                tracing::debug!(?event, "signal received");
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if events.send(ControlEvent::Reload).await.is_err() {
                    break;
                }
            }
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::{Arc, Mutex};

    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    use tokio::process::Command;

    use super::*;

    fn alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    /// Launched children lead their own group, so pid == pgid
    async fn group_gone(pgid: u32) -> bool {
        for _ in 0..100 {
            if !group_alive(pgid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[derive(Default)]
    struct Record {
        pids: Vec<u32>,
        overlaps: usize,
    }

    /// Spawns `sh -c <script>` and records whether an earlier child's process
    /// group was still alive at launch time
    struct ShellLauncher {
        script: String,
        record: Arc<Mutex<Record>>,
    }

    impl ShellLauncher {
        fn new(script: &str) -> (Self, Arc<Mutex<Record>>) {
            let record = Arc::new(Mutex::new(Record::default()));
            let launcher = Self {
                script: script.to_string(),
                record: Arc::clone(&record),
            };
            (launcher, record)
        }
    }

    impl Launcher for ShellLauncher {
        fn launch(&mut self) -> PinionResult<Child> {
            let mut record = self.record.lock().unwrap();
            let live = record.pids.iter().filter(|pid| group_alive(**pid)).count();
            record.overlaps += live;

            let child = Command::new("/bin/sh")
                .arg("-c")
                .arg(&self.script)
                .process_group(0)
                .kill_on_drop(true)
                .spawn()?;
            record.pids.push(child.id().unwrap());
            Ok(child)
        }
    }

    fn config(grace_ms: u64) -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_millis(grace_ms),
            hotkeys: false,
        }
    }

    async fn wait_for_launches(record: &Arc<Mutex<Record>>, count: usize) {
        for _ in 0..200 {
            if record.lock().unwrap().pids.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("supervisor never reached {} launches", count);
    }

    #[tokio::test]
    async fn test_reload_keeps_a_single_child() {
        let (launcher, record) = ShellLauncher::new("sleep 30");
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let mut supervisor = Supervisor::new(launcher, config(1000));
            let result = supervisor.run(rx).await;
            (result, supervisor.state())
        });

        for launches in 1..=3 {
            wait_for_launches(&record, launches).await;
            tx.send(ControlEvent::Reload).await.unwrap();
        }
        wait_for_launches(&record, 4).await;
        tx.send(ControlEvent::Stop).await.unwrap();

        let (result, state) = handle.await.unwrap();
        result.unwrap();
        assert_eq!(state, SupervisorState::Stopped);

        let record = record.lock().unwrap();
        assert_eq!(record.pids.len(), 4);
        assert_eq!(record.overlaps, 0, "a new child started before the old one died");
        assert!(record.pids.iter().all(|pid| !alive(*pid)));
    }

    #[tokio::test]
    async fn test_stop_does_not_restart() {
        let (launcher, record) = ShellLauncher::new("sleep 30");
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            Supervisor::new(launcher, config(1000)).run(rx).await
        });

        wait_for_launches(&record, 1).await;
        tx.send(ControlEvent::Stop).await.unwrap();
        handle.await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = record.lock().unwrap();
        assert_eq!(record.pids.len(), 1);
        assert!(!alive(record.pids[0]));
    }

    #[tokio::test]
    async fn test_clean_exit_ends_loop() {
        let (launcher, record) = ShellLauncher::new("exit 0");
        let (_tx, rx) = mpsc::channel(8);
        Supervisor::new(launcher, config(1000)).run(rx).await.unwrap();
        assert_eq!(record.lock().unwrap().pids.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_exit_restarts() {
        let (launcher, record) = ShellLauncher::new("exit 2");
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            Supervisor::new(launcher, config(1000))
                .with_restart_delay(Duration::from_millis(10))
                .run(rx)
                .await
        });

        wait_for_launches(&record, 3).await;
        tx.send(ControlEvent::Stop).await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(record.lock().unwrap().overlaps, 0);
    }

    #[tokio::test]
    async fn test_closed_channel_still_waits_for_child() {
        let (launcher, record) = ShellLauncher::new("sleep 0.2");
        let (tx, rx) = mpsc::channel(8);
        drop(tx);
        Supervisor::new(launcher, config(1000)).run(rx).await.unwrap();
        assert_eq!(record.lock().unwrap().pids.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_exit_reaps_background_children() {
        let (launcher, record) = ShellLauncher::new("sleep 30 & exit 2");
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            Supervisor::new(launcher, config(1000))
                .with_restart_delay(Duration::from_millis(10))
                .run(rx)
                .await
        });

        wait_for_launches(&record, 3).await;
        tx.send(ControlEvent::Stop).await.unwrap();
        handle.await.unwrap().unwrap();

        let pids = record.lock().unwrap().pids.clone();
        assert_eq!(record.lock().unwrap().overlaps, 0);
        for pid in pids {
            assert!(group_gone(pid).await, "process group {} outlived the supervisor", pid);
        }
    }

    #[tokio::test]
    async fn test_clean_exit_reaps_background_children() {
        let (launcher, record) = ShellLauncher::new("sleep 30 & exit 0");
        let (_tx, rx) = mpsc::channel(8);
        Supervisor::new(launcher, config(1000)).run(rx).await.unwrap();

        let pid = record.lock().unwrap().pids[0];
        assert!(!group_alive(pid));
    }

    #[tokio::test]
    async fn test_signals_map_to_control_events() {
        use nix::sys::signal::{raise, Signal};

        let (tx, mut rx) = mpsc::channel(8);
        let listener = spawn_signal_listener(tx).unwrap();

        raise(Signal::SIGTERM).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(event, Some(ControlEvent::Stop));

        raise(Signal::SIGINT).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(event, Some(ControlEvent::Reload));

        listener.abort();
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let (launcher, record) = ShellLauncher::new("trap '' TERM; sleep 30");
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            Supervisor::new(launcher, config(100)).run(rx).await
        });

        wait_for_launches(&record, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        tx.send(ControlEvent::Stop).await.unwrap();
        handle.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!alive(record.lock().unwrap().pids[0]));
    }
}
