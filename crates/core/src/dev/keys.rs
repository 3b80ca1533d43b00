//! Interactive hotkeys for `pinion dev`
//!
//! Ctrl-R reloads, Ctrl-C stops. Keys are read in raw mode on a dedicated
//! thread and forwarded as [`ControlEvent`]s.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::sync::mpsc;

use crate::dev::supervisor::ControlEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn stdin_is_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// Holds the terminal in raw mode; restores it when dropped
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Enter raw mode if stdin is a terminal. Failure only disables hotkeys.
    pub fn enable() -> Option<Self> {
        if !stdin_is_terminal() {
            return None;
        }
        match terminal::enable_raw_mode() {
            Ok(()) => Some(Self(())),
            Err(e) => {
                tracing::warn!(error = %e, "could not enter raw mode, hotkeys disabled");
                None
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// Map a key press to a control event
pub fn key_event(key: &KeyEvent) -> Option<ControlEvent> {
    if key.kind != KeyEventKind::Press || !key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Char('r') | KeyCode::Char('R') => Some(ControlEvent::Reload),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(ControlEvent::Stop),
        _ => None,
    }
}

/// Background key reader; stops and joins on drop
pub struct KeyReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyReader {
    pub fn spawn(events: mpsc::Sender<ControlEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || read_keys(events, flag));
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_keys(events: mpsc::Sender<ControlEvent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(error = %e, "key input failed, hotkeys disabled");
                return;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "key input failed, hotkeys disabled");
                return;
            }
        };
        if let Some(control) = key_event(&key) {
            tracing::debug!(?control, "hotkey");
            if events.blocking_send(control).is_err() {
                return;
            }
        }
    }
}
