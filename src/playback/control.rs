use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::info;

/// Operator-facing switches shared with the replay loop
///
/// Cloning is cheap; all clones observe the same flags.
#[derive(Debug, Clone, Default)]
pub struct ControlSurface {
    paused: Arc<AtomicBool>,
    reset_requested: Arc<AtomicBool>,
}

impl ControlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the pause flag, returning the new value
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Ask for a full pipeline reset on the next frame
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::SeqCst);
    }

    pub fn reset_requested(&self) -> bool {
        self.reset_requested.load(Ordering::SeqCst)
    }

    pub fn clear_reset(&self) {
        self.reset_requested.store(false, Ordering::SeqCst);
    }

    /// Poll until the pause flag is cleared
    ///
    /// Returns true if any waiting happened.
    pub async fn wait_while_paused(&self, poll: Duration) -> bool {
        let mut waited = false;
        while self.is_paused() {
            waited = true;
            tokio::time::sleep(poll).await;
        }
        waited
    }

    /// Apply a single operator command, returning false if it was not recognised
    pub fn apply_command(&self, command: &str) -> bool {
        match command.trim() {
            "p" | "pause" => {
                let paused = self.toggle_pause();
                info!("Playback {}", if paused { "paused" } else { "resumed" });
                true
            }
            "r" | "reset" => {
                self.request_reset();
                info!("Full reset requested");
                true
            }
            _ => false,
        }
    }
}

/// Read operator commands from stdin, one per line
pub fn spawn_stdin_listener(control: ControlSurface) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() && !control.apply_command(&line) {
                info!("Unknown command {:?} (p = pause/resume, r = reset)", line.trim());
            }
        }
    })
}
