use crate::pipeline::PipelineState;
use crate::viewer::{Viewer, ViewerUpdate};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Maximum updates queued between the pipeline and the render loop
const MAX_PENDING_UPDATES: usize = 1024;

/// How often the render loop wakes up to check for a stop request
const RENDER_POLL: Duration = Duration::from_millis(50);

enum ViewerEvent {
    Update(ViewerUpdate),
    Reset,
    Stop,
}

/// Headless viewer that renders live state as log lines
pub struct ConsoleViewer {
    name: String,
    tx: SyncSender<ViewerEvent>,
    rx: Mutex<Option<Receiver<ViewerEvent>>>,
    stopped: AtomicBool,
    /// Log every n-th frame update (state changes are always logged)
    log_every: u64,
    frames_seen: AtomicU64,
    resets: AtomicU64,
    dropped: AtomicU64,
}

impl ConsoleViewer {
    pub fn new(name: &str, log_every: u64) -> Self {
        let (tx, rx) = mpsc::sync_channel(MAX_PENDING_UPDATES);
        Self {
            name: name.to_string(),
            tx,
            rx: Mutex::new(Some(rx)),
            stopped: AtomicBool::new(false),
            log_every: log_every.max(1),
            frames_seen: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Updates rendered so far
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::SeqCst)
    }

    /// Updates dropped because the render loop fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn send(&self, event: ViewerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn render(&self, update: &ViewerUpdate, last_state: &mut Option<PipelineState>) {
        let seen = self.frames_seen.fetch_add(1, Ordering::SeqCst) + 1;

        if *last_state != Some(update.state) {
            info!(
                "[{}] frame {} (t={:.3}s): {:?}",
                self.name, update.frame_index, update.timestamp, update.state
            );
            *last_state = Some(update.state);
        } else if seen % self.log_every == 0 {
            info!(
                "[{}] frame {} (t={:.3}s), {} keyframes",
                self.name, update.frame_index, update.timestamp, update.keyframes
            );
        }
    }
}

impl Viewer for ConsoleViewer {
    fn publish(&self, update: ViewerUpdate) {
        self.send(ViewerEvent::Update(update));
    }

    fn reset(&self) {
        self.send(ViewerEvent::Reset);
    }

    fn run(&self) {
        let rx = match self.rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(rx) = rx else {
            debug!("[{}] render loop already ran", self.name);
            return;
        };

        info!("[{}] render loop started", self.name);
        let mut last_state = None;

        while !self.stopped.load(Ordering::SeqCst) {
            match rx.recv_timeout(RENDER_POLL) {
                Ok(ViewerEvent::Update(update)) => self.render(&update, &mut last_state),
                Ok(ViewerEvent::Reset) => {
                    self.resets.fetch_add(1, Ordering::SeqCst);
                    last_state = None;
                    info!("[{}] display reset", self.name);
                }
                Ok(ViewerEvent::Stop) => break,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(
            "[{}] render loop stopped after {} updates and {} resets ({} dropped)",
            self.name,
            self.frames_seen(),
            self.resets.load(Ordering::SeqCst),
            self.dropped()
        );
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.send(ViewerEvent::Stop);
    }
}
