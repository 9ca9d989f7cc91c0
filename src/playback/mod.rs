pub mod benchmark;
pub mod clock;
pub mod control;
pub mod engine;
pub mod error;
pub mod session;
pub mod shutdown;
pub mod supervisor;

pub use control::ControlSurface;
pub use session::{run_session, SessionConfig};
pub use shutdown::{join_contexts, ExportPlan};

use clock::PlaybackClock;
use serde::Serialize;
use std::time::Duration;

/// How frames are paced against wall time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackMode {
    /// Feed frames as fast as the pipeline takes them, tracking and mapping serialized
    Unthrottled,
    /// Follow recorded timestamps scaled by `speed` (2.0 = twice real time)
    RatePaced { speed: f64 },
}

impl PlaybackMode {
    /// A speed of zero selects unthrottled playback
    pub fn from_speed(speed: f64) -> Self {
        if speed == 0.0 {
            PlaybackMode::Unthrottled
        } else {
            PlaybackMode::RatePaced { speed }
        }
    }

    pub fn speed(&self) -> f64 {
        match self {
            PlaybackMode::Unthrottled => 0.0,
            PlaybackMode::RatePaced { speed } => *speed,
        }
    }

    /// Whether the pipeline should serialize its internal work
    pub fn linearize(&self) -> bool {
        matches!(self, PlaybackMode::Unthrottled)
    }
}

/// How the playback loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LoopExit {
    /// Every timeline entry was visited
    #[default]
    Exhausted,
    /// The pipeline lost tracking
    Lost,
    /// A frame could not be read or submitted
    Failed,
}

/// A frame that reached the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedFrame {
    pub index: usize,
    pub timestamp: f64,
}

/// Counters accumulated over a run
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub frames_dispatched: usize,
    pub frames_skipped: usize,
    pub restarts: usize,
    /// Process CPU time since the last clock anchor
    pub cpu_time: Duration,
    /// Wall time since the last clock anchor
    pub wall_time: Duration,
    /// Schedule offset at the last clock anchor
    pub origin_offset: f64,
    pub first_dispatched: Option<DispatchedFrame>,
    pub last_dispatched: Option<DispatchedFrame>,
    pub exit: LoopExit,
}

impl RunOutcome {
    pub fn record_dispatch(&mut self, index: usize, timestamp: f64) {
        self.frames_dispatched += 1;
        let frame = DispatchedFrame { index, timestamp };
        if self.first_dispatched.is_none() {
            self.first_dispatched = Some(frame.clone());
        }
        self.last_dispatched = Some(frame);
    }

    pub fn record_skip(&mut self) {
        self.frames_skipped += 1;
    }

    /// Capture processing times from the clock
    pub fn record_timing(&mut self, clock: &PlaybackClock) {
        self.cpu_time = clock.cpu_time();
        self.wall_time = clock.wall_time();
        self.origin_offset = clock.origin_offset();
    }
}
