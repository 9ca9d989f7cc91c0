use crate::core::{PlaybackEntry, Timeline};
use crate::input::FrameSource;
use crate::playback::clock::PlaybackClock;
use crate::playback::control::ControlSurface;
use crate::playback::error::{PlaybackError, Result};
use crate::playback::supervisor::{PipelineSupervisor, Verdict};
use crate::playback::{LoopExit, PlaybackMode, RunOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds a frame may lag behind its slot before it is dropped
pub const SKIP_TOLERANCE: f64 = 0.5;

/// Extra slack on odd timeline positions
pub const SKIP_STAGGER: f64 = 0.1;

/// Default interval between pause flag checks
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(5);

/// Whether the entry at timeline `position` is too late to be played
pub fn should_skip(elapsed: f64, scheduled_offset: f64, position: usize) -> bool {
    elapsed > scheduled_offset + SKIP_TOLERANCE + SKIP_STAGGER * (position % 2) as f64
}

/// Drives frames from the timeline into the supervised pipeline
pub struct PlaybackEngine {
    source: Arc<dyn FrameSource>,
    timeline: Timeline,
    mode: PlaybackMode,
    control: ControlSurface,
    clock: PlaybackClock,
    supervisor: PipelineSupervisor,
    outcome: RunOutcome,
    pause_poll: Duration,
}

impl PlaybackEngine {
    pub fn new(
        source: Arc<dyn FrameSource>,
        timeline: Timeline,
        mode: PlaybackMode,
        control: ControlSurface,
        supervisor: PipelineSupervisor,
    ) -> Self {
        Self {
            source,
            timeline,
            mode,
            control,
            clock: PlaybackClock::new(),
            supervisor,
            outcome: RunOutcome::default(),
            pause_poll: DEFAULT_PAUSE_POLL,
        }
    }

    /// Set the pause poll interval
    pub fn with_pause_poll(mut self, pause_poll: Duration) -> Self {
        self.pause_poll = pause_poll;
        self
    }

    /// Play the whole timeline
    ///
    /// Returns how the loop ended. Errors from the frame source or the
    /// pipeline abort the loop; the caller is still expected to shut the
    /// pipeline down.
    pub async fn run(&mut self) -> Result<LoopExit> {
        info!(
            "Playing {} frames from {} ({:?}, scheduled {:.2}s)",
            self.timeline.len(),
            self.source.name(),
            self.mode,
            self.timeline.duration()
        );
        if self.timeline.is_empty() {
            warn!("Nothing to play from {}", self.source.name());
        }

        let mut exit = LoopExit::Exhausted;
        for position in 0..self.timeline.len() {
            let entry = self.timeline.entries()[position];
            match self.step(position, entry).await {
                Ok(Verdict::Stop) => {
                    exit = LoopExit::Lost;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.finish_loop(LoopExit::Failed);
                    return Err(e);
                }
            }
        }

        self.finish_loop(exit);
        Ok(exit)
    }

    async fn step(&mut self, position: usize, entry: PlaybackEntry) -> Result<Verdict> {
        if self.control.wait_while_paused(self.pause_poll).await {
            debug!("Resumed at position {}", position);
        }

        if !self.supervisor.pipeline().is_initialized() {
            self.clock.anchor(entry.scheduled_offset);
        }

        // early frames are played immediately; pacing only ever drops late ones
        let skip = match self.mode {
            PlaybackMode::Unthrottled => false,
            PlaybackMode::RatePaced { .. } => {
                let elapsed = self.clock.elapsed();
                let late = should_skip(elapsed, entry.scheduled_offset, position);
                if late {
                    debug!(
                        "Skipping frame {} (play at {:.3}s, now {:.3}s)",
                        entry.frame_index, entry.scheduled_offset, elapsed
                    );
                }
                late
            }
        };

        if skip {
            self.outcome.record_skip();
        } else {
            let frame = self.source.frame(entry.frame_index)?;
            let timestamp = frame.timestamp;
            debug!(
                "Dispatching frame {} at {:.3}s (mean intensity {:.1})",
                entry.frame_index,
                timestamp,
                frame.mean_intensity()
            );

            let pipeline = self.supervisor.pipeline_mut();
            if let Err(e) = pipeline.submit(&frame, entry.frame_index).await {
                return Err(PlaybackError::Submit {
                    pipeline: pipeline.name().to_string(),
                    index: entry.frame_index,
                    reason: e.to_string(),
                });
            }
            drop(frame);

            self.outcome.record_dispatch(entry.frame_index, timestamp);
        }

        self.supervisor.observe(position, &self.control).await
    }

    fn finish_loop(&mut self, exit: LoopExit) {
        self.outcome.exit = exit;
        self.outcome.restarts = self.supervisor.restarts();
        if exit == LoopExit::Failed {
            warn!("Playback aborted after {} dispatched frames", self.outcome.frames_dispatched);
        } else {
            info!(
                "Playback finished ({:?}): {} dispatched, {} skipped, {} restarts",
                exit, self.outcome.frames_dispatched, self.outcome.frames_skipped, self.outcome.restarts
            );
        }
    }

    /// Hand back the supervisor, clock and counters for shutdown
    pub fn into_parts(self) -> (PipelineSupervisor, PlaybackClock, RunOutcome) {
        (self.supervisor, self.clock, self.outcome)
    }
}
