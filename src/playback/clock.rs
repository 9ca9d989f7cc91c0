//! Wall clock anchoring for paced playback

use cpu_time::ProcessTime;
use std::time::{Duration, Instant};

/// Reference point captured when a pipeline starts tracking
#[derive(Debug)]
pub struct ClockAnchor {
    /// Wall time at which the anchor was taken
    pub wall_start: Instant,

    /// Process CPU time at the same moment, if the platform reports it
    pub cpu_start: Option<ProcessTime>,

    /// Scheduled offset of the entry being played when the anchor was taken
    pub origin_offset: f64,
}

/// Maps wall time onto the playback schedule
///
/// The clock is re-anchored every time a fresh pipeline has not yet
/// initialized, so time spent bootstrapping is not counted against the
/// schedule.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    anchor: Option<ClockAnchor>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the clock now at the given schedule offset
    pub fn anchor(&mut self, origin_offset: f64) {
        self.anchor_at(origin_offset, Instant::now());
    }

    /// Anchor the clock at an explicit wall time
    pub fn anchor_at(&mut self, origin_offset: f64, wall_start: Instant) {
        self.anchor = Some(ClockAnchor {
            wall_start,
            cpu_start: ProcessTime::try_now().ok(),
            origin_offset,
        });
    }

    /// Position on the schedule right now, in seconds
    pub fn elapsed(&self) -> f64 {
        self.elapsed_at(Instant::now())
    }

    /// Position on the schedule at `now`, in seconds
    pub fn elapsed_at(&self, now: Instant) -> f64 {
        match &self.anchor {
            Some(anchor) => {
                anchor.origin_offset + now.saturating_duration_since(anchor.wall_start).as_secs_f64()
            }
            None => 0.0,
        }
    }

    /// Schedule offset of the current anchor
    pub fn origin_offset(&self) -> f64 {
        self.anchor.as_ref().map(|a| a.origin_offset).unwrap_or(0.0)
    }

    /// Wall time since the anchor
    pub fn wall_time(&self) -> Duration {
        self.anchor
            .as_ref()
            .map(|a| a.wall_start.elapsed())
            .unwrap_or_default()
    }

    /// Process CPU time since the anchor
    pub fn cpu_time(&self) -> Duration {
        self.anchor
            .as_ref()
            .and_then(|a| a.cpu_start.as_ref())
            .and_then(|start| start.try_elapsed().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unanchored_clock_reads_zero() {
        let clock = PlaybackClock::new();
        assert!(clock.anchor.is_none());
        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(clock.wall_time(), Duration::ZERO);
        assert_eq!(clock.cpu_time(), Duration::ZERO);
    }

    #[test]
    fn test_elapsed_includes_origin_offset() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.anchor_at(2.5, start);

        let elapsed = clock.elapsed_at(start + Duration::from_millis(1500));
        assert!((elapsed - 4.0).abs() < 1e-9);
        assert_eq!(clock.origin_offset(), 2.5);
    }

    #[test]
    fn test_reanchor_replaces_origin() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now();
        clock.anchor_at(1.0, start);
        clock.anchor_at(7.0, start + Duration::from_secs(3));

        let elapsed = clock.elapsed_at(start + Duration::from_secs(4));
        assert!((elapsed - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_before_anchor_saturates() {
        let mut clock = PlaybackClock::new();
        let start = Instant::now() + Duration::from_secs(10);
        clock.anchor_at(0.5, start);
        assert_eq!(clock.elapsed_at(Instant::now()), 0.5);
    }
}
