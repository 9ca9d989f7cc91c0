use tracing::warn;

use crate::input::FrameSource;

/// A frame scheduled for playback at a given offset from the start of the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEntry {
    /// Index of the frame in the dataset
    pub frame_index: usize,

    /// Seconds after the first entry at which this frame should be played
    pub scheduled_offset: f64,
}

/// Index range walked by the timeline builder
///
/// `bound` is exclusive in the direction of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRange {
    pub first: i64,
    pub bound: i64,
    pub step: i64,
}

impl PlaybackRange {
    /// Play `[start, end)` front to back
    pub fn forward(start: i64, end: i64) -> Self {
        Self { first: start, bound: end, step: 1 }
    }

    /// Play `[start, end)` back to front, starting no later than the last frame
    pub fn reverse(start: i64, end: i64, corpus_len: usize) -> Self {
        let last = (corpus_len as i64 - 1).min(end.saturating_sub(1));
        Self { first: last, bound: start.saturating_sub(1), step: -1 }
    }

    /// Whether `index` is still inside the range for a corpus of `corpus_len` frames
    pub fn contains(&self, index: i64, corpus_len: usize) -> bool {
        let before_bound = match self.step.signum() {
            1 => index < self.bound,
            -1 => index > self.bound,
            _ => false,
        };
        index >= 0 && index < corpus_len as i64 && before_bound
    }
}

/// Ordered dispatch schedule for a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    entries: Vec<PlaybackEntry>,
}

impl Timeline {
    /// Build the schedule for `range` over `source`
    ///
    /// Offsets accumulate absolute timestamp differences divided by `speed`.
    /// A speed of zero means unthrottled playback and every offset is zero.
    pub fn build(source: &dyn FrameSource, range: PlaybackRange, speed: f64) -> Self {
        let mut entries: Vec<PlaybackEntry> = Vec::new();

        if range.step == 0 {
            warn!("Playback step is zero, nothing to schedule");
            return Self { entries };
        }

        let corpus_len = source.len();
        let mut index = range.first;
        while range.contains(index, corpus_len) {
            let frame_index = index as usize;
            let scheduled_offset = match entries.last() {
                None => 0.0,
                Some(prev) if speed != 0.0 => {
                    let dt = source.timestamp(frame_index) - source.timestamp(prev.frame_index);
                    prev.scheduled_offset + dt.abs() / speed
                }
                Some(_) => 0.0,
            };
            entries.push(PlaybackEntry { frame_index, scheduled_offset });
            index = index.saturating_add(range.step);
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[PlaybackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&PlaybackEntry> {
        self.entries.last()
    }

    /// Scheduled length of the run in seconds
    pub fn duration(&self) -> f64 {
        self.last().map(|e| e.scheduled_offset).unwrap_or(0.0)
    }
}
