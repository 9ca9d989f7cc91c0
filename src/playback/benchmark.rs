use crate::playback::{LoopExit, RunOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::info;

/// Throughput figures for a finished run
///
/// Ratios that cannot be computed (no frames, zero-length recording, no
/// measured time) are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    /// Frames spanned between the first and last dispatched frame
    pub frames: usize,
    /// Recorded time spanned by those frames, in seconds
    pub source_seconds: f64,
    /// Frame rate of the recording
    pub source_fps: Option<f64>,
    /// CPU milliseconds per frame
    pub ms_per_frame_single: Option<f64>,
    /// Wall milliseconds per frame
    pub ms_per_frame_multi: Option<f64>,
    /// Speed relative to real time, by CPU time
    pub realtime_factor_single: Option<f64>,
    /// Speed relative to real time, by wall time
    pub realtime_factor_multi: Option<f64>,
    pub dispatched: usize,
    pub skipped: usize,
    pub restarts: usize,
    pub exit: LoopExit,
}

impl BenchmarkReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let (frames, source_seconds) = match (&outcome.first_dispatched, &outcome.last_dispatched) {
            (Some(first), Some(last)) => (
                first.index.abs_diff(last.index),
                (last.timestamp - first.timestamp).abs(),
            ),
            _ => (0, 0.0),
        };

        let ms_single = outcome.cpu_time.as_secs_f64() * 1000.0;
        let ms_multi = outcome.origin_offset * 1000.0 + outcome.wall_time.as_secs_f64() * 1000.0;

        let per_frame = |ms: f64| (frames > 0).then(|| ms / frames as f64);
        let realtime = |ms: f64| (source_seconds > 0.0 && ms > 0.0).then(|| 1000.0 / (ms / source_seconds));

        Self {
            frames,
            source_seconds,
            source_fps: (source_seconds > 0.0).then(|| frames as f64 / source_seconds),
            ms_per_frame_single: per_frame(ms_single),
            ms_per_frame_multi: per_frame(ms_multi),
            realtime_factor_single: realtime(ms_single),
            realtime_factor_multi: realtime(ms_multi),
            dispatched: outcome.frames_dispatched,
            skipped: outcome.frames_skipped,
            restarts: outcome.restarts,
            exit: outcome.exit,
        }
    }

    pub fn log(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }

    /// Append this report as one CSV row, writing the header for a new file
    pub fn append_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open timing log {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
        writer.serialize(TimingRecord::new(self, Utc::now()))?;
        writer.flush()?;
        Ok(())
    }
}

fn opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "======================")?;
        writeln!(f, "{} Frames ({} fps)", self.frames, opt(self.source_fps, 1))?;
        writeln!(f, "{}ms per frame (single core)", opt(self.ms_per_frame_single, 2))?;
        writeln!(f, "{}ms per frame (multi core)", opt(self.ms_per_frame_multi, 2))?;
        writeln!(f, "{}x (single core)", opt(self.realtime_factor_single, 3))?;
        writeln!(f, "{}x (multi core)", opt(self.realtime_factor_multi, 3))?;
        writeln!(
            f,
            "{} dispatched, {} skipped, {} restarts ({:?})",
            self.dispatched, self.skipped, self.restarts, self.exit
        )?;
        write!(f, "======================")
    }
}

/// Flat CSV row for the timing log
#[derive(Debug, Serialize)]
struct TimingRecord {
    recorded_at: DateTime<Utc>,
    frames: usize,
    source_seconds: f64,
    source_fps: Option<f64>,
    ms_per_frame_single: Option<f64>,
    ms_per_frame_multi: Option<f64>,
    realtime_factor_single: Option<f64>,
    realtime_factor_multi: Option<f64>,
    dispatched: usize,
    skipped: usize,
    restarts: usize,
    exit: LoopExit,
}

impl TimingRecord {
    fn new(report: &BenchmarkReport, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            frames: report.frames,
            source_seconds: report.source_seconds,
            source_fps: report.source_fps,
            ms_per_frame_single: report.ms_per_frame_single,
            ms_per_frame_multi: report.ms_per_frame_multi,
            realtime_factor_single: report.realtime_factor_single,
            realtime_factor_multi: report.realtime_factor_multi,
            dispatched: report.dispatched,
            skipped: report.skipped,
            restarts: report.restarts,
            exit: report.exit,
        }
    }
}
