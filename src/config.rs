use crate::core::PlaybackRange;
use crate::pipeline::SimulationScript;
use crate::playback::{ExportPlan, PlaybackMode, SessionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write settings to {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Unknown preset {0} (expected 0-3)")]
    UnknownPreset(u8),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Options handed through to the estimation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTuning {
    pub desired_immature_density: u32,
    pub desired_point_density: u32,
    pub min_frames: usize,
    pub max_frames: usize,
    pub max_opt_iterations: u32,
    pub min_opt_iterations: u32,
    /// Benchmark resolution; `None` keeps the source resolution
    pub image_size: Option<(u32, u32)>,
    pub loop_closing: bool,
    pub multi_threading: bool,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            desired_immature_density: 1500,
            desired_point_density: 2000,
            min_frames: 5,
            max_frames: 7,
            max_opt_iterations: 6,
            min_opt_iterations: 1,
            image_size: None,
            loop_closing: true,
            multi_threading: true,
        }
    }
}

impl PipelineTuning {
    /// Behaviour of the simulated pipeline under these options
    pub fn simulation_script(&self) -> SimulationScript {
        SimulationScript {
            keyframe_every: self.min_frames.max(1),
            multi_threading: self.multi_threading,
            loop_closing: self.loop_closing,
            ..Default::default()
        }
    }
}

/// Run settings, persisted as JSON and overridden from the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub start: i64,
    pub end: i64,
    pub reverse: bool,
    /// 0 plays unthrottled, otherwise a factor on recorded time
    pub speed: f64,
    pub preset: Option<u8>,
    pub output: PathBuf,
    pub map_output: PathBuf,
    pub disable_viewer: bool,
    pub quiet: bool,
    pub interactive: bool,
    pub timing_log: Option<PathBuf>,
    pub recovery_window: usize,
    pub pause_poll_ms: u64,
    pub viewer_settle_ms: u64,
    pub tuning: PipelineTuning,
}

impl Default for RunSettings {
    fn default() -> Self {
        let exports = ExportPlan::default();
        Self {
            start: 0,
            end: 100_000,
            reverse: false,
            speed: 1.0,
            preset: None,
            output: exports.trajectory,
            map_output: exports.map,
            disable_viewer: false,
            quiet: false,
            interactive: false,
            timing_log: None,
            recovery_window: 250,
            pause_poll_ms: 5,
            viewer_settle_ms: 0,
            tuning: PipelineTuning::default(),
        }
    }
}

impl RunSettings {
    /// Default settings location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vo-replay").join("settings.json"))
    }

    /// Load from `path`, or from the default location when present
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |reason: String| ConfigError::Write { path: path.to_path_buf(), reason };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        fs::write(path, json).map_err(|e| write_err(e.to_string()))
    }

    /// Overwrite speed and tuning with one of the benchmark presets
    ///
    /// 0 and 1 keep the default densities (unthrottled or real time), 2 and 3
    /// use reduced densities at 424x320 (unthrottled or 5x real time).
    pub fn apply_preset(&mut self, preset: u8) -> Result<(), ConfigError> {
        let tuning = &mut self.tuning;
        match preset {
            0 | 1 => {
                self.speed = if preset == 0 { 0.0 } else { 1.0 };
                tuning.desired_immature_density = 1500;
                tuning.desired_point_density = 2000;
                tuning.min_frames = 5;
                tuning.max_frames = 7;
                tuning.max_opt_iterations = 6;
                tuning.min_opt_iterations = 1;
                tuning.image_size = None;
            }
            2 | 3 => {
                self.speed = if preset == 2 { 0.0 } else { 5.0 };
                tuning.desired_immature_density = 600;
                tuning.desired_point_density = 800;
                tuning.min_frames = 4;
                tuning.max_frames = 6;
                tuning.max_opt_iterations = 4;
                tuning.min_opt_iterations = 1;
                tuning.image_size = Some((424, 320));
            }
            other => return Err(ConfigError::UnknownPreset(other)),
        }
        self.preset = Some(preset);
        info!("Using preset {} (speed {})", preset, self.speed);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ConfigError::Invalid {
                field: "speed",
                reason: format!("{} is not a finite non-negative factor", self.speed),
            });
        }
        if self.start < 0 {
            return Err(ConfigError::Invalid {
                field: "start",
                reason: format!("{} is negative", self.start),
            });
        }
        if self.end < 0 {
            return Err(ConfigError::Invalid {
                field: "end",
                reason: format!("{} is negative", self.end),
            });
        }
        if self.recovery_window == 0 {
            return Err(ConfigError::Invalid { field: "recovery_window", reason: "must be positive".into() });
        }
        if self.pause_poll_ms == 0 {
            return Err(ConfigError::Invalid { field: "pause_poll_ms", reason: "must be positive".into() });
        }
        Ok(())
    }

    pub fn mode(&self) -> PlaybackMode {
        PlaybackMode::from_speed(self.speed)
    }

    pub fn playback_range(&self, corpus_len: usize) -> PlaybackRange {
        if self.reverse {
            PlaybackRange::reverse(self.start, self.end, corpus_len)
        } else {
            PlaybackRange::forward(self.start, self.end)
        }
    }

    pub fn session(&self, corpus_len: usize) -> SessionConfig {
        let mut session = SessionConfig::new(self.playback_range(corpus_len), self.mode());
        session.recovery_window = self.recovery_window;
        session.pause_poll = Duration::from_millis(self.pause_poll_ms);
        session.viewer_settle = Duration::from_millis(self.viewer_settle_ms);
        session.exports = ExportPlan { trajectory: self.output.clone(), map: self.map_output.clone() };
        session.timing_log = self.timing_log.clone();
        session
    }
}
