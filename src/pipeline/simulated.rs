use async_trait::async_trait;
use crate::core::Frame;
use crate::pipeline::interface::{ExportKind, Pipeline, PipelineFactory, PipelineResult};
use crate::viewer::{Viewer, ViewerUpdate};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Behaviour knobs for [`SimulatedPipeline`]
#[derive(Debug, Clone)]
pub struct SimulationScript {
    /// Submissions an instance needs before it reports initialized
    pub init_after: usize,
    /// The first `failing_instances` instances fail initialization instead
    pub failing_instances: usize,
    /// Dataset index at which an initialized instance loses tracking
    pub lose_at_frame: Option<usize>,
    /// A keyframe (and its mapping job) is created every n submissions
    pub keyframe_every: usize,
    /// Time spent by each mapping job
    pub mapping_delay: Duration,
    /// Time each submission takes while the instance is still bootstrapping
    pub init_delay: Duration,
    /// Run mapping jobs in the background instead of inline
    pub multi_threading: bool,
    /// Whether late correction actually corrects anything
    pub loop_closing: bool,
}

impl Default for SimulationScript {
    fn default() -> Self {
        Self {
            init_after: 5,
            failing_instances: 0,
            lose_at_frame: None,
            keyframe_every: 5,
            mapping_delay: Duration::ZERO,
            init_delay: Duration::ZERO,
            multi_threading: true,
            loop_closing: true,
        }
    }
}

/// Call recorded by a simulated pipeline, tagged with its instance number
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCall {
    Created { instance: usize },
    Gamma { instance: usize, entries: usize },
    Linearize { instance: usize, enabled: bool },
    AttachViewer { instance: usize },
    Submit { instance: usize, index: usize },
    Drained { instance: usize },
    Export { instance: usize, kind: ExportKind, late_correction: bool, destination: PathBuf },
}

/// Shared, ordered record of pipeline calls across instances
pub type Journal = Arc<Mutex<Vec<PipelineCall>>>;

#[derive(Serialize)]
struct MapSummary {
    instance: usize,
    keyframes: usize,
    frames: usize,
    late_correction: bool,
    photometric: bool,
}

/// Stand-in estimation pipeline with scriptable health transitions
///
/// Used when no real pipeline is linked and for exercising the replay loop
/// in tests. Keyframes spawn fake mapping jobs so that draining has
/// something to wait for.
pub struct SimulatedPipeline {
    name: String,
    instance: usize,
    script: SimulationScript,
    journal: Journal,
    initialized: bool,
    init_failed: bool,
    lost: bool,
    linearize: bool,
    gamma: Option<Vec<f32>>,
    viewer: Option<Arc<dyn Viewer>>,
    submissions: usize,
    /// (index, timestamp) of every submitted frame
    poses: Vec<(usize, f64)>,
    keyframes: usize,
    mapping_jobs: Vec<JoinHandle<()>>,
}

impl SimulatedPipeline {
    pub fn new(instance: usize, script: SimulationScript, journal: Journal) -> Self {
        let pipeline = Self {
            name: format!("sim{}", instance),
            instance,
            script,
            journal,
            initialized: false,
            init_failed: false,
            lost: false,
            linearize: false,
            gamma: None,
            viewer: None,
            submissions: 0,
            poses: Vec::new(),
            keyframes: 0,
            mapping_jobs: Vec::new(),
        };
        pipeline.record(PipelineCall::Created { instance });
        pipeline
    }

    /// Build a factory that numbers instances in creation order
    pub fn factory(script: SimulationScript, journal: Journal) -> impl PipelineFactory {
        let next_instance = AtomicUsize::new(0);
        move || -> PipelineResult<Box<dyn Pipeline>> {
            let instance = next_instance.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SimulatedPipeline::new(instance, script.clone(), journal.clone())))
        }
    }

    /// Create an empty journal
    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(&self, call: PipelineCall) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(call);
        }
    }

    fn advance_state(&mut self, index: usize) {
        if !self.initialized && !self.init_failed && self.submissions >= self.script.init_after {
            if self.instance < self.script.failing_instances {
                self.init_failed = true;
            } else {
                self.initialized = true;
            }
        }

        if self.initialized && self.script.lose_at_frame == Some(index) {
            self.lost = true;
        }
    }

    async fn map_keyframe(&mut self) {
        self.keyframes += 1;
        let delay = self.script.mapping_delay;
        if delay.is_zero() {
            return;
        }

        if self.linearize || !self.script.multi_threading {
            tokio::time::sleep(delay).await;
        } else {
            self.mapping_jobs.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
            }));
        }
    }

    fn write_trajectory(&self, destination: &Path, late_correction: bool) -> PipelineResult<()> {
        let mut out = BufWriter::new(fs::File::create(destination)?);
        let corrected = late_correction && self.script.loop_closing;
        for (n, (_, timestamp)) in self.poses.iter().enumerate() {
            // uncorrected trajectories accumulate scale drift
            let scale = if corrected { 1.0 } else { 1.0 + 0.001 * n as f64 };
            let z = timestamp * scale;
            writeln!(out, "1 0 0 0 0 1 0 0 0 0 1 {:.6}", z)?;
        }
        out.flush()?;
        Ok(())
    }

    fn write_map(&self, destination: &Path, late_correction: bool) -> PipelineResult<()> {
        let summary = MapSummary {
            instance: self.instance,
            keyframes: self.keyframes,
            frames: self.poses.len(),
            late_correction: late_correction && self.script.loop_closing,
            photometric: self.gamma.is_some(),
        };
        fs::write(destination, serde_json::to_string_pretty(&summary)?)?;
        Ok(())
    }
}

#[async_trait]
impl Pipeline for SimulatedPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn init_failed(&self) -> bool {
        self.init_failed
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn set_gamma(&mut self, gamma: &[f32]) {
        self.gamma = Some(gamma.to_vec());
        self.record(PipelineCall::Gamma { instance: self.instance, entries: gamma.len() });
    }

    fn set_linearize(&mut self, linearize: bool) {
        self.linearize = linearize;
        self.record(PipelineCall::Linearize { instance: self.instance, enabled: linearize });
    }

    fn attach_viewer(&mut self, viewer: Arc<dyn Viewer>) {
        self.viewer = Some(viewer);
        self.record(PipelineCall::AttachViewer { instance: self.instance });
    }

    async fn submit(&mut self, frame: &Frame, index: usize) -> PipelineResult<()> {
        if frame.pixel_count() == 0 {
            return Err(format!("frame {} has an empty image", index).into());
        }

        self.record(PipelineCall::Submit { instance: self.instance, index });
        if !self.initialized && !self.script.init_delay.is_zero() {
            tokio::time::sleep(self.script.init_delay).await;
        }
        self.submissions += 1;
        self.advance_state(index);

        if self.initialized && !self.lost {
            self.poses.push((index, frame.timestamp));
            if self.poses.len() % self.script.keyframe_every.max(1) == 0 {
                self.map_keyframe().await;
            }
        }

        if let Some(viewer) = &self.viewer {
            viewer.publish(ViewerUpdate {
                frame_index: index,
                timestamp: frame.timestamp,
                state: self.state(),
                keyframes: self.keyframes,
            });
        }

        Ok(())
    }

    async fn drain(&mut self) -> PipelineResult<()> {
        let jobs = std::mem::take(&mut self.mapping_jobs);
        debug!("{}: waiting for {} mapping jobs", self.name, jobs.len());
        for job in jobs {
            job.await?;
        }
        self.record(PipelineCall::Drained { instance: self.instance });
        Ok(())
    }

    async fn export_result(
        &mut self,
        destination: &Path,
        kind: ExportKind,
        apply_late_correction: bool,
    ) -> PipelineResult<()> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match kind {
            ExportKind::Trajectory => self.write_trajectory(destination, apply_late_correction)?,
            ExportKind::Map => self.write_map(destination, apply_late_correction)?,
        }

        self.record(PipelineCall::Export {
            instance: self.instance,
            kind,
            late_correction: apply_late_correction,
            destination: destination.to_path_buf(),
        });
        Ok(())
    }
}
