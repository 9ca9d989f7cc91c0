use async_trait::async_trait;
use crate::core::Frame;
use crate::viewer::Viewer;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Health of a pipeline as observed after a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Still bootstrapping, no map yet
    Uninitialized,
    /// Initialized and tracking
    Running,
    /// Initialization gave up on the current frames
    FailedInit,
    /// Tracking lost after initialization
    Lost,
}

/// Kind of result written on export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Camera trajectory, one pose per frame
    Trajectory,
    /// Point map
    Map,
}

/// Trait for estimation pipelines driven by the replay loop
///
/// The pipeline is opaque: it accepts frames in order and exposes a few
/// health flags. Any tracking/mapping concurrency is internal and must be
/// settled by [`Pipeline::drain`] before results are exported.
#[async_trait]
pub trait Pipeline: Send {
    /// Get the name/identifier of this pipeline
    fn name(&self) -> &str;

    /// Whether initialization has completed
    fn is_initialized(&self) -> bool;

    /// Whether the last initialization attempt failed
    fn init_failed(&self) -> bool;

    /// Whether tracking has been lost
    fn is_lost(&self) -> bool;

    /// Collapse the health flags into a single state for display
    ///
    /// An init failure takes precedence over loss. Supervision reads the
    /// flags themselves.
    fn state(&self) -> PipelineState {
        if self.init_failed() {
            PipelineState::FailedInit
        } else if self.is_lost() {
            PipelineState::Lost
        } else if self.is_initialized() {
            PipelineState::Running
        } else {
            PipelineState::Uninitialized
        }
    }

    /// Supply the photometric response table
    fn set_gamma(&mut self, gamma: &[f32]);

    /// Serialize tracking and mapping instead of overlapping them
    fn set_linearize(&mut self, linearize: bool);

    /// Attach a viewer that receives state updates
    fn attach_viewer(&mut self, viewer: Arc<dyn Viewer>);

    /// Hand a frame to the pipeline
    async fn submit(&mut self, frame: &Frame, index: usize) -> PipelineResult<()>;

    /// Block until all background work has finished
    async fn drain(&mut self) -> PipelineResult<()>;

    /// Write results to `destination`
    async fn export_result(
        &mut self,
        destination: &Path,
        kind: ExportKind,
        apply_late_correction: bool,
    ) -> PipelineResult<()>;
}

/// Constructs fresh pipeline instances for the supervisor
pub trait PipelineFactory: Send + Sync {
    fn create(&self) -> PipelineResult<Box<dyn Pipeline>>;
}

impl<F> PipelineFactory for F
where
    F: Fn() -> PipelineResult<Box<dyn Pipeline>> + Send + Sync,
{
    fn create(&self) -> PipelineResult<Box<dyn Pipeline>> {
        self()
    }
}
