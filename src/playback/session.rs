use crate::core::{PlaybackRange, Timeline};
use crate::input::FrameSource;
use crate::pipeline::PipelineFactory;
use crate::playback::benchmark::BenchmarkReport;
use crate::playback::control::ControlSurface;
use crate::playback::engine::{PlaybackEngine, DEFAULT_PAUSE_POLL};
use crate::playback::error::Result;
use crate::playback::shutdown::{ExportPlan, ShutdownCoordinator, ViewerStopGuard};
use crate::playback::supervisor::{PipelineSupervisor, DEFAULT_RECOVERY_WINDOW};
use crate::playback::PlaybackMode;
use crate::viewer::Viewer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything a single replay needs besides its collaborators
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub range: PlaybackRange,
    pub mode: PlaybackMode,
    pub recovery_window: usize,
    pub pause_poll: Duration,
    pub viewer_settle: Duration,
    pub exports: ExportPlan,
    pub timing_log: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(range: PlaybackRange, mode: PlaybackMode) -> Self {
        Self {
            range,
            mode,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            pause_poll: DEFAULT_PAUSE_POLL,
            viewer_settle: Duration::ZERO,
            exports: ExportPlan::default(),
            timing_log: None,
        }
    }
}

/// Replay `source` through pipelines built by `factory`, then shut down
///
/// This is the body of the processing context. The viewer is stopped when
/// it returns or unwinds. Results are exported even when the loop ends on an
/// error; a loop error takes precedence over a drain error.
pub async fn run_session(
    source: Arc<dyn FrameSource>,
    factory: Arc<dyn PipelineFactory>,
    viewer: Option<Arc<dyn Viewer>>,
    control: ControlSurface,
    config: SessionConfig,
) -> Result<BenchmarkReport> {
    let _stop_viewer = ViewerStopGuard::new(viewer.clone());

    if source.is_empty() {
        warn!("{} holds no frames", source.name());
    }

    let gamma = source.photometric_gamma();
    if gamma.is_none() {
        debug!("{} has no photometric response", source.name());
    }

    let timeline = Timeline::build(source.as_ref(), config.range, config.mode.speed());
    let supervisor = PipelineSupervisor::launch(factory, gamma, config.mode, viewer)?
        .with_recovery_window(config.recovery_window)
        .with_settle_delay(config.viewer_settle);

    let mut engine = PlaybackEngine::new(source, timeline, config.mode, control, supervisor)
        .with_pause_poll(config.pause_poll);
    let looped = engine.run().await;

    let (mut supervisor, clock, mut outcome) = engine.into_parts();
    let drained = ShutdownCoordinator::new(config.exports)
        .finish(supervisor.pipeline_mut(), &clock, &mut outcome)
        .await;

    let report = BenchmarkReport::from_outcome(&outcome);
    report.log();
    if let Some(path) = &config.timing_log {
        if let Err(e) = report.append_to(path) {
            warn!("Failed to append timing log: {:#}", e);
        }
    }

    looped?;
    drained?;
    Ok(report)
}
