use crate::pipeline::{Pipeline, PipelineFactory};
use crate::playback::control::ControlSurface;
use crate::playback::error::{PlaybackError, Result};
use crate::playback::PlaybackMode;
use crate::viewer::Viewer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Timeline positions during which a failed initialization is retried automatically
pub const DEFAULT_RECOVERY_WINDOW: usize = 250;

/// What the replay loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep going with the current pipeline
    Continue,
    /// The pipeline was replaced by a fresh instance
    Restart,
    /// Tracking is gone for good, leave the loop
    Stop,
}

/// Health flags read from the pipeline after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub init_failed: bool,
    pub lost: bool,
}

impl Health {
    pub fn of(pipeline: &dyn Pipeline) -> Self {
        Self { init_failed: pipeline.init_failed(), lost: pipeline.is_lost() }
    }
}

/// Decide how to react to the pipeline health observed at timeline `position`
///
/// A reset request always wins. Init failures are only retried inside the
/// recovery window. Loss stops the loop whenever no restart happens, even if
/// the pipeline also reports an init failure.
pub fn verdict(health: Health, reset_requested: bool, position: usize, recovery_window: usize) -> Verdict {
    let recoverable = health.init_failed && position < recovery_window;
    if reset_requested || recoverable {
        Verdict::Restart
    } else if health.lost {
        Verdict::Stop
    } else {
        Verdict::Continue
    }
}

/// Owns the live pipeline and replaces it when it fails
pub struct PipelineSupervisor {
    factory: Arc<dyn PipelineFactory>,
    pipeline: Box<dyn Pipeline>,
    gamma: Option<Vec<f32>>,
    linearize: bool,
    viewer: Option<Arc<dyn Viewer>>,
    recovery_window: usize,
    settle_delay: Duration,
    restarts: usize,
}

impl PipelineSupervisor {
    /// Create the first pipeline and attach the viewer to it
    pub fn launch(
        factory: Arc<dyn PipelineFactory>,
        gamma: Option<Vec<f32>>,
        mode: PlaybackMode,
        viewer: Option<Arc<dyn Viewer>>,
    ) -> Result<Self> {
        let linearize = mode.linearize();
        let mut pipeline = Self::build(factory.as_ref(), gamma.as_deref(), linearize)?;
        if let Some(viewer) = &viewer {
            pipeline.attach_viewer(viewer.clone());
        }
        info!("Started pipeline {} (linearized: {})", pipeline.name(), linearize);

        Ok(Self {
            factory,
            pipeline,
            gamma,
            linearize,
            viewer,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            settle_delay: Duration::ZERO,
            restarts: 0,
        })
    }

    /// Override the automatic recovery window
    pub fn with_recovery_window(mut self, recovery_window: usize) -> Self {
        self.recovery_window = recovery_window;
        self
    }

    /// Pause after a viewer reset so it can settle before re-attaching
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn pipeline(&self) -> &dyn Pipeline {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> &mut dyn Pipeline {
        self.pipeline.as_mut()
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// React to the pipeline state after the frame at timeline `position`
    pub async fn observe(&mut self, position: usize, control: &ControlSurface) -> Result<Verdict> {
        let health = Health::of(self.pipeline.as_ref());
        let reset_requested = control.reset_requested();

        let decision = verdict(health, reset_requested, position, self.recovery_window);
        match decision {
            Verdict::Restart => {
                info!(
                    "Resetting pipeline {} at position {} ({})",
                    self.pipeline.name(),
                    position,
                    if reset_requested { "requested" } else { "initialization failed" }
                );
                self.restart().await?;
                control.clear_reset();
            }
            Verdict::Stop => {
                info!("Pipeline {} lost tracking at position {}", self.pipeline.name(), position);
            }
            Verdict::Continue if health.init_failed => {
                debug!(
                    "Pipeline {} failed to initialize at position {}, outside the recovery window",
                    self.pipeline.name(),
                    position
                );
            }
            Verdict::Continue => {}
        }

        Ok(decision)
    }

    async fn restart(&mut self) -> Result<()> {
        self.pipeline = Self::build(self.factory.as_ref(), self.gamma.as_deref(), self.linearize)?;

        if let Some(viewer) = self.viewer.clone() {
            viewer.reset();
            if !self.settle_delay.is_zero() {
                tokio::time::sleep(self.settle_delay).await;
            }
            self.pipeline.attach_viewer(viewer);
        }

        self.restarts += 1;
        Ok(())
    }

    fn build(
        factory: &dyn PipelineFactory,
        gamma: Option<&[f32]>,
        linearize: bool,
    ) -> Result<Box<dyn Pipeline>> {
        let mut pipeline = factory
            .create()
            .map_err(|e| PlaybackError::Create(e.to_string()))?;
        if let Some(gamma) = gamma {
            pipeline.set_gamma(gamma);
        }
        pipeline.set_linearize(linearize);
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frame;
    use crate::pipeline::interface::PipelineResult;
    use crate::pipeline::simulated::{Journal, PipelineCall};
    use crate::pipeline::{PipelineState, SimulatedPipeline, SimulationScript};
    use crate::viewer::ConsoleViewer;

    const HEALTHY: Health = Health { init_failed: false, lost: false };
    const FAILED: Health = Health { init_failed: true, lost: false };
    const LOST: Health = Health { init_failed: false, lost: true };
    const FAILED_AND_LOST: Health = Health { init_failed: true, lost: true };

    #[test]
    fn test_init_failure_inside_window_restarts() {
        assert_eq!(verdict(FAILED, false, 10, 250), Verdict::Restart);
        assert_eq!(verdict(FAILED, false, 249, 250), Verdict::Restart);
        assert_eq!(verdict(FAILED_AND_LOST, false, 10, 250), Verdict::Restart);
    }

    #[test]
    fn test_init_failure_outside_window_is_ignored() {
        assert_eq!(verdict(FAILED, false, 250, 250), Verdict::Continue);
        assert_eq!(verdict(FAILED, false, 300, 250), Verdict::Continue);
    }

    #[test]
    fn test_reset_request_always_restarts() {
        for health in [HEALTHY, FAILED, LOST, FAILED_AND_LOST] {
            for position in [0, 249, 250, 10_000] {
                assert_eq!(verdict(health, true, position, 250), Verdict::Restart);
            }
        }
    }

    #[test]
    fn test_lost_stops_regardless_of_position() {
        assert_eq!(verdict(LOST, false, 0, 250), Verdict::Stop);
        assert_eq!(verdict(LOST, false, 5_000, 250), Verdict::Stop);
    }

    #[test]
    fn test_lost_with_late_init_failure_stops() {
        assert_eq!(verdict(FAILED_AND_LOST, false, 300, 250), Verdict::Stop);
    }

    #[test]
    fn test_healthy_continues() {
        assert_eq!(verdict(HEALTHY, false, 3, 250), Verdict::Continue);
    }

    fn failing_factory(journal: Journal) -> Arc<dyn PipelineFactory> {
        let script = SimulationScript { init_after: 1, failing_instances: 1, ..Default::default() };
        Arc::new(SimulatedPipeline::factory(script, journal))
    }

    #[tokio::test]
    async fn test_restart_reconfigures_fresh_pipeline() {
        let journal = SimulatedPipeline::journal();
        let viewer: Arc<dyn Viewer> = Arc::new(ConsoleViewer::new("test", 100));
        let mut supervisor = PipelineSupervisor::launch(
            failing_factory(journal.clone()),
            Some(vec![0.0, 1.0, 2.0]),
            PlaybackMode::Unthrottled,
            Some(viewer),
        )
        .unwrap();
        let control = ControlSurface::new();

        supervisor.pipeline_mut().submit(&Frame::new(2, 2, 1.0, 0.0), 0).await.unwrap();
        assert_eq!(supervisor.pipeline().state(), PipelineState::FailedInit);

        let decision = supervisor.observe(0, &control).await.unwrap();
        assert_eq!(decision, Verdict::Restart);
        assert_eq!(supervisor.restarts(), 1);
        assert_eq!(supervisor.pipeline().state(), PipelineState::Uninitialized);

        let calls = journal.lock().unwrap().clone();
        let second: Vec<_> = calls
            .iter()
            .filter(|c| match c {
                PipelineCall::Created { instance }
                | PipelineCall::Gamma { instance, .. }
                | PipelineCall::Linearize { instance, .. }
                | PipelineCall::AttachViewer { instance } => *instance == 1,
                _ => false,
            })
            .cloned()
            .collect();
        assert_eq!(
            second,
            vec![
                PipelineCall::Created { instance: 1 },
                PipelineCall::Gamma { instance: 1, entries: 3 },
                PipelineCall::Linearize { instance: 1, enabled: true },
                PipelineCall::AttachViewer { instance: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_late_init_failure_is_not_restarted() {
        let journal = SimulatedPipeline::journal();
        let mut supervisor = PipelineSupervisor::launch(
            failing_factory(journal),
            None,
            PlaybackMode::RatePaced { speed: 1.0 },
            None,
        )
        .unwrap();
        let control = ControlSurface::new();

        supervisor.pipeline_mut().submit(&Frame::new(2, 2, 1.0, 0.0), 300).await.unwrap();
        let decision = supervisor.observe(300, &control).await.unwrap();
        assert_eq!(decision, Verdict::Continue);
        assert_eq!(supervisor.restarts(), 0);
        assert_eq!(supervisor.pipeline().name(), "sim0");
    }

    #[tokio::test]
    async fn test_reset_request_is_cleared_after_restart() {
        let journal = SimulatedPipeline::journal();
        let factory: Arc<dyn PipelineFactory> =
            Arc::new(SimulatedPipeline::factory(SimulationScript::default(), journal));
        let mut supervisor =
            PipelineSupervisor::launch(factory, None, PlaybackMode::RatePaced { speed: 1.0 }, None)
                .unwrap()
                .with_recovery_window(0);
        let control = ControlSurface::new();
        control.request_reset();

        assert_eq!(supervisor.observe(10_000, &control).await.unwrap(), Verdict::Restart);
        assert!(!control.reset_requested());
        assert_eq!(supervisor.pipeline().name(), "sim1");
    }

    #[tokio::test]
    async fn test_factory_error_is_reported() {
        let factory: Arc<dyn PipelineFactory> = Arc::new(|| -> PipelineResult<Box<dyn Pipeline>> {
            Err("vocabulary missing".into())
        });
        let result = PipelineSupervisor::launch(factory, None, PlaybackMode::Unthrottled, None);
        match result {
            Err(PlaybackError::Create(reason)) => assert!(reason.contains("vocabulary")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("launch should fail"),
        }
    }
}
