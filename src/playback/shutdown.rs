use crate::pipeline::{ExportKind, Pipeline};
use crate::playback::clock::PlaybackClock;
use crate::playback::error::{PlaybackError, Result};
use crate::playback::RunOutcome;
use crate::viewer::Viewer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Where results are written once playback is over
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    /// Trajectory with late correction; the raw one goes next to it with a `.noloop` suffix
    pub trajectory: PathBuf,
    /// Map with late correction
    pub map: PathBuf,
}

impl Default for ExportPlan {
    fn default() -> Self {
        Self {
            trajectory: PathBuf::from("results.txt"),
            map: PathBuf::from("map.json"),
        }
    }
}

impl ExportPlan {
    /// Artifacts in the order they are written: (destination, kind, late correction)
    pub fn artifacts(&self) -> Vec<(PathBuf, ExportKind, bool)> {
        let mut raw = self.trajectory.clone().into_os_string();
        raw.push(".noloop");

        vec![
            (self.trajectory.clone(), ExportKind::Trajectory, true),
            (PathBuf::from(raw), ExportKind::Trajectory, false),
            (self.map.clone(), ExportKind::Map, true),
        ]
    }
}

/// Drains the pipeline and writes results after the playback loop
pub struct ShutdownCoordinator {
    plan: ExportPlan,
}

impl ShutdownCoordinator {
    pub fn new(plan: ExportPlan) -> Self {
        Self { plan }
    }

    /// Wait for the pipeline to settle, then export
    ///
    /// Timing is captured once the drain returns. Export is attempted even if
    /// draining failed; the drain error is returned afterwards.
    pub async fn finish(
        &self,
        pipeline: &mut dyn Pipeline,
        clock: &PlaybackClock,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        info!("Waiting for pipeline {} to finish", pipeline.name());
        let drained = match pipeline.drain().await {
            Ok(()) => Ok(()),
            Err(e) => Err(PlaybackError::Drain {
                pipeline: pipeline.name().to_string(),
                reason: e.to_string(),
            }),
        };
        outcome.record_timing(clock);

        if let Err(e) = &drained {
            warn!("{}; exporting partial results", e);
        }

        let written = self.export(pipeline).await;
        info!("Exported {} of {} result files", written, self.plan.artifacts().len());

        drained
    }

    /// Write every artifact, returning how many succeeded
    async fn export(&self, pipeline: &mut dyn Pipeline) -> usize {
        let mut written = 0;
        for (destination, kind, late_correction) in self.plan.artifacts() {
            match pipeline.export_result(&destination, kind, late_correction).await {
                Ok(()) => {
                    info!("Wrote {:?} to {}", kind, destination.display());
                    written += 1;
                }
                Err(e) => warn!("Failed to write {}: {}", destination.display(), e),
            }
        }
        written
    }
}

/// Stops the viewer when the processing context ends, however it ends
pub struct ViewerStopGuard {
    viewer: Option<Arc<dyn Viewer>>,
}

impl ViewerStopGuard {
    pub fn new(viewer: Option<Arc<dyn Viewer>>) -> Self {
        Self { viewer }
    }
}

impl Drop for ViewerStopGuard {
    fn drop(&mut self) {
        if let Some(viewer) = self.viewer.take() {
            viewer.stop();
        }
    }
}

/// Run the viewer on this thread, then wait for the processing task
///
/// The viewer loop must own the calling thread on platforms that only allow
/// UI work on the main thread. Without a viewer this just joins.
pub fn join_contexts<T>(
    runtime: &Runtime,
    processing: JoinHandle<Result<T>>,
    viewer: Option<Arc<dyn Viewer>>,
) -> Result<T> {
    if let Some(viewer) = viewer {
        viewer.run();
    }

    match runtime.block_on(processing) {
        Ok(result) => result,
        Err(e) => Err(PlaybackError::Join(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frame;
    use crate::pipeline::interface::PipelineResult;
    use crate::pipeline::simulated::PipelineCall;
    use crate::pipeline::{SimulatedPipeline, SimulationScript};
    use crate::viewer::ConsoleViewer;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    fn temp_plan(tag: &str) -> (PathBuf, ExportPlan) {
        let dir = std::env::temp_dir().join(format!("vo-replay-{}-{}", tag, std::process::id()));
        let plan = ExportPlan { trajectory: dir.join("result.txt"), map: dir.join("map.json") };
        (dir, plan)
    }

    #[test]
    fn test_artifacts() {
        let plan = ExportPlan::default();
        let artifacts = plan.artifacts();
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[0], (PathBuf::from("results.txt"), ExportKind::Trajectory, true));
        assert_eq!(artifacts[1], (PathBuf::from("results.txt.noloop"), ExportKind::Trajectory, false));
        assert_eq!(artifacts[2], (PathBuf::from("map.json"), ExportKind::Map, true));
    }

    #[tokio::test]
    async fn test_export_follows_drain() {
        let (dir, plan) = temp_plan("drain");
        let journal = SimulatedPipeline::journal();
        let script = SimulationScript {
            init_after: 1,
            keyframe_every: 1,
            mapping_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let mut pipeline = SimulatedPipeline::new(0, script, journal.clone());
        for i in 0..5 {
            pipeline.submit(&Frame::new(2, 2, 1.0, i as f64), i).await.unwrap();
        }

        let mut clock = PlaybackClock::new();
        clock.anchor(0.0);
        let mut outcome = RunOutcome::default();

        ShutdownCoordinator::new(plan)
            .finish(&mut pipeline, &clock, &mut outcome)
            .await
            .unwrap();

        let calls = journal.lock().unwrap().clone();
        let drained = calls.iter().position(|c| *c == PipelineCall::Drained { instance: 0 }).unwrap();
        let exports: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, PipelineCall::Export { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(exports.len(), 3);
        assert!(exports.iter().all(|&i| i > drained));
        assert!(outcome.wall_time >= Duration::from_millis(10));

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Pipeline whose drain always fails
    struct StuckPipeline {
        exports: usize,
    }

    #[async_trait]
    impl Pipeline for StuckPipeline {
        fn name(&self) -> &str {
            "stuck"
        }
        fn is_initialized(&self) -> bool {
            true
        }
        fn init_failed(&self) -> bool {
            false
        }
        fn is_lost(&self) -> bool {
            false
        }
        fn set_gamma(&mut self, _gamma: &[f32]) {}
        fn set_linearize(&mut self, _linearize: bool) {}
        fn attach_viewer(&mut self, _viewer: Arc<dyn Viewer>) {}
        async fn submit(&mut self, _frame: &Frame, _index: usize) -> PipelineResult<()> {
            Ok(())
        }
        async fn drain(&mut self) -> PipelineResult<()> {
            Err("mapping thread died".into())
        }
        async fn export_result(
            &mut self,
            _destination: &Path,
            _kind: ExportKind,
            _late_correction: bool,
        ) -> PipelineResult<()> {
            self.exports += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drain_failure_still_exports() {
        let mut pipeline = StuckPipeline { exports: 0 };
        let clock = PlaybackClock::new();
        let mut outcome = RunOutcome::default();

        let result = ShutdownCoordinator::new(ExportPlan::default())
            .finish(&mut pipeline, &clock, &mut outcome)
            .await;

        match result {
            Err(PlaybackError::Drain { pipeline: name, reason }) => {
                assert_eq!(name, "stuck");
                assert!(reason.contains("mapping thread"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(pipeline.exports, 3);
    }

    #[test]
    fn test_join_contexts_with_viewer() {
        let runtime = Runtime::new().unwrap();
        let viewer: Arc<dyn Viewer> = Arc::new(ConsoleViewer::new("test", 10));

        let processing = {
            let guard = ViewerStopGuard::new(Some(viewer.clone()));
            runtime.spawn(async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, PlaybackError>(42)
            })
        };

        assert_eq!(join_contexts(&runtime, processing, Some(viewer)).unwrap(), 42);
    }

    #[test]
    fn test_join_contexts_reports_panic() {
        let runtime = Runtime::new().unwrap();
        let viewer: Arc<dyn Viewer> = Arc::new(ConsoleViewer::new("test", 10));

        let processing = {
            let guard = ViewerStopGuard::new(Some(viewer.clone()));
            runtime.spawn(async move {
                let _guard = guard;
                let value: Option<u32> = None;
                Ok::<u32, PlaybackError>(value.expect("processing blew up"))
            })
        };

        match join_contexts(&runtime, processing, Some(viewer)) {
            Err(PlaybackError::Join(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
