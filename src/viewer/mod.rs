pub mod console;

pub use console::ConsoleViewer;

use crate::pipeline::PipelineState;

/// Snapshot pushed from the pipeline to an attached viewer
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerUpdate {
    /// Dataset index of the frame just processed
    pub frame_index: usize,
    /// Timestamp of that frame in seconds
    pub timestamp: f64,
    /// Pipeline health after the frame
    pub state: PipelineState,
    /// Number of keyframes currently held by the pipeline
    pub keyframes: usize,
}

/// Trait for live visualizers
///
/// Updates flow one way, from the pipeline into the viewer; a viewer never
/// drives frame submission. [`Viewer::run`] blocks the calling thread and
/// must be invoked on whatever thread the platform requires for UI work
/// (the main thread on macOS). It returns once [`Viewer::stop`] is called.
pub trait Viewer: Send + Sync {
    /// Receive a state update; must not block the caller
    fn publish(&self, update: ViewerUpdate);

    /// Drop all displayed state
    fn reset(&self);

    /// Run the render loop until stopped
    fn run(&self);

    /// Ask the render loop to exit
    fn stop(&self);
}
