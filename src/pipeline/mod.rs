pub mod interface;
pub mod simulated;

pub use interface::{ExportKind, Pipeline, PipelineFactory, PipelineState};
pub use simulated::{SimulatedPipeline, SimulationScript};
