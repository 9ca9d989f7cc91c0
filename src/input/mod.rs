pub mod source;
pub mod synthetic;

pub use source::{FrameSource, SourceError};
pub use synthetic::SyntheticSequence;
