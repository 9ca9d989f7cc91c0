pub mod frame;
pub mod timeline;

pub use frame::Frame;
pub use timeline::{PlaybackEntry, PlaybackRange, Timeline};
