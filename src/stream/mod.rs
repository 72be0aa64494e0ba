// Firehose — event envelope types and the websocket frame source.

pub mod event;
pub mod source;

pub use event::StreamEvent;
pub use source::{FrameSource, JetstreamSource, ReplaySource};
