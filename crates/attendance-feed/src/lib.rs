//! attendance-feed — Face sources for the detection cycle.
//!
//! Provides a recorded feed that replays captured frames (detections plus
//! optional imagery) from a JSON Lines file, and the snapshot helpers used
//! to turn frames into image data URIs.

pub mod replay;
pub mod snapshot;

pub use replay::{FeedError, RecordedFrame, ReplaySource};
