//! Screen streaming: per-device capture loops and frame transcoding.

mod engine;
mod transcode;

pub use engine::{StreamConfig, StreamEngine, StreamInfo};
pub use transcode::{EncodedFrame, FrameTranscoder, TranscodeConfig};
