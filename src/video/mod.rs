//! # Video Watermarking Module
//!
//! Decodes a source video, draws the watermark overlay onto every frame and
//! re-encodes the result, with progress reporting and a passthrough fast path
//! when no watermark is configured.

pub mod backend;
pub mod clock;
pub mod ffmpeg;
pub mod negotiation;
pub mod pipeline;
pub mod progress;
pub mod types;

pub use backend::{DecodedVideo, EncoderFactory, StreamEncoder, VideoDecoder};
pub use clock::{FrameClock, IntervalClock};
pub use ffmpeg::{FfmpegDecoder, FfmpegEncoderFactory};
pub use negotiation::{negotiate, EncodingCandidate};
pub use pipeline::{watermark_video, ClockFactory, PipelineState, VideoWatermarker};
pub use progress::{ProgressCallback, ProgressReporter};
pub use types::{ContainerFormat, EncodedVideo, Frame, VideoCodec, VideoInput, VideoMetadata};
