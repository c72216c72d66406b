//! Seams between the frame loop and the media runtime.
//!
//! The pipeline only talks to these traits; [`super::ffmpeg`] provides the
//! production implementations and tests plug in in-process fakes.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::lifecycle::Release;
use crate::raster::Surface;
use crate::video::negotiation::EncodingCandidate;
use crate::video::types::{Frame, VideoMetadata};

/// Opens source videos
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    /// Read the source's metadata. Failures are `VideoLoad` errors.
    async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>>;
}

/// An opened, muted source video
#[async_trait]
pub trait DecodedVideo: Release + Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Start playback from time zero
    async fn play(&mut self) -> Result<()>;

    /// The next frame in source order, or `None` once the source has ended
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_paused(&self) -> bool;

    fn has_ended(&self) -> bool;
}

/// Creates streaming encoders and answers capability checks
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn is_supported(&self, candidate: &EncodingCandidate) -> bool;

    /// Build an encoder fed with `width` x `height` RGBA frames at `fps`
    async fn create(
        &self,
        candidate: &EncodingCandidate,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn StreamEncoder>>;
}

/// Encoder fed from a raster surface, delivering output in chunks
#[async_trait]
pub trait StreamEncoder: Release + Send {
    /// Start encoding; encoded chunks arrive on the returned channel, which
    /// closes once the encoder has stopped
    async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>>;

    /// Capture the surface as the next frame
    async fn push_frame(&mut self, surface: &Surface) -> Result<()>;

    /// Flush and wait for the encoder to finish
    async fn stop(&mut self) -> Result<()>;
}
