//! Frame-by-frame video watermarking.
//!
//! A run moves through `Loading -> (Passthrough | Encoding) -> Finalizing ->
//! (Done | Failed)`. Every handle the run acquires (staged temp file, decoded
//! video, raster surface, encoder) is held in a [`Scoped`] guard owned by the
//! run, so it is released on success, on error and when the future is dropped.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::compositor::WatermarkOverlay;
use crate::config::Config;
use crate::error::{MediaError, Result, StudioError};
use crate::lifecycle::{EphemeralFile, Scoped};
use crate::raster::{FontBook, Surface, WatermarkImage};
use crate::settings::{Palette, WatermarkSettings};
use crate::video::backend::{DecodedVideo, EncoderFactory, StreamEncoder, VideoDecoder};
use crate::video::clock::{FrameClock, IntervalClock};
use crate::video::ffmpeg::{FfmpegDecoder, FfmpegEncoderFactory};
use crate::video::negotiation::{negotiate, EncodingCandidate};
use crate::video::progress::{ProgressCallback, ProgressReporter};
use crate::video::types::{EncodedVideo, VideoInput, VideoMetadata};

/// States of one video run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Loading,
    Passthrough,
    Encoding,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Passthrough => "passthrough",
            Self::Encoding => "encoding",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Builds the render-tick clock for each run
pub type ClockFactory = Arc<dyn Fn() -> Box<dyn FrameClock> + Send + Sync>;

/// Everything a run holds; dropping it releases what is still held
#[derive(Default)]
struct RunResources {
    staged: Option<Scoped<EphemeralFile>>,
    video: Option<Scoped<Box<dyn DecodedVideo>>>,
    surface: Option<Scoped<Surface>>,
    encoder: Option<Scoped<Box<dyn StreamEncoder>>>,
}

impl RunResources {
    /// Release in reverse acquisition order
    fn release_all(&mut self) {
        self.encoder.take();
        self.surface.take();
        self.video.take();
        self.staged.take();
    }
}

struct Run {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Loading,
            history: vec![PipelineState::Loading],
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Video pipeline {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// Outcome of a run plus the states it went through
pub(crate) struct RunReport {
    pub result: Result<EncodedVideo>,
    #[allow(dead_code)]
    pub states: Vec<PipelineState>,
}

/// Watermarks videos frame by frame
///
/// The decoder, encoder factory and clock are pluggable; [`VideoWatermarker::ffmpeg`]
/// wires up the ffmpeg backend.
#[derive(Clone)]
pub struct VideoWatermarker {
    decoder: Arc<dyn VideoDecoder>,
    encoders: Arc<dyn EncoderFactory>,
    clock: ClockFactory,
    candidates: Vec<EncodingCandidate>,
    target_fps: u32,
    fonts: Arc<FontBook>,
    palette: Palette,
}

impl VideoWatermarker {
    pub fn new(decoder: Arc<dyn VideoDecoder>, encoders: Arc<dyn EncoderFactory>, config: &Config) -> Self {
        let refresh_rate_hz = config.video.refresh_rate_hz;
        Self {
            decoder,
            encoders,
            clock: Arc::new(move || Box::new(IntervalClock::new(refresh_rate_hz)) as Box<dyn FrameClock>),
            candidates: config.video.codec_candidates.clone(),
            target_fps: config.video.target_fps,
            fonts: Arc::new(FontBook::empty()),
            palette: config.image.palette.clone(),
        }
    }

    /// The ffmpeg-backed watermarker
    pub fn ffmpeg(config: &Config, fonts: Arc<FontBook>) -> Self {
        Self::new(
            Arc::new(FfmpegDecoder::new(&config.video)),
            Arc::new(FfmpegEncoderFactory::new(&config.video)),
            config,
        )
        .with_fonts(fonts)
    }

    pub fn with_fonts(mut self, fonts: Arc<FontBook>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_clock(mut self, clock: ClockFactory) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<EncodingCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Watermark one video.
    ///
    /// With no watermark content the source bytes come back untouched and no
    /// frame is ever scheduled. Otherwise every frame is decoded, drawn with
    /// the overlay and re-encoded; this takes time proportional to the
    /// video's duration.
    pub async fn watermark(
        &self,
        input: VideoInput,
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<EncodedVideo> {
        self.run(input, settings, watermark, on_progress).await.result
    }

    pub(crate) async fn run(
        &self,
        input: VideoInput,
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
        on_progress: Option<ProgressCallback>,
    ) -> RunReport {
        let mut run = Run::new();
        let mut resources = RunResources::default();
        let mut progress = ProgressReporter::new(on_progress);
        info!("Watermarking video {}", input.file_name());

        let outcome = self
            .drive(&mut run, &mut resources, &input, settings, watermark, &mut progress)
            .await;

        run.transition(PipelineState::Finalizing);
        resources.release_all();

        let result = match outcome {
            Ok(video) => {
                run.transition(PipelineState::Done);
                progress.finish();
                info!(
                    "Video done: {} frames, {} bytes as {}",
                    video.frame_count,
                    video.len(),
                    video.mime_type()
                );
                Ok(video)
            }
            Err(e) => {
                run.transition(PipelineState::Failed);
                warn!("Video watermarking failed: {}", e);
                Err(e)
            }
        };

        RunReport {
            result,
            states: run.history,
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        resources: &mut RunResources,
        input: &VideoInput,
        settings: &WatermarkSettings,
        watermark: Option<&WatermarkImage>,
        progress: &mut ProgressReporter,
    ) -> Result<EncodedVideo> {
        // ===== LOADING =====
        let path = match input {
            VideoInput::Path(path) => path.clone(),
            VideoInput::Bytes { data, file_name } => {
                let suffix = input
                    .container_hint()
                    .map(|c| format!(".{}", c.extension()))
                    .unwrap_or_default();
                let staged = EphemeralFile::stage(data.clone(), suffix)
                    .await
                    .map_err(|e| MediaError::VideoLoad {
                        reason: format!("staging {}: {}", file_name, e),
                    })?;
                let path = staged.path().map(PathBuf::from).ok_or_else(|| MediaError::VideoLoad {
                    reason: format!("staging {} produced no file", file_name),
                })?;
                resources.staged = Some(Scoped::new(staged));
                path
            }
        };

        let video = resources.video.insert(Scoped::new(self.decoder.open(&path).await?));
        let metadata = video.metadata().clone();

        let overlay = WatermarkOverlay::prepare(
            settings,
            watermark,
            metadata.width,
            metadata.height,
            &self.fonts,
            &self.palette,
        )?;

        match overlay {
            None => {
                run.transition(PipelineState::Passthrough);
                self.passthrough(input, &path, &metadata).await
            }
            Some(overlay) => {
                run.transition(PipelineState::Encoding);
                progress.set_estimated_total(metadata.estimated_frames(self.target_fps));
                self.encode(resources, &metadata, &overlay, progress).await
            }
        }
    }

    /// Return the source bytes in their own container
    async fn passthrough(&self, input: &VideoInput, path: &std::path::Path, metadata: &VideoMetadata) -> Result<EncodedVideo> {
        let container = input
            .container_hint()
            .or(metadata.container)
            .ok_or_else(|| MediaError::VideoLoad {
                reason: format!("unrecognised container for {}", input.file_name()),
            })?;

        let data = match input {
            VideoInput::Bytes { data, .. } => data.clone(),
            VideoInput::Path(_) => Bytes::from(tokio::fs::read(path).await.map_err(|e| MediaError::VideoLoad {
                reason: format!("{}: {}", path.display(), e),
            })?),
        };

        info!("No watermark configured, returning source as {}", container.mime_type());
        Ok(EncodedVideo {
            data,
            container,
            codec: None,
            frame_count: 0,
            passthrough: true,
        })
    }

    async fn encode(
        &self,
        resources: &mut RunResources,
        metadata: &VideoMetadata,
        overlay: &WatermarkOverlay,
        progress: &mut ProgressReporter,
    ) -> Result<EncodedVideo> {
        // ===== SURFACE AND ENCODER =====
        let surface = Surface::new(metadata.width, metadata.height)?;
        resources.surface = Some(Scoped::new(surface));

        let candidate = negotiate(&self.candidates, self.encoders.as_ref()).await?;
        let encoder = self
            .encoders
            .create(&candidate, metadata.width, metadata.height, self.target_fps)
            .await
            .map_err(into_encoding_error)?;
        resources.encoder = Some(Scoped::new(encoder));

        let RunResources {
            video: Some(video),
            surface: Some(surface),
            encoder: Some(encoder),
            ..
        } = resources
        else {
            return Err(MediaError::VideoProcessing {
                reason: "video resources missing".to_string(),
            }
            .into());
        };

        let chunks = encoder.start().await.map_err(into_encoding_error)?;
        let collector = tokio::spawn(collect_chunks(chunks));

        video.play().await?;

        // ===== FRAME LOOP =====
        let mut clock = (self.clock)();
        let looped = frame_loop(clock.as_mut(), video, surface, encoder, overlay, progress).await;

        let frame_count = match looped {
            Ok(count) => count,
            Err(e) => {
                if let Err(stop_err) = encoder.stop().await {
                    debug!("Stopping encoder after failure: {}", stop_err);
                }
                collector.abort();
                return Err(e);
            }
        };

        // ===== FINISH ENCODING =====
        encoder.stop().await.map_err(into_encoding_error)?;
        let data = join_chunks(collector).await?;

        Ok(EncodedVideo {
            data,
            container: candidate.container,
            codec: candidate.codec,
            frame_count,
            passthrough: false,
        })
    }
}

/// Draw, overlay and encode until the source ends or pauses
async fn frame_loop(
    clock: &mut dyn FrameClock,
    video: &mut Box<dyn DecodedVideo>,
    surface: &mut Surface,
    encoder: &mut Box<dyn StreamEncoder>,
    overlay: &WatermarkOverlay,
    progress: &mut ProgressReporter,
) -> Result<u64> {
    let mut frame_index = 0u64;
    loop {
        clock.tick().await;
        if video.has_ended() || video.is_paused() {
            break;
        }

        let frame = match video.next_frame().await.map_err(into_processing_error)? {
            Some(frame) => frame,
            None => break,
        };

        surface.draw_frame(frame.as_image());
        overlay.draw(surface);
        encoder.push_frame(surface).await.map_err(into_encoding_error)?;

        frame_index += 1;
        progress.frame(frame_index);
    }
    debug!("Frame loop finished after {} frames", frame_index);
    Ok(frame_index)
}

async fn collect_chunks(mut chunks: mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut collected = Vec::new();
    while let Some(chunk) = chunks.recv().await {
        collected.push(chunk);
    }
    collected
}

async fn join_chunks(collector: JoinHandle<Vec<Bytes>>) -> Result<Bytes> {
    let chunks = collector.await.map_err(|e| MediaError::VideoEncoding {
        reason: format!("collecting encoder output: {}", e),
    })?;
    let mut data = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in &chunks {
        data.extend_from_slice(chunk);
    }
    debug!("Assembled {} chunks into {} bytes", chunks.len(), data.len());
    Ok(data.freeze())
}

fn into_encoding_error(e: StudioError) -> StudioError {
    match e {
        StudioError::Media(MediaError::VideoEncoding { .. }) => e,
        other => MediaError::VideoEncoding {
            reason: other.to_string(),
        }
        .into(),
    }
}

fn into_processing_error(e: StudioError) -> StudioError {
    match e {
        StudioError::Media(MediaError::VideoProcessing { .. }) => e,
        other => MediaError::VideoProcessing {
            reason: other.to_string(),
        }
        .into(),
    }
}

/// Watermark a video with the ffmpeg backend and default configuration
pub async fn watermark_video(
    input: VideoInput,
    settings: &WatermarkSettings,
    watermark: Option<&WatermarkImage>,
    on_progress: Option<ProgressCallback>,
) -> Result<EncodedVideo> {
    let config = Config::default();
    let fonts = Arc::new(FontBook::load(&config.fonts));
    VideoWatermarker::ffmpeg(&config, fonts)
        .watermark(input, settings, watermark, on_progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Release;
    use crate::settings::PositionPreset;
    use crate::video::types::{ContainerFormat, Frame, VideoCodec};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        frame_reads: AtomicUsize,
        video_releases: AtomicUsize,
        ticks: AtomicUsize,
        frames_encoded: AtomicUsize,
        encoder_stops: AtomicUsize,
        encoder_releases: AtomicUsize,
        created: Mutex<Vec<EncodingCandidate>>,
        opened_paths: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl Counters {
        /// The single path the decoder was opened with, checking it existed then
        fn staged_path(&self) -> PathBuf {
            let opened = self.opened_paths.lock().unwrap();
            assert_eq!(opened.len(), 1);
            let (path, existed) = opened[0].clone();
            assert!(existed, "{} did not exist when opened", path.display());
            path
        }
    }

    struct FakeDecoder {
        counters: Arc<Counters>,
        metadata: VideoMetadata,
        frames: u64,
        fail_at: Option<u64>,
        fail_open: bool,
    }

    struct FakeVideo {
        counters: Arc<Counters>,
        metadata: VideoMetadata,
        frames: u64,
        fail_at: Option<u64>,
        next: u64,
        playing: bool,
        ended: bool,
        released: bool,
    }

    #[async_trait]
    impl VideoDecoder for FakeDecoder {
        async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            self.counters
                .opened_paths
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            if self.fail_open {
                return Err(MediaError::VideoLoad {
                    reason: "corrupt header".to_string(),
                }
                .into());
            }
            Ok(Box::new(FakeVideo {
                counters: self.counters.clone(),
                metadata: self.metadata.clone(),
                frames: self.frames,
                fail_at: self.fail_at,
                next: 0,
                playing: false,
                ended: false,
                released: false,
            }))
        }
    }

    #[async_trait]
    impl DecodedVideo for FakeVideo {
        fn metadata(&self) -> &VideoMetadata {
            &self.metadata
        }

        async fn play(&mut self) -> Result<()> {
            self.playing = true;
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Option<Frame>> {
            self.counters.frame_reads.fetch_add(1, Ordering::SeqCst);
            if Some(self.next) == self.fail_at {
                return Err(MediaError::Canvas {
                    reason: "frame unavailable".to_string(),
                }
                .into());
            }
            if self.next >= self.frames {
                self.ended = true;
                return Ok(None);
            }
            let (w, h) = (self.metadata.width, self.metadata.height);
            let frame = Frame::new(self.next, self.next as f64 / 30.0, RgbaImage::from_pixel(w, h, Rgba([0, 0, 255, 255])));
            self.next += 1;
            Ok(Some(frame))
        }

        fn is_paused(&self) -> bool {
            !self.playing
        }

        fn has_ended(&self) -> bool {
            self.ended
        }
    }

    impl Release for FakeVideo {
        fn label(&self) -> &'static str {
            "fake video"
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.counters.video_releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeEncoders {
        counters: Arc<Counters>,
        supported: Vec<EncodingCandidate>,
        fail_push: bool,
    }

    struct FakeEncoder {
        counters: Arc<Counters>,
        tx: Option<mpsc::Sender<Bytes>>,
        fail_push: bool,
        released: bool,
    }

    #[async_trait]
    impl EncoderFactory for FakeEncoders {
        async fn is_supported(&self, candidate: &EncodingCandidate) -> bool {
            self.supported.contains(candidate)
        }

        async fn create(&self, candidate: &EncodingCandidate, _: u32, _: u32, _: u32) -> Result<Box<dyn StreamEncoder>> {
            self.counters.created.lock().unwrap().push(*candidate);
            Ok(Box::new(FakeEncoder {
                counters: self.counters.clone(),
                tx: None,
                fail_push: self.fail_push,
                released: false,
            }))
        }
    }

    #[async_trait]
    impl StreamEncoder for FakeEncoder {
        async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>> {
            let (tx, rx) = mpsc::channel(4);
            self.tx = Some(tx);
            Ok(rx)
        }

        async fn push_frame(&mut self, surface: &Surface) -> Result<()> {
            if self.fail_push {
                return Err(MediaError::Canvas {
                    reason: "encoder rejected frame".to_string(),
                }
                .into());
            }
            self.counters.frames_encoded.fetch_add(1, Ordering::SeqCst);
            // One byte per frame: the red channel of the centre pixel
            let [r, ..] = surface.get_pixel(surface.width() / 2, surface.height() / 2);
            if let Some(tx) = &self.tx {
                tx.send(Bytes::from(vec![r])).await.ok();
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<()> {
            self.counters.encoder_stops.fetch_add(1, Ordering::SeqCst);
            self.tx = None;
            Ok(())
        }
    }

    impl Release for FakeEncoder {
        fn label(&self) -> &'static str {
            "fake encoder"
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.tx = None;
                self.counters.encoder_releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct CountingClock(Arc<Counters>);

    #[async_trait]
    impl FrameClock for CountingClock {
        async fn tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        counters: Arc<Counters>,
        watermarker: VideoWatermarker,
    }

    fn harness(frames: u64, duration: f64) -> Harness {
        harness_with(frames, duration, None, false, false, default_candidates())
    }

    fn default_candidates() -> Vec<EncodingCandidate> {
        crate::config::VideoConfig::default().codec_candidates
    }

    fn harness_with(
        frames: u64,
        duration: f64,
        fail_at: Option<u64>,
        fail_push: bool,
        fail_open: bool,
        supported: Vec<EncodingCandidate>,
    ) -> Harness {
        let counters = Arc::new(Counters::default());
        let decoder = FakeDecoder {
            counters: counters.clone(),
            metadata: VideoMetadata::new(64, 32, duration),
            frames,
            fail_at,
            fail_open,
        };
        let encoders = FakeEncoders {
            counters: counters.clone(),
            supported,
            fail_push,
        };
        let clock_counters = counters.clone();
        let watermarker = VideoWatermarker::new(Arc::new(decoder), Arc::new(encoders), &Config::default())
            .with_clock(Arc::new(move || Box::new(CountingClock(clock_counters.clone())) as Box<dyn FrameClock>));
        Harness { counters, watermarker }
    }

    fn logo() -> WatermarkImage {
        WatermarkImage::new(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]))).unwrap()
    }

    fn logo_settings() -> WatermarkSettings {
        WatermarkSettings::image()
            .with_size_percent(50.0)
            .with_preset(PositionPreset::Center)
    }

    fn source() -> VideoInput {
        VideoInput::Bytes {
            data: Bytes::from_static(b"\x1a\x45\xdf\xa3 original video bytes"),
            file_name: "holiday.mp4".to_string(),
        }
    }

    fn recorder() -> (Option<ProgressCallback>, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Some(Box::new(move |p| sink.lock().unwrap().push(p))), seen)
    }

    #[tokio::test]
    async fn test_passthrough_never_schedules_frames() {
        let h = harness(150, 5.0);
        let (on_progress, seen) = recorder();

        let report = h
            .watermarker
            .run(source(), &WatermarkSettings::default(), None, on_progress)
            .await;
        let video = report.result.unwrap();

        assert!(video.passthrough);
        assert_eq!(video.data, Bytes::from_static(b"\x1a\x45\xdf\xa3 original video bytes"));
        assert_eq!(video.container, ContainerFormat::Mp4);
        assert_eq!(video.file_extension(), "mp4");
        assert_eq!(h.counters.frame_reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.counters.ticks.load(Ordering::SeqCst), 0);
        assert!(h.counters.created.lock().unwrap().is_empty());
        assert_eq!(h.counters.video_releases.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![100.0]);
        assert!(!h.counters.staged_path().exists());
        assert_eq!(
            report.states,
            vec![
                PipelineState::Loading,
                PipelineState::Passthrough,
                PipelineState::Finalizing,
                PipelineState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_image_kind_without_image_is_passthrough() {
        let h = harness(10, 1.0);
        let video = h
            .watermarker
            .watermark(source(), &logo_settings(), None, None)
            .await
            .unwrap();
        assert!(video.passthrough);
        assert_eq!(h.counters.frame_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_encodes_every_frame_in_order() {
        let h = harness(6, 0.2);
        let (on_progress, seen) = recorder();
        let logo = logo();

        let report = h
            .watermarker
            .run(source(), &logo_settings(), Some(&logo), on_progress)
            .await;
        let video = report.result.unwrap();

        assert!(!video.passthrough);
        assert_eq!(video.frame_count, 6);
        assert_eq!(video.container, ContainerFormat::WebM);
        assert_eq!(video.codec, Some(VideoCodec::Vp9));
        // The opaque red logo covers the centre pixel of every frame
        assert_eq!(video.data, Bytes::from(vec![255u8; 6]));

        assert_eq!(h.counters.frames_encoded.load(Ordering::SeqCst), 6);
        assert_eq!(h.counters.encoder_stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.encoder_releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.video_releases.load(Ordering::SeqCst), 1);
        assert!(h.counters.ticks.load(Ordering::SeqCst) >= 6);
        assert!(!h.counters.staged_path().exists());

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
        assert_eq!(seen.last(), Some(&100.0));

        assert_eq!(
            report.states,
            vec![
                PipelineState::Loading,
                PipelineState::Encoding,
                PipelineState::Finalizing,
                PipelineState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_clamps_when_estimate_is_short() {
        // 1 second estimates 30 frames, the source has 45
        let h = harness(45, 1.0);
        let (on_progress, seen) = recorder();
        let logo = logo();

        h.watermarker
            .watermark(source(), &logo_settings(), Some(&logo), on_progress)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|p| *p <= 100.0));
        assert_eq!(seen.last(), Some(&100.0));
    }

    #[tokio::test]
    async fn test_codec_fallback_uses_first_supported() {
        let generic = EncodingCandidate::new(ContainerFormat::WebM, None);
        let h = harness_with(3, 0.1, None, false, false, vec![generic]);
        let logo = logo();

        let video = h
            .watermarker
            .watermark(source(), &logo_settings(), Some(&logo), None)
            .await
            .unwrap();

        assert_eq!(video.codec, None);
        assert_eq!(video.mime_type(), "video/webm");
        assert_eq!(video.output_file_name("holiday.mp4"), "holiday-watermarked.webm");
        assert_eq!(*h.counters.created.lock().unwrap(), vec![generic]);
    }

    #[tokio::test]
    async fn test_frame_failure_stops_encoder_and_releases() {
        let h = harness_with(10, 1.0, Some(4), false, false, default_candidates());
        let logo = logo();

        let report = h
            .watermarker
            .run(source(), &logo_settings(), Some(&logo), None)
            .await;
        let err = report.result.unwrap_err();

        assert_eq!(err.code(), "VIDEO_PROCESSING_ERROR");
        assert_eq!(h.counters.frames_encoded.load(Ordering::SeqCst), 4);
        assert_eq!(h.counters.encoder_stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.encoder_releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.video_releases.load(Ordering::SeqCst), 1);
        assert_eq!(report.states.last(), Some(&PipelineState::Failed));
        assert!(!h.counters.staged_path().exists());
    }

    #[tokio::test]
    async fn test_encoder_failure_is_encoding_error() {
        let h = harness_with(10, 1.0, None, true, false, default_candidates());
        let logo = logo();

        let err = h
            .watermarker
            .watermark(source(), &logo_settings(), Some(&logo), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "VIDEO_ENCODING_ERROR");
        assert_eq!(h.counters.encoder_stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.encoder_releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.counters.video_releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_supported_encoding_releases_video() {
        let h = harness_with(10, 1.0, None, false, false, Vec::new());
        let logo = logo();

        let err = h
            .watermarker
            .watermark(source(), &logo_settings(), Some(&logo), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "VIDEO_ENCODING_ERROR");
        assert_eq!(h.counters.frame_reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.counters.video_releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_is_video_load_error() {
        let h = harness_with(10, 1.0, None, false, true, default_candidates());

        let report = h
            .watermarker
            .run(source(), &logo_settings(), Some(&logo()), None)
            .await;

        assert_eq!(report.result.unwrap_err().code(), "VIDEO_LOAD_ERROR");
        assert_eq!(h.counters.opens.load(Ordering::SeqCst), 1);
        assert!(!h.counters.staged_path().exists());
        assert_eq!(
            report.states,
            vec![PipelineState::Loading, PipelineState::Finalizing, PipelineState::Failed]
        );
    }

    #[tokio::test]
    async fn test_path_input_passthrough_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, b"webm bytes").unwrap();
        let h = harness(30, 1.0);

        let video = h
            .watermarker
            .watermark(VideoInput::Path(path), &WatermarkSettings::default(), None, None)
            .await
            .unwrap();

        assert_eq!(video.data, Bytes::from_static(b"webm bytes"));
        assert_eq!(video.container, ContainerFormat::WebM);
    }
}
