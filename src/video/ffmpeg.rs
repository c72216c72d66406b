//! Production video backend built on the `ffmpeg` and `ffprobe` executables.
//!
//! Decoding runs `ffmpeg` with raw RGBA on stdout, one `width * height * 4`
//! byte record per frame. Encoding runs a second `ffmpeg` reading raw RGBA on
//! stdin and writing the muxed container to stdout, which a reader task
//! forwards as chunks. Child processes are killed when released.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::VideoConfig;
use crate::error::{MediaError, Result};
use crate::lifecycle::Release;
use crate::raster::Surface;
use crate::video::backend::{DecodedVideo, EncoderFactory, StreamEncoder, VideoDecoder};
use crate::video::negotiation::EncodingCandidate;
use crate::video::types::{ContainerFormat, Frame, VideoMetadata};

fn load_error(path: &Path, reason: impl std::fmt::Display) -> crate::error::StudioError {
    MediaError::VideoLoad {
        reason: format!("{}: {}", path.display(), reason),
    }
    .into()
}

fn processing_error(reason: impl std::fmt::Display) -> crate::error::StudioError {
    MediaError::VideoProcessing {
        reason: reason.to_string(),
    }
    .into()
}

fn encoding_error(reason: impl std::fmt::Display) -> crate::error::StudioError {
    MediaError::VideoEncoding {
        reason: reason.to_string(),
    }
    .into()
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe(json: &[u8]) -> std::result::Result<VideoMetadata, String> {
    let probe: Value = serde_json::from_slice(json).map_err(|e| format!("invalid ffprobe output: {}", e))?;

    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| "no video stream found".to_string())?;
    let format = &probe["format"];

    let width = stream["width"].as_u64().ok_or("could not read width")? as u32;
    let height = stream["height"].as_u64().ok_or("could not read height")? as u32;
    if width == 0 || height == 0 {
        return Err(format!("invalid dimensions {}x{}", width, height));
    }

    let duration = [&format["duration"], &stream["duration"]]
        .iter()
        .find_map(|v| v.as_str().and_then(|d| d.parse::<f64>().ok()))
        .unwrap_or(0.0);

    let fps = stream["r_frame_rate"].as_str().and_then(|r| {
        let (num, den) = r.split_once('/')?;
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        (den != 0.0).then(|| num / den)
    });

    let container = format["format_name"].as_str().and_then(ContainerFormat::from_probe_name);

    Ok(VideoMetadata {
        width,
        height,
        duration,
        fps,
        container,
    })
}

/// Encoder names from `ffmpeg -encoders`
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let name = fields.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

/// Decoder backed by `ffprobe` for metadata and `ffmpeg` for frames
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    target_fps: u32,
}

impl FfmpegDecoder {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            target_fps: config.target_fps,
        }
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .args(["-select_streams", "v:0"])
            .arg(path)
            .output()
            .await
            .map_err(|e| load_error(path, format!("ffprobe failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(load_error(path, format!("ffprobe exited with {}", output.status)));
        }

        let metadata = parse_probe(&output.stdout).map_err(|e| load_error(path, e))?;
        info!(
            "Video metadata: {}x{} @ {:.1}fps, {:.1}s",
            metadata.width,
            metadata.height,
            metadata.fps.unwrap_or(0.0),
            metadata.duration
        );

        Ok(Box::new(FfmpegVideo {
            ffmpeg: self.ffmpeg.clone(),
            path: path.to_path_buf(),
            target_fps: self.target_fps,
            metadata,
            child: None,
            stdout: None,
            stderr: None,
            next_index: 0,
            ended: false,
        }))
    }
}

/// A probed source; playback spawns the decoding child
pub struct FfmpegVideo {
    ffmpeg: PathBuf,
    path: PathBuf,
    target_fps: u32,
    metadata: VideoMetadata,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    next_index: u64,
    ended: bool,
}

/// Drain a child's stderr so it never blocks on a full pipe
async fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut text = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut text).await {
        debug!("Reading ffmpeg stderr: {}", e);
    }
    String::from_utf8_lossy(&text).trim().to_string()
}

/// Fill `buffer` from `stdout`; fewer bytes than its length means EOF
async fn read_record(stdout: &mut ChildStdout, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match stdout.read(&mut buffer[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

impl FfmpegVideo {
    fn frame_len(&self) -> usize {
        self.metadata.width as usize * self.metadata.height as usize * 4
    }

    /// Wait for the decoding child after its output ended; a failed exit
    /// becomes `Err` carrying ffmpeg's stderr
    async fn reap(&mut self) -> std::result::Result<(), String> {
        self.stdout = None;
        let status = match self.child.take() {
            Some(mut child) => Some(child.wait().await.map_err(|e| format!("waiting for ffmpeg: {}", e))?),
            None => None,
        };
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        match status {
            Some(status) if !status.success() => {
                if stderr.is_empty() {
                    Err(format!("ffmpeg exited with {}", status))
                } else {
                    Err(format!("ffmpeg exited with {}: {}", status, stderr))
                }
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DecodedVideo for FfmpegVideo {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    async fn play(&mut self) -> Result<()> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-r", &self.target_fps.to_string()])
            .args(["-s", &format!("{}x{}", self.metadata.width, self.metadata.height)])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| load_error(&self.path, format!("ffmpeg failed to start: {}", e)))?;

        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take().map(|stderr| tokio::spawn(collect_stderr(stderr)));
        self.child = Some(child);
        self.next_index = 0;
        self.ended = false;
        debug!("Decoding {} at {} fps", self.path.display(), self.target_fps);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.ended {
            return Ok(None);
        }
        let frame_len = self.frame_len();
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| processing_error("video is not playing"))?;

        let mut data = vec![0u8; frame_len];
        let filled = read_record(stdout, &mut data)
            .await
            .map_err(|e| processing_error(format!("reading decoded frame: {}", e)))?;

        if filled < frame_len {
            self.ended = true;
            let exit = self.reap().await;
            if filled > 0 {
                let mut reason = format!(
                    "frame {} truncated after {} of {} bytes",
                    self.next_index, filled, frame_len
                );
                if let Err(exit) = exit {
                    reason = format!("{} ({})", reason, exit);
                }
                return Err(processing_error(reason));
            }
            exit.map_err(|exit| processing_error(format!("decoding stopped after {} frames: {}", self.next_index, exit)))?;
            debug!("Decoder finished after {} frames", self.next_index);
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        let timestamp = index as f64 / f64::from(self.target_fps);
        Frame::from_rgba_bytes(index, timestamp, self.metadata.width, self.metadata.height, data)
            .map(Some)
            .ok_or_else(|| processing_error(format!("frame {} has the wrong size", index)))
    }

    fn is_paused(&self) -> bool {
        self.child.is_none() && !self.ended
    }

    fn has_ended(&self) -> bool {
        self.ended
    }
}

impl Release for FfmpegVideo {
    fn label(&self) -> &'static str {
        "video decoder"
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("Decoder already exited: {}", e);
            }
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
    }
}

/// Encoder factory running `ffmpeg` child processes
#[derive(Debug)]
pub struct FfmpegEncoderFactory {
    ffmpeg: PathBuf,
    chunk_size: usize,
    encoders: OnceCell<Option<HashSet<String>>>,
}

impl FfmpegEncoderFactory {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            chunk_size: config.chunk_size,
            encoders: OnceCell::new(),
        }
    }

    /// Encoders compiled into ffmpeg, probed once; `None` when ffmpeg is unusable
    async fn available_encoders(&self) -> &Option<HashSet<String>> {
        self.encoders
            .get_or_init(|| async {
                let output = Command::new(&self.ffmpeg)
                    .args(["-hide_banner", "-encoders"])
                    .output()
                    .await;
                match output {
                    Ok(output) if output.status.success() => {
                        let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
                        debug!("ffmpeg reports {} video encoders", encoders.len());
                        Some(encoders)
                    }
                    Ok(output) => {
                        warn!("ffmpeg -encoders exited with {}", output.status);
                        None
                    }
                    Err(e) => {
                        warn!("ffmpeg not available: {}", e);
                        None
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl EncoderFactory for FfmpegEncoderFactory {
    async fn is_supported(&self, candidate: &EncodingCandidate) -> bool {
        match (self.available_encoders().await, candidate.codec) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(encoders), Some(codec)) => encoders.contains(codec.encoder_name()),
        }
    }

    async fn create(
        &self,
        candidate: &EncodingCandidate,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn StreamEncoder>> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &fps.to_string()])
            .args(["-i", "pipe:0", "-an"]);

        if let Some(codec) = candidate.codec {
            cmd.args(["-c:v", codec.encoder_name()]);
        }

        let child = cmd
            .args(["-f", candidate.container.muxer(), "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| encoding_error(format!("ffmpeg failed to start: {}", e)))?;

        Ok(Box::new(FfmpegEncoder {
            child: Some(child),
            stdin: None,
            reader: None,
            chunk_size: self.chunk_size,
        }))
    }
}

/// A running `ffmpeg` encoding child
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    chunk_size: usize,
}

async fn forward_chunks(mut stdout: ChildStdout, chunk_size: usize, tx: mpsc::Sender<Bytes>) {
    let mut buffer = vec![0u8; chunk_size];
    loop {
        match stdout.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&buffer[..n])).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Reading encoder output failed: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl StreamEncoder for FfmpegEncoder {
    async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| encoding_error("encoder already released"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| encoding_error("encoder output already taken"))?;
        self.stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel(32);
        self.reader = Some(tokio::spawn(forward_chunks(stdout, self.chunk_size, tx)));
        Ok(rx)
    }

    async fn push_frame(&mut self, surface: &Surface) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| encoding_error("encoder is not accepting frames"))?;
        stdin
            .write_all(surface.as_raw())
            .await
            .map_err(|e| encoding_error(format!("writing frame to encoder: {}", e)))
    }

    async fn stop(&mut self) -> Result<()> {
        // Closing stdin ends ffmpeg's input stream
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!("Closing encoder input: {}", e);
            }
        }

        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .await
                .map_err(|e| encoding_error(format!("waiting for encoder: {}", e)))?;
            if !status.success() {
                return Err(encoding_error(format!("ffmpeg exited with {}", status)));
            }
        }

        if let Some(reader) = self.reader.take() {
            reader
                .await
                .map_err(|e| encoding_error(format!("encoder output task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Release for FfmpegEncoder {
    fn label(&self) -> &'static str {
        "stream encoder"
    }

    fn release(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("Encoder already exited: {}", e);
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [{
            "codec_name": "h264",
            "width": 1280,
            "height": 720,
            "r_frame_rate": "30000/1001",
            "duration": "4.950000"
        }],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "5.005000"
        }
    }"#;

    #[test]
    fn test_parse_probe() {
        let metadata = parse_probe(PROBE.as_bytes()).unwrap();
        assert_eq!((metadata.width, metadata.height), (1280, 720));
        assert!((metadata.duration - 5.005).abs() < 1e-9);
        assert!((metadata.fps.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(metadata.container, Some(ContainerFormat::Mp4));
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        assert!(parse_probe(br#"{"streams": [], "format": {}}"#).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_parse_encoder_list() {
        let output = "Encoders:\n V..... = Video\n A..... = Audio\n ------\n \
                      V....D libvpx-vp9           libvpx VP9 (codec vp9)\n \
                      V....D libvpx               libvpx VP8 (codec vp8)\n \
                      A....D libopus              libopus Opus (codec opus)\n";
        let encoders = parse_encoder_list(output);
        assert!(encoders.contains("libvpx-vp9"));
        assert!(encoders.contains("libvpx"));
        assert!(!encoders.contains("libopus"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_supports_nothing() {
        let config = VideoConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ..VideoConfig::default()
        };
        let factory = FfmpegEncoderFactory::new(&config);
        for candidate in &config.codec_candidates {
            assert!(!factory.is_supported(candidate).await);
        }
    }

    /// Executable shell scripts standing in for ffprobe and ffmpeg
    #[cfg(unix)]
    fn scripted_decoder(dir: &Path, decode_script: &str) -> FfmpegDecoder {
        use std::os::unix::fs::PermissionsExt;

        let write_script = |name: &str, body: &str| {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        let ffprobe = write_script(
            "ffprobe",
            r#"echo '{"streams":[{"width":2,"height":2,"r_frame_rate":"30/1"}],"format":{"format_name":"matroska,webm","duration":"1.0"}}'"#,
        );
        let ffmpeg = write_script("ffmpeg", decode_script);

        FfmpegDecoder::new(&VideoConfig {
            ffmpeg_path: ffmpeg,
            ffprobe_path: ffprobe,
            ..VideoConfig::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decoder_reads_frames_until_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        // Two 2x2 RGBA frames, 16 bytes each
        let decoder = scripted_decoder(dir.path(), "dd if=/dev/zero bs=32 count=1 2>/dev/null\nexit 0");

        let mut video = decoder.open(Path::new("clip.webm")).await.unwrap();
        video.play().await.unwrap();

        assert!(video.next_frame().await.unwrap().is_some());
        assert!(video.next_frame().await.unwrap().is_some());
        assert!(video.next_frame().await.unwrap().is_none());
        assert!(video.has_ended());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_truncated_frame_from_crashed_decoder_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        // One full frame, half of the next, then a crash
        let decoder = scripted_decoder(
            dir.path(),
            "dd if=/dev/zero bs=24 count=1 2>/dev/null\necho 'decoder crashed' >&2\nexit 1",
        );

        let mut video = decoder.open(Path::new("clip.webm")).await.unwrap();
        video.play().await.unwrap();

        assert!(video.next_frame().await.unwrap().is_some());
        let err = video.next_frame().await.unwrap_err();
        assert_eq!(err.code(), "VIDEO_PROCESSING_ERROR");
        assert!(err.to_string().contains("truncated"));
        assert!(err.to_string().contains("decoder crashed"));
        assert!(video.next_frame().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_on_frame_boundary_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = scripted_decoder(
            dir.path(),
            "dd if=/dev/zero bs=16 count=1 2>/dev/null\necho 'invalid data found' >&2\nexit 1",
        );

        let mut video = decoder.open(Path::new("clip.webm")).await.unwrap();
        video.play().await.unwrap();

        assert!(video.next_frame().await.unwrap().is_some());
        let err = video.next_frame().await.unwrap_err();
        assert_eq!(err.code(), "VIDEO_PROCESSING_ERROR");
        assert!(err.to_string().contains("invalid data found"));
    }

    #[tokio::test]
    async fn test_missing_ffprobe_is_video_load_error() {
        let config = VideoConfig {
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe"),
            ..VideoConfig::default()
        };
        let err = match FfmpegDecoder::new(&config).open(Path::new("clip.mp4")).await {
            Ok(_) => panic!("open should fail without ffprobe"),
            Err(e) => e,
        };
        assert_eq!(err.code(), "VIDEO_LOAD_ERROR");
    }
}
