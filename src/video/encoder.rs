use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StitchError};
use crate::video::types::Frame;

/// Mime type reported by [`MemoryEncoderFactory`] output
pub const RAW_FRAMES_MIME: &str = "video/x-raw-rgb24";

/// One container/codec combination the encoder may negotiate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecProfile {
    /// Mime type the output blob is tagged with
    pub mime_type: String,

    /// ffmpeg encoder name
    pub encoder: String,

    /// ffmpeg muxer name
    pub container: String,
}

impl CodecProfile {
    pub fn new<M: Into<String>, E: Into<String>, C: Into<String>>(mime_type: M, encoder: E, container: C) -> Self {
        Self {
            mime_type: mime_type.into(),
            encoder: encoder.into(),
            container: container.into(),
        }
    }

    /// Preference order, best first
    pub fn default_preferences() -> Vec<Self> {
        vec![
            Self::new("video/webm;codecs=vp9", "libvpx-vp9", "webm"),
            Self::new("video/webm;codecs=vp8", "libvpx", "webm"),
            Self::new("video/mp4;codecs=avc1", "libx264", "mp4"),
            Self::new("video/mp4", "mpeg4", "mp4"),
        ]
    }

    /// Muxer arguments that let the container be written to a pipe
    fn container_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.container == "mp4" || self.container == "mov" {
            args.push("-movflags".to_string());
            args.push("frag_keyframe+empty_moov+default_base_moof".to_string());
        }
        args.push("-f".to_string());
        args.push(self.container.clone());
        args
    }
}

/// Output stream parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Target bitrate in bits per second
    pub bitrate: u64,
}

/// The finished reel
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub data: Vec<u8>,
    /// Negotiated mime type; callers must read it from here rather than assume one
    pub mime_type: String,
    pub codec: String,
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
}

impl EncodedVideo {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Conventional file extension for the negotiated container
    pub fn extension(&self) -> &'static str {
        if self.mime_type.starts_with("video/webm") {
            "webm"
        } else if self.mime_type.starts_with("video/mp4") {
            "mp4"
        } else {
            "raw"
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// Sink for composited frames, in presentation order
#[async_trait]
pub trait FrameEncoder: Send {
    fn mime_type(&self) -> &str;

    async fn push_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush the encoder and return the complete output
    async fn finish(&mut self) -> Result<EncodedVideo>;

    /// Discard everything written so far
    async fn abort(&mut self);
}

/// Opens a fresh encoder for each run
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn open(&self, params: &EncodeParams) -> Result<Box<dyn FrameEncoder>>;
}

/// Pick the first preferred profile whose encoder is available
pub fn select_profile<'a>(
    preferences: &'a [CodecProfile],
    available: &HashSet<String>,
) -> Option<&'a CodecProfile> {
    preferences.iter().find(|p| available.contains(&p.encoder))
}

/// Extract encoder names from `ffmpeg -encoders` output
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

/// Encoder factory driving an `ffmpeg` process
pub struct FfmpegEncoderFactory {
    ffmpeg_path: String,
    preferences: Vec<CodecProfile>,
}

impl FfmpegEncoderFactory {
    pub fn new<P: Into<String>>(ffmpeg_path: P, preferences: Vec<CodecProfile>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            preferences,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.loader.ffmpeg_path.clone(),
            config.output.codec_preferences.clone(),
        )
    }

    /// Video encoders compiled into the local ffmpeg
    pub async fn available_encoders(&self) -> Result<HashSet<String>> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StitchError::unsupported(format!("ffmpeg is not available: {}", e)))?;

        if !output.status.success() {
            return Err(StitchError::unsupported(format!(
                "ffmpeg -encoders exited with {}",
                output.status
            )));
        }

        Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
    }

    pub async fn negotiate(&self) -> Result<CodecProfile> {
        let available = self.available_encoders().await?;
        let profile = select_profile(&self.preferences, &available).ok_or_else(|| {
            let wanted: Vec<&str> = self.preferences.iter().map(|p| p.encoder.as_str()).collect();
            StitchError::unsupported(format!("none of the preferred encoders are available: {}", wanted.join(", ")))
        })?;

        info!("Negotiated output format {} ({})", profile.mime_type, profile.encoder);
        Ok(profile.clone())
    }
}

#[async_trait]
impl EncoderFactory for FfmpegEncoderFactory {
    async fn open(&self, params: &EncodeParams) -> Result<Box<dyn FrameEncoder>> {
        let profile = self.negotiate().await?;
        let encoder = FfmpegEncoder::spawn(&self.ffmpeg_path, profile, *params)?;
        Ok(Box::new(encoder))
    }
}

/// Raw RGB24 frames in on stdin, encoded container chunks out on stdout
pub struct FfmpegEncoder {
    profile: CodecProfile,
    params: EncodeParams,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_task: Option<JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
    stderr_task: Option<JoinHandle<String>>,
    frames: u64,
}

const CHUNK_SIZE: usize = 64 * 1024;

impl FfmpegEncoder {
    pub fn spawn(ffmpeg_path: &str, profile: CodecProfile, params: EncodeParams) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", params.width, params.height))
            .arg("-r")
            .arg(params.fps.to_string())
            .args(["-i", "pipe:0", "-an"])
            // yuv420p needs even dimensions
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
            .args(["-c:v", &profile.encoder])
            .arg("-b:v")
            .arg(params.bitrate.to_string())
            .args(["-pix_fmt", "yuv420p"])
            .args(profile.container_args())
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| StitchError::unsupported(format!("failed to start ffmpeg encoder: {}", e)))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| StitchError::finalization("failed to capture encoder output"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| StitchError::finalization("failed to capture encoder diagnostics"))?;

        // Drain both pipes concurrently so ffmpeg never blocks on a full pipe
        let stdout_task = tokio::spawn(async move {
            let mut chunks = Vec::new();
            loop {
                let mut chunk = vec![0u8; CHUNK_SIZE];
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                chunk.truncate(n);
                chunks.push(chunk);
            }
            Ok(chunks)
        });
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Err(err) = stderr.read_to_string(&mut output).await {
                output = format!("<failed to read ffmpeg stderr: {}>", err);
            }
            output
        });

        debug!(
            "Encoder started: {} {}x{} @ {} fps, {} bps",
            profile.encoder, params.width, params.height, params.fps, params.bitrate
        );

        Ok(Self {
            profile,
            params,
            child: Some(child),
            stdin,
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
            frames: 0,
        })
    }

    async fn diagnostics(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default().trim().to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        &self.profile.mime_type
    }

    async fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.params.width, self.params.height) {
            return Err(StitchError::finalization(format!(
                "frame is {}x{} but the encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.params.width,
                self.params.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StitchError::finalization("encoder input is already closed"))?;

        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            self.stdin = None;
            if let Some(child) = self.child.as_mut() {
                match child.wait().await {
                    Ok(status) => debug!("Encoder exited with {} after a failed write", status),
                    Err(err) => debug!("Failed to wait on encoder: {}", err),
                }
            }
            let detail = self.diagnostics().await;
            return Err(StitchError::finalization(format!(
                "encoder rejected frame {}: {} {}",
                self.frames, e, detail
            )));
        }

        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<EncodedVideo> {
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| StitchError::finalization("encoder input is already closed"))?;
        if let Err(e) = stdin.shutdown().await {
            warn!("Failed to flush encoder input: {}", e);
        }
        drop(stdin);

        let mut child = self
            .child
            .take()
            .ok_or_else(|| StitchError::finalization("encoder process is gone"))?;
        let status = child
            .wait()
            .await
            .map_err(|e| StitchError::finalization(format!("failed to wait on ffmpeg: {}", e)))?;

        let chunks = match self.stdout_task.take() {
            Some(task) => task
                .await
                .map_err(|e| StitchError::finalization(format!("output reader failed: {}", e)))?
                .map_err(|e| StitchError::finalization(format!("failed reading encoder output: {}", e)))?,
            None => Vec::new(),
        };
        let diagnostics = self.diagnostics().await;

        if !status.success() {
            return Err(StitchError::finalization(format!(
                "ffmpeg exited with {}: {}",
                status, diagnostics
            )));
        }

        debug!("Encoder produced {} chunks", chunks.len());
        let data = chunks.concat();
        if data.is_empty() {
            return Err(StitchError::finalization("encoder produced no output"));
        }

        Ok(EncodedVideo {
            data,
            mime_type: self.profile.mime_type.clone(),
            codec: self.profile.encoder.clone(),
            frame_count: self.frames,
            duration: self.frames as f64 / self.params.fps,
        })
    }

    async fn abort(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!("Encoder process already exited: {}", e);
            }
        }
        if let Some(task) = self.stdout_task.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Encoder factory that keeps raw frames in memory
///
/// The output blob is the concatenation of raw RGB24 frames. The frames of
/// the most recent finished run stay available through
/// [`captured_frames`](Self::captured_frames), which is what previews and
/// tests use.
#[derive(Clone, Default)]
pub struct MemoryEncoderFactory {
    captured: Arc<Mutex<Vec<Frame>>>,
}

impl MemoryEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured_frames(&self) -> Vec<Frame> {
        match self.captured.lock() {
            Ok(frames) => frames.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl EncoderFactory for MemoryEncoderFactory {
    async fn open(&self, params: &EncodeParams) -> Result<Box<dyn FrameEncoder>> {
        Ok(Box::new(MemoryEncoder {
            sink: Arc::clone(&self.captured),
            params: *params,
            frames: Vec::new(),
        }))
    }
}

struct MemoryEncoder {
    sink: Arc<Mutex<Vec<Frame>>>,
    params: EncodeParams,
    frames: Vec<Frame>,
}

#[async_trait]
impl FrameEncoder for MemoryEncoder {
    fn mime_type(&self) -> &str {
        RAW_FRAMES_MIME
    }

    async fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.params.width, self.params.height) {
            return Err(StitchError::finalization(format!(
                "frame is {}x{} but the encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.params.width,
                self.params.height
            )));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    async fn finish(&mut self) -> Result<EncodedVideo> {
        let frames = std::mem::take(&mut self.frames);
        let data: Vec<u8> = frames.iter().flat_map(|f| f.as_raw().iter().copied()).collect();
        let frame_count = frames.len() as u64;

        match self.sink.lock() {
            Ok(mut sink) => *sink = frames,
            Err(poisoned) => *poisoned.into_inner() = frames,
        }

        Ok(EncodedVideo {
            data,
            mime_type: RAW_FRAMES_MIME.to_string(),
            codec: "rawvideo".to_string(),
            frame_count,
            duration: frame_count as f64 / self.params.fps,
        })
    }

    async fn abort(&mut self) {
        self.frames.clear();
    }
}
