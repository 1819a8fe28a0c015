use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::error::{Result, StitchError};
use crate::video::types::{Clip, Frame};

/// Intrinsic properties of a loaded source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    pub fps: f64,
}

/// How a handle should decode its frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeTarget {
    /// Output frame rate; seeks resolve to this frame grid
    pub fps: f64,

    /// Output frame size, or the source's native size when `None`
    pub size: Option<(u32, u32)>,
}

/// A fully loaded, seekable source video
#[async_trait]
pub trait MediaHandle: Send {
    fn metadata(&self) -> &SourceMetadata;

    /// Seek to `time` seconds and decode the frame shown there
    ///
    /// Implementations must be cancel-safe: when the returned future is
    /// dropped before completion the handle stays usable and keeps showing
    /// the last fully decoded frame.
    async fn seek(&mut self, time: f64) -> Result<()>;

    /// The most recently decoded frame
    fn current_frame(&self) -> &Frame;

    /// Stop decoding and free the underlying resources
    async fn release(&mut self);
}

/// Resolves clip URLs into media handles
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Load the clip's source eagerly; fails with `ClipLoad` when it cannot be fetched or decoded
    async fn load(&self, clip: &Clip, target: DecodeTarget) -> Result<Box<dyn MediaHandle>>;
}

/// Loader backed by the `ffprobe` and `ffmpeg` executables
///
/// Sources are opened the same way for local paths and remote URLs. No
/// cookies or auth headers are ever forwarded: every source is treated as
/// foreign-hosted.
pub struct FfmpegLoader {
    ffmpeg_path: String,
    ffprobe_path: String,
    probe_timeout: Duration,
}

impl FfmpegLoader {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    /// Read dimensions, frame rate and duration of the first video stream
    pub async fn probe(&self, url: &str) -> Result<SourceMetadata> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(url)
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                StitchError::clip_load(url, format!("probe timed out after {:?}", self.probe_timeout))
            })?
            .map_err(|e| StitchError::clip_load(url, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("ffprobe exited with {}", output.status),
                text => text.to_string(),
            };
            return Err(StitchError::clip_load(url, reason));
        }

        parse_probe_output(url, &output.stdout)
    }
}

#[async_trait]
impl SourceLoader for FfmpegLoader {
    async fn load(&self, clip: &Clip, target: DecodeTarget) -> Result<Box<dyn MediaHandle>> {
        let url = clip.video_url.trim();
        if url.is_empty() {
            return Err(StitchError::clip_load(&clip.name, "clip has no video URL"));
        }

        info!("Loading clip '{}' from {}", clip.name, url);
        let metadata = self.probe(url).await?;
        debug!(
            "Clip metadata: {}x{} @ {:.2} fps, {:.2}s",
            metadata.width, metadata.height, metadata.fps, metadata.duration
        );

        let size = target.size.unwrap_or((metadata.width, metadata.height));
        let mut handle = FfmpegHandle::new(url, &self.ffmpeg_path, metadata, target.fps, size);

        // Start decoding straight away so that undecodable sources fail here
        // rather than halfway through the reel.
        match tokio::time::timeout(self.probe_timeout, handle.prime()).await {
            Ok(Ok(())) => Ok(Box::new(handle)),
            Ok(Err(e)) => {
                handle.release().await;
                Err(e)
            }
            Err(_) => {
                handle.release().await;
                Err(StitchError::clip_load(url, "timed out waiting for the first decoded frame"))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(url: &str, stdout: &[u8]) -> Result<SourceMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| StitchError::clip_load(url, format!("unreadable probe output: {}", e)))?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| StitchError::clip_load(url, "source has no video stream"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(StitchError::clip_load(url, "video stream has no usable dimensions")),
    };

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| StitchError::clip_load(url, "source has no known duration"))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or_else(|| {
            warn!("No frame rate reported for {}, assuming 30 fps", url);
            30.0
        });

    Ok(SourceMetadata {
        width,
        height,
        duration,
        fps,
    })
}

/// Parse an ffprobe rational such as `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Forward gaps longer than this many seconds restart the decoder instead of reading through
const MAX_READ_AHEAD_SECS: f64 = 5.0;

/// Seekable handle over a running `ffmpeg` decoder
///
/// The decoder emits raw RGB24 frames on the output frame grid, already
/// scaled to the surface size. Forward seeks read ahead on the running
/// process; backward seeks and long jumps restart it at the new position.
pub struct FfmpegHandle {
    url: String,
    ffmpeg_path: String,
    metadata: SourceMetadata,
    fps: f64,
    size: (u32, u32),
    decoder: Option<Decoder>,
    current: Frame,
    current_index: Option<u64>,
}

struct Decoder {
    child: Child,
    stdout: ChildStdout,
    next_index: u64,
    buf: Vec<u8>,
    filled: usize,
    exhausted: bool,
}

impl Decoder {
    /// Read the next complete frame, `None` at end of stream
    ///
    /// Partial reads are kept in `buf`, so dropping this future mid-frame
    /// loses nothing.
    async fn read_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        while self.filled < self.buf.len() {
            let n = self.stdout.read(&mut self.buf[self.filled..]).await?;
            if n == 0 {
                return Ok(None);
            }
            self.filled += n;
        }
        self.filled = 0;
        let frame_len = self.buf.len();
        Ok(Some(std::mem::replace(&mut self.buf, vec![0; frame_len])))
    }
}

impl FfmpegHandle {
    fn new(url: &str, ffmpeg_path: &str, metadata: SourceMetadata, fps: f64, size: (u32, u32)) -> Self {
        Self {
            url: url.to_string(),
            ffmpeg_path: ffmpeg_path.to_string(),
            metadata,
            fps,
            size,
            decoder: None,
            current: Frame::new_black(size.0, size.1),
            current_index: None,
        }
    }

    fn frame_index(&self, time: f64) -> u64 {
        (time * self.fps + 1e-6).floor().max(0.0) as u64
    }

    async fn prime(&mut self) -> Result<()> {
        self.restart(0).await?;
        self.seek(0.0).await?;
        if self.current_index.is_none() {
            return Err(StitchError::clip_load(&self.url, "source produced no decodable frames"));
        }
        Ok(())
    }

    async fn restart(&mut self, index: u64) -> Result<()> {
        self.stop_decoder().await;

        let start = index as f64 / self.fps;
        let (width, height) = self.size;
        let filter = format!("fps={},scale={}:{}", self.fps, width, height);

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if start > 0.0 {
            cmd.arg("-ss").arg(format!("{:.6}", start));
        }
        cmd.arg("-i")
            .arg(&self.url)
            .args(["-an", "-sn", "-vf", &filter, "-pix_fmt", "rgb24", "-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| StitchError::clip_load(&self.url, format!("failed to start ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StitchError::clip_load(&self.url, "failed to capture decoder output"))?;

        debug!("Decoder for {} started at {:.3}s (frame {})", self.url, start, index);

        let frame_len = width as usize * height as usize * 3;
        self.decoder = Some(Decoder {
            child,
            stdout,
            next_index: index,
            buf: vec![0; frame_len],
            filled: 0,
            exhausted: false,
        });
        Ok(())
    }

    async fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            if let Err(e) = decoder.child.kill().await {
                debug!("Decoder for {} already gone: {}", self.url, e);
            }
        }
    }
}

#[async_trait]
impl MediaHandle for FfmpegHandle {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn seek(&mut self, time: f64) -> Result<()> {
        let time = if time.is_finite() {
            time.clamp(0.0, self.metadata.duration)
        } else {
            0.0
        };
        let target = self.frame_index(time);
        if self.current_index == Some(target) {
            return Ok(());
        }

        let max_skip = (MAX_READ_AHEAD_SECS * self.fps).ceil() as u64;
        let restart = match &self.decoder {
            None => true,
            Some(decoder) => {
                target < decoder.next_index
                    || (!decoder.exhausted && target > decoder.next_index + max_skip)
            }
        };
        if restart {
            self.restart(target).await?;
        }

        let (width, height) = self.size;
        let last_index = self.frame_index(self.metadata.duration);
        while let Some(decoder) = self.decoder.as_mut() {
            if decoder.exhausted || decoder.next_index > target {
                break;
            }

            let bytes = decoder
                .read_frame()
                .await
                .map_err(|e| StitchError::clip_load(&self.url, format!("decode failed: {}", e)))?;

            match bytes {
                Some(bytes) => {
                    let index = decoder.next_index;
                    decoder.next_index += 1;
                    self.current = Frame::from_rgb_bytes(width, height, bytes).ok_or_else(|| {
                        StitchError::clip_load(&self.url, "decoder produced a truncated frame")
                    })?;
                    self.current_index = Some(index);
                }
                None => {
                    let status = decoder.child.wait().await.map_err(|e| {
                        StitchError::clip_load(&self.url, format!("failed to wait on decoder: {}", e))
                    })?;
                    if !status.success() {
                        return Err(StitchError::clip_load(
                            &self.url,
                            format!("decoder exited with {} at frame {}", status, decoder.next_index),
                        ));
                    }
                    // One frame of slack for rounding at the tail of the stream
                    if decoder.next_index + 1 < last_index {
                        return Err(StitchError::clip_load(
                            &self.url,
                            format!(
                                "stream ended at frame {} of {}",
                                decoder.next_index, last_index
                            ),
                        ));
                    }

                    // Past the last frame: keep showing what we have
                    debug!("Decoder for {} reached end of stream at frame {}", self.url, decoder.next_index);
                    decoder.exhausted = true;
                }
            }
        }

        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        &self.current
    }

    async fn release(&mut self) {
        self.stop_decoder().await;
    }
}
