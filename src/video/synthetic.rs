//! In-process generated sources
//!
//! `synthetic:` URLs describe a clip whose frames are computed rather than
//! decoded, e.g. `synthetic:color=ff0000;duration=5;size=64x36;pattern=bars`.
//! They make it possible to exercise the full compositing pipeline without
//! network access or an ffmpeg install.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StitchError};
use crate::video::loader::{DecodeTarget, MediaHandle, SourceLoader, SourceMetadata};
use crate::video::types::{Clip, Frame};

const SCHEME: &str = "synthetic:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Every frame is the solid base color
    Solid,
    /// Base color with a white bar sweeping left to right over the clip's duration
    Bars,
}

/// Parsed description of a generated clip
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub color: [u8; 3],
    pub duration: f64,
    pub size: (u32, u32),
    pub fps: f64,
    pub pattern: Pattern,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            color: [0, 0, 0],
            duration: 1.0,
            size: (64, 36),
            fps: 30.0,
            pattern: Pattern::Solid,
        }
    }
}

impl SyntheticSpec {
    pub fn solid(color: [u8; 3], duration: f64, size: (u32, u32)) -> Self {
        Self {
            color,
            duration,
            size,
            ..Self::default()
        }
    }

    pub fn parse(url: &str) -> std::result::Result<Self, String> {
        let body = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| format!("not a synthetic URL: {}", url))?;

        let mut spec = Self::default();
        for part in body.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", part))?;
            let value = value.trim();

            match key.trim() {
                "color" => spec.color = parse_hex_color(value)?,
                "duration" => {
                    spec.duration = value
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d > 0.0)
                        .ok_or_else(|| format!("invalid duration '{}'", value))?
                }
                "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| format!("invalid size '{}'", value))?;
                    let w: u32 = w.parse().map_err(|_| format!("invalid width '{}'", w))?;
                    let h: u32 = h.parse().map_err(|_| format!("invalid height '{}'", h))?;
                    if w == 0 || h == 0 {
                        return Err(format!("invalid size '{}'", value));
                    }
                    spec.size = (w, h);
                }
                "fps" => {
                    spec.fps = value
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f > 0.0)
                        .ok_or_else(|| format!("invalid fps '{}'", value))?
                }
                "pattern" => {
                    spec.pattern = match value {
                        "solid" => Pattern::Solid,
                        "bars" => Pattern::Bars,
                        other => return Err(format!("unknown pattern '{}'", other)),
                    }
                }
                other => return Err(format!("unknown parameter '{}'", other)),
            }
        }
        Ok(spec)
    }

    pub fn to_url(&self) -> String {
        let pattern = match self.pattern {
            Pattern::Solid => "solid",
            Pattern::Bars => "bars",
        };
        format!(
            "{}color={:02x}{:02x}{:02x};duration={};size={}x{};fps={};pattern={}",
            SCHEME,
            self.color[0],
            self.color[1],
            self.color[2],
            self.duration,
            self.size.0,
            self.size.1,
            self.fps,
            pattern
        )
    }

    /// Render the frame shown at `time`, at the given output size
    pub fn frame_at(&self, time: f64, size: (u32, u32)) -> Frame {
        let mut frame = Frame::new_filled(size.0, size.1, self.color);
        if self.pattern == Pattern::Bars {
            let fraction = (time / self.duration).clamp(0.0, 1.0);
            let bar_x = ((size.0 - 1) as f64 * fraction).round() as u32;
            for y in 0..size.1 {
                frame.set_pixel(bar_x, y, [255, 255, 255]);
            }
        }
        frame
    }
}

fn parse_hex_color(value: &str) -> std::result::Result<[u8; 3], String> {
    let hex = value.trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("invalid color '{}'", value));
    }
    let rgb = u32::from_str_radix(hex, 16).map_err(|_| format!("invalid color '{}'", value))?;
    Ok([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])
}

/// Loader for `synthetic:` URLs; every other URL is unreachable
#[derive(Debug, Clone, Default)]
pub struct SyntheticLoader {
    seek_delay: Option<Duration>,
}

impl SyntheticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every seek take `delay` to settle, to exercise the bounded seek wait
    pub fn with_seek_delay(delay: Duration) -> Self {
        Self {
            seek_delay: Some(delay),
        }
    }
}

#[async_trait]
impl SourceLoader for SyntheticLoader {
    async fn load(&self, clip: &Clip, target: DecodeTarget) -> Result<Box<dyn MediaHandle>> {
        let spec = SyntheticSpec::parse(&clip.video_url)
            .map_err(|reason| StitchError::clip_load(&clip.video_url, reason))?;

        let size = target.size.unwrap_or(spec.size);
        debug!("Generated source for '{}' at {}x{}", clip.name, size.0, size.1);

        let metadata = SourceMetadata {
            width: spec.size.0,
            height: spec.size.1,
            duration: spec.duration,
            fps: spec.fps,
        };
        let current = spec.frame_at(0.0, size);

        Ok(Box::new(SyntheticHandle {
            spec,
            metadata,
            size,
            seek_delay: self.seek_delay,
            current,
            released: false,
        }))
    }
}

struct SyntheticHandle {
    spec: SyntheticSpec,
    metadata: SourceMetadata,
    size: (u32, u32),
    seek_delay: Option<Duration>,
    current: Frame,
    released: bool,
}

#[async_trait]
impl MediaHandle for SyntheticHandle {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn seek(&mut self, time: f64) -> Result<()> {
        if self.released {
            return Err(StitchError::clip_load(self.spec.to_url(), "source was already released"));
        }
        if let Some(delay) = self.seek_delay {
            tokio::time::sleep(delay).await;
        }
        let time = if time.is_finite() {
            time.clamp(0.0, self.metadata.duration)
        } else {
            0.0
        };
        self.current = self.spec.frame_at(time, self.size);
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        &self.current
    }

    async fn release(&mut self) {
        self.released = true;
    }
}
