use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer that provides
/// convenient methods for the pixel work done by transitions.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Raw interleaved RGB24 bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// True when every pixel has the given color
    pub fn is_uniform(&self, color: [u8; 3]) -> bool {
        self.buffer.pixels().all(|p| p.0 == color)
    }

    /// Return this frame scaled to the requested size, borrowing when it already fits
    pub fn fitted(&self, width: u32, height: u32) -> Cow<'_, Frame> {
        if self.dimensions() == (width, height) {
            Cow::Borrowed(self)
        } else {
            let resized = image::imageops::resize(&self.buffer, width, height, FilterType::Triangle);
            Cow::Owned(Frame::new(resized))
        }
    }
}

/// Visual effect applied at the junction between a clip and its successor
///
/// The set is closed: an unknown name fails to deserialize rather than
/// silently degrading to a hard cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    #[default]
    None,
    Fade,
    FadeBlack,
    FadeWhite,
    SlideLeft,
    SlideRight,
    WipeLeft,
    WipeRight,
}

impl TransitionType {
    pub const ALL: [TransitionType; 8] = [
        TransitionType::None,
        TransitionType::Fade,
        TransitionType::FadeBlack,
        TransitionType::FadeWhite,
        TransitionType::SlideLeft,
        TransitionType::SlideRight,
        TransitionType::WipeLeft,
        TransitionType::WipeRight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionType::None => "none",
            TransitionType::Fade => "fade",
            TransitionType::FadeBlack => "fadeblack",
            TransitionType::FadeWhite => "fadewhite",
            TransitionType::SlideLeft => "slideleft",
            TransitionType::SlideRight => "slideright",
            TransitionType::WipeLeft => "wipeleft",
            TransitionType::WipeRight => "wiperight",
        }
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransitionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown transition type '{}'", s))
    }
}

/// Transition from a clip into the next one
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: TransitionType,

    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
}

impl Transition {
    pub fn new(kind: TransitionType, duration: f64) -> Self {
        Self { kind, duration }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Whether this transition produces any blended frames at all
    pub fn is_active(&self) -> bool {
        self.kind != TransitionType::None && self.duration.is_finite() && self.duration > 0.0
    }
}

/// One input video segment with the transition into its successor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Location of the source video (https URL or local path)
    #[serde(alias = "videoUrl")]
    pub video_url: String,

    #[serde(default)]
    pub name: String,

    /// Position in the reel; clips are stable-sorted on this before processing
    #[serde(default)]
    pub order: u32,

    /// Ignored on the last clip
    #[serde(default)]
    pub transition: Transition,
}

impl Clip {
    pub fn new<U: Into<String>, N: Into<String>>(video_url: U, name: N, order: u32) -> Self {
        Self {
            video_url: video_url.into(),
            name: name.into(),
            order,
            transition: Transition::none(),
        }
    }

    pub fn with_transition(mut self, kind: TransitionType, duration: f64) -> Self {
        self.transition = Transition::new(kind, duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_names_roundtrip() {
        for kind in TransitionType::ALL {
            assert_eq!(kind.name().parse::<TransitionType>().unwrap(), kind);
        }
        assert!("dissolve".parse::<TransitionType>().is_err());
    }

    #[test]
    fn test_clip_deserializes_from_camel_case_payload() {
        let json = r#"{
            "videoUrl": "https://cdn.example.com/goal.mp4",
            "name": "Goal",
            "order": 2,
            "transition": { "type": "wipeleft", "duration": 0.75 }
        }"#;

        let clip: Clip = serde_json::from_str(json).unwrap();
        assert_eq!(clip.video_url, "https://cdn.example.com/goal.mp4");
        assert_eq!(clip.order, 2);
        assert_eq!(clip.transition.kind, TransitionType::WipeLeft);
        assert_eq!(clip.transition.duration, 0.75);
    }

    #[test]
    fn test_unknown_transition_is_rejected() {
        let json = r#"{ "video_url": "a.mp4", "transition": { "type": "spin", "duration": 1 } }"#;
        assert!(serde_json::from_str::<Clip>(json).is_err());
    }

    #[test]
    fn test_inactive_transitions() {
        assert!(!Transition::none().is_active());
        assert!(!Transition::new(TransitionType::Fade, 0.0).is_active());
        assert!(!Transition::new(TransitionType::None, 2.0).is_active());
        assert!(Transition::new(TransitionType::Fade, 0.5).is_active());
    }

    #[test]
    fn test_fitted_borrows_when_sizes_match() {
        let frame = Frame::new_filled(8, 4, [10, 20, 30]);
        assert!(matches!(frame.fitted(8, 4), Cow::Borrowed(_)));

        let scaled = frame.fitted(4, 2);
        assert_eq!(scaled.dimensions(), (4, 2));
        assert!(scaled.is_uniform([10, 20, 30]));
    }
}
