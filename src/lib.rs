//! # Reel-Compositor
//!
//! Stitch independently hosted video clips into one continuous reel, with a
//! visual transition at every junction.
//!
//! Clips are decoded, composited frame by frame onto a fixed-size surface and
//! streamed in order into an encoder. The result is a single encoded blob
//! tagged with whatever container format could be negotiated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reel_compositor::{
//!     config::Config,
//!     video::{Clip, TransitionType},
//!     StitchEngine,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let clips = vec![
//!     Clip::new("https://cdn.example.com/kickoff.mp4", "Kickoff", 0)
//!         .with_transition(TransitionType::Fade, 1.0),
//!     Clip::new("https://cdn.example.com/goal.mp4", "Goal", 1),
//! ];
//!
//! let engine = StitchEngine::with_ffmpeg(Config::default());
//! let video = engine.process(&clips, None).await?;
//! video.save("reel.webm").await?;
//! println!("{} ({} bytes)", video.mime_type, video.size());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`video`] - Source loading, the drawing surface and encoding
//! - [`transitions`] - Blend functions for each transition type
//! - [`composition`] - Timeline planning, the capture pipeline and the engine
//! - [`progress`] - Progress events delivered to the caller
//! - [`config`] - Configuration management
//!
//! ## Custom Transitions
//!
//! Replace a built-in blend by implementing
//! [`TransitionEffect`](transitions::TransitionEffect) and registering it:
//!
//! ```rust,no_run
//! use reel_compositor::error::Result;
//! use reel_compositor::transitions::TransitionEffect;
//! use reel_compositor::video::{Frame, Surface, TransitionType};
//!
//! struct HardFade;
//!
//! impl TransitionEffect for HardFade {
//!     fn kind(&self) -> TransitionType {
//!         TransitionType::Fade
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Switches to the incoming clip halfway through"
//!     }
//!
//!     fn render(&self, surface: &mut Surface, outgoing: &Frame, incoming: &Frame, progress: f32) -> Result<()> {
//!         let frame = if progress < 0.5 { outgoing } else { incoming };
//!         surface.draw(frame, 0, 1.0)
//!     }
//! }
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod progress;
pub mod transitions;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::StitchEngine,
    config::Config,
    error::{Result, StitchError},
    progress::{ProcessingProgress, ProcessingStage, ProgressCallback},
    video::{Clip, EncodedVideo, Transition, TransitionType},
};
