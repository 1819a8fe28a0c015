//! # Composition Engine
//!
//! The composition engine plans the reel timeline, composites every output
//! frame and streams the frames through the capture pipeline into an encoder.

pub mod capture;
pub mod engine;
pub mod timeline;

// Re-exports for convenience
pub use capture::CapturePipeline;
pub use engine::StitchEngine;
pub use timeline::{frames_for, sort_clips, PlanWarning, Segment, TimelinePlan};
