//! # Video Module
//!
//! Source loading, the shared drawing surface, and encoding of composited frames.

pub mod encoder;
pub mod loader;
pub mod surface;
pub mod synthetic;
pub mod types;

pub use encoder::{
    CodecProfile, EncodeParams, EncodedVideo, EncoderFactory, FfmpegEncoderFactory, FrameEncoder,
    MemoryEncoderFactory,
};
pub use loader::{DecodeTarget, FfmpegLoader, MediaHandle, SourceLoader, SourceMetadata};
pub use surface::Surface;
pub use synthetic::SyntheticLoader;
pub use types::{Clip, Frame, Transition, TransitionType};
