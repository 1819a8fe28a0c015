//! # Transition System
//!
//! Blend functions that composite the end of one clip into the start of the
//! next. Each transition draws onto the shared [`Surface`](crate::video::Surface)
//! given both source frames and a progress fraction in `[0, 1)`.
//!
//! ## Built-in Transitions
//!
//! - **fade**: Cross-dissolve, incoming frame drawn at opacity `progress`
//! - **fadeblack / fadewhite**: Dip through a solid color, uniform at the midpoint
//! - **slideleft / slideright**: Outgoing frame pushed off-screen by the incoming one
//! - **wipeleft / wiperight**: Incoming frame revealed behind a moving edge
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reel_compositor::transitions::TransitionRegistry;
//! use reel_compositor::video::{Frame, Surface, TransitionType};
//!
//! let registry = TransitionRegistry::new();
//! let fade = registry.get(TransitionType::Fade).unwrap();
//!
//! let mut surface = Surface::new(64, 36).unwrap();
//! let outgoing = Frame::new_filled(64, 36, [255, 0, 0]);
//! let incoming = Frame::new_filled(64, 36, [0, 0, 255]);
//! fade.render(&mut surface, &outgoing, &incoming, 0.25).unwrap();
//! ```

pub mod registry;
pub mod traits;

mod dip;
mod fade;
mod slide;
mod wipe;

pub use registry::TransitionRegistry;
pub use traits::TransitionEffect;

pub use dip::DipTransition;
pub use fade::FadeTransition;
pub use slide::SlideTransition;
pub use wipe::WipeTransition;
