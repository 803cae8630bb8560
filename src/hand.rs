//! Hand landmark results and their projection into pixel space.
//!
//! Landmarks are produced by a [`HandDetector`] in coordinates normalized to the frame that was
//! submitted. [`project`] turns them into a [`Projection`] of pixel-space points and skeleton
//! edges that an [`Overlay`] can draw.
//!
//! [`HandDetector`]: crate::detection::HandDetector
//! [`Overlay`]: crate::overlay::Overlay

mod landmark;
mod projection;

pub use landmark::*;
pub use projection::*;
