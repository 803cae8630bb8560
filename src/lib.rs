//! Camera frame preparation and hand landmark projection.
//!
//! The pipeline implemented by this crate looks like this:
//!
//! 1. A raw YUV camera frame ([`frame::RawFrame`]) is decoded to RGB by a [`frame::Decoder`].
//! 2. The image is rotated upright and mirrored depending on the camera it came from
//!    ([`orient::FramePrep`]).
//! 3. The prepared image is submitted to a [`detection::HandDetector`] running on a background
//!    thread, via a [`detection::DetectionClient`].
//! 4. Detected landmarks are projected into the pixel space of the submitted frame
//!    ([`hand::Projection`]).
//! 5. The render context displays the projection with an [`overlay::Overlay`], scaled to its
//!    surface.
//!
//! [`pipeline::HandPipeline`] ties these steps together.
//!
//! # Coordinates
//!
//! Image coordinates have their origin in the top left corner, with X pointing right and Y
//! pointing *down*. Rotations by positive angles are therefore clockwise on screen.
//!
//! # Environment Variables
//!
//! * `HANDMARK_DELEGATE`: `cpu` or `gpu`. Selects the default [`detection::Delegate`] passed to
//!   detector backends. Invalid values are logged and ignored.
//! * `RUST_LOG`: overrides the log levels set by [`init_logger!`].

use log::LevelFilter;

pub mod detection;
pub mod frame;
pub mod hand;
pub mod image;
pub mod orient;
pub mod overlay;
pub mod pipeline;
pub mod resolution;
pub mod timer;
pub mod worker;

#[cfg(test)]
mod test;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and handmark will log at *debug* level, unless overridden by `RUST_LOG`.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
