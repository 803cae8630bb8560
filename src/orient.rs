//! Camera-facing orientation policy.
//!
//! Sensor frames arrive in the sensor's native orientation. Before they are handed to a detector,
//! they are rotated upright depending on which camera produced them, and mirrored.

use crate::frame::{DecodeError, Decoder, RawFrame};
use crate::image::Image;
use crate::timer::Timer;

/// The camera a frame was captured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn from_front(is_front: bool) -> Self {
        if is_front {
            Self::Front
        } else {
            Self::Back
        }
    }
}

/// A rotation followed by an optional horizontal mirror.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    degrees: f32,
    mirror: bool,
}

impl Orientation {
    /// Returns the orientation for frames from a camera facing `facing`.
    ///
    /// Front camera frames are rotated by +90° (clockwise), back camera frames by -90°. Both are
    /// mirrored after rotating.
    pub fn for_facing(facing: CameraFacing) -> Self {
        let degrees = match facing {
            CameraFacing::Front => 90.0,
            CameraFacing::Back => -90.0,
        };
        Self {
            degrees,
            mirror: true,
        }
    }

    /// Sets whether the rotated image is flipped horizontally.
    pub fn set_mirror(&mut self, mirror: bool) -> &mut Self {
        self.mirror = mirror;
        self
    }

    #[inline]
    pub fn degrees(&self) -> f32 {
        self.degrees
    }

    #[inline]
    pub fn mirror(&self) -> bool {
        self.mirror
    }

    /// Applies the orientation, returning a new image.
    pub fn apply(&self, image: &Image) -> Image {
        let rotated = image.rotate(self.degrees);
        if self.mirror {
            rotated.flip_horizontal()
        } else {
            rotated
        }
    }
}

/// Decodes raw frames and orients them for detection.
pub struct FramePrep {
    decoder: Decoder,
    mirror: bool,
    t_orient: Timer,
}

impl Default for FramePrep {
    fn default() -> Self {
        Self::new(Decoder::new())
    }
}

impl FramePrep {
    pub fn new(decoder: Decoder) -> Self {
        Self {
            decoder,
            mirror: true,
            t_orient: Timer::new("orient"),
        }
    }

    pub fn decoder_mut(&mut self) -> &mut Decoder {
        &mut self.decoder
    }

    /// Sets whether the post-rotation mirror is applied.
    ///
    /// This is independent of the decode-time mirror configured on the [`Decoder`].
    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    /// Returns the orientation used for frames from a camera facing `facing`.
    pub fn orientation(&self, facing: CameraFacing) -> Orientation {
        let mut orientation = Orientation::for_facing(facing);
        orientation.set_mirror(self.mirror);
        orientation
    }

    /// Decodes `frame` and orients it according to `facing`.
    pub fn prepare(&self, frame: &RawFrame, facing: CameraFacing) -> Result<Image, DecodeError> {
        let decoded = self.decoder.decode(frame)?;
        let orientation = self.orientation(facing);
        let image = self.t_orient.time(|| orientation.apply(&decoded));
        log::trace!("prepared {:?} for {:?} camera", image, facing);
        Ok(image)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        self.decoder.timers().chain([&self.t_orient])
    }
}
