//! Decoding of raw camera sensor frames.
//!
//! Camera previews deliver frames in a 12 bits-per-pixel YUV 4:2:0 layout: a full resolution luma
//! (Y) plane followed by chroma (U/V) samples covering 2x2 pixel blocks. [`Decoder`] validates such
//! a buffer against its declared dimensions and converts it to an RGB [`Image`].

use thiserror::Error;

use crate::image::Image;
use crate::resolution::Resolution;
use crate::timer::Timer;

/// Memory layout of a [`RawFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Y plane followed by interleaved `V, U` pairs. Android's default camera preview format.
    #[default]
    Nv21,
    /// Y plane followed by interleaved `U, V` pairs.
    Nv12,
    /// Y plane followed by a full U plane and a full V plane (also known as YUV420P).
    I420,
}

impl PixelFormat {
    /// Returns the number of bytes a frame of `res` occupies in this format.
    ///
    /// Chroma planes cover 2x2 pixel blocks, so odd dimensions are rounded up for them. Returns
    /// [`None`] if the size does not fit in a `usize`.
    pub fn frame_size(&self, res: Resolution) -> Option<usize> {
        let (w, h) = (res.width() as usize, res.height() as usize);
        let luma = w.checked_mul(h)?;
        let chroma = chroma_width(res).checked_mul(chroma_height(res))?;
        luma.checked_add(chroma.checked_mul(2)?)
    }
}

fn chroma_width(res: Resolution) -> usize {
    (res.width() as usize + 1) / 2
}

fn chroma_height(res: Resolution) -> usize {
    (res.height() as usize + 1) / 2
}

/// A raw camera frame as delivered by the sensor.
#[derive(Clone)]
pub struct RawFrame {
    data: Vec<u8>,
    resolution: Resolution,
    format: PixelFormat,
}

impl RawFrame {
    /// Wraps raw frame bytes with their declared size and format.
    ///
    /// The buffer is not validated until it is decoded.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            resolution: Resolution::new(width, height),
            format,
        }
    }

    /// Wraps an NV21 buffer.
    pub fn nv21(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(data, width, height, PixelFormat::Nv21)
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the declared frame size.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?} RawFrame ({} bytes)",
            self.resolution,
            self.format,
            self.data.len()
        )
    }
}

/// Errors that prevent a [`RawFrame`] from being decoded.
///
/// A decode error only affects the frame it was raised for.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame has no pixels ({0})")]
    EmptyFrame(Resolution),
    #[error("frame of {resolution} is too large to be addressed")]
    TooLarge { resolution: Resolution },
    #[error("buffer holds {actual} bytes, but a {resolution} {format:?} frame needs {expected}")]
    BufferSize {
        resolution: Resolution,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Converts [`RawFrame`]s to RGB [`Image`]s.
///
/// Sensor output is mirrored, so by default the decoded image is flipped horizontally to undo
/// that. The flip can be disabled with [`Decoder::set_mirror`].
pub struct Decoder {
    mirror: bool,
    t_decode: Timer,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            mirror: true,
            t_decode: Timer::new("decode"),
        }
    }

    /// Sets whether the decoded image is flipped horizontally.
    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    /// Decodes `frame` into an RGB image.
    ///
    /// The buffer size is checked against the declared dimensions before any pixel is converted,
    /// so this never yields a partially decoded image.
    pub fn decode(&self, frame: &RawFrame) -> Result<Image, DecodeError> {
        let res = frame.resolution();
        if res.is_empty() {
            return Err(DecodeError::EmptyFrame(res));
        }
        let expected = frame
            .format()
            .frame_size(res)
            .ok_or(DecodeError::TooLarge { resolution: res })?;
        if frame.data().len() != expected {
            return Err(DecodeError::BufferSize {
                resolution: res,
                format: frame.format(),
                expected,
                actual: frame.data().len(),
            });
        }

        let image = self.t_decode.time(|| convert(frame));
        log::trace!("decoded {:?} to {:?}", frame, image);

        Ok(if self.mirror {
            image.flip_horizontal()
        } else {
            image
        })
    }

    /// Returns the profiling timer for YUV conversion.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_decode].into_iter()
    }
}

/// Byte offsets of the U and V sample for chroma block `(cx, cy)`.
fn chroma_offsets(format: PixelFormat, res: Resolution, cx: usize, cy: usize) -> (usize, usize) {
    let luma = res.width() as usize * res.height() as usize;
    let (cw, ch) = (chroma_width(res), chroma_height(res));
    match format {
        PixelFormat::Nv21 => {
            let base = luma + (cy * cw + cx) * 2;
            (base + 1, base)
        }
        PixelFormat::Nv12 => {
            let base = luma + (cy * cw + cx) * 2;
            (base, base + 1)
        }
        PixelFormat::I420 => {
            let u = luma + cy * cw + cx;
            (u, u + cw * ch)
        }
    }
}

/// Assumes the buffer size has been validated.
fn convert(frame: &RawFrame) -> Image {
    let res = frame.resolution();
    let (w, h) = (res.width() as usize, res.height() as usize);
    let data = frame.data();

    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let luma = data[y * w + x];
            let (u, v) = chroma_offsets(frame.format(), res, x / 2, y / 2);
            rgb.extend_from_slice(&yuv_to_rgb(luma, data[u], data[v]));
        }
    }

    Image::from_rgb8(res, rgb)
}

/// BT.601 limited range YUV to RGB conversion, in 10-bit fixed point.
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = (i32::from(y) - 16).max(0) * 1192;
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;

    let r = (y + 1634 * v) >> 10;
    let g = (y - 833 * v - 400 * u) >> 10;
    let b = (y + 2066 * u) >> 10;

    [r, g, b].map(|c| c.clamp(0, 255) as u8)
}
