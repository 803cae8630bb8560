//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned 8-bit RGB raster.
//! - Pure geometric transforms on it ([`Image::rotate`], [`Image::flip_horizontal`]).
//! - A small set of [`draw`] functions for rendering overlays onto an [`Image`].

pub mod draw;


use std::{fmt, ops::Index, path::Path};

use embedded_graphics::{pixelcolor::raw::RawU24, prelude::PixelColor};
use image::{imageops, ImageBuffer, Rgb, RgbImage};
use nalgebra::{Point2, Rotation2};

use crate::resolution::Resolution;

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }
}

/// An owned 8-bit sRGB image without alpha channel.
///
/// Every transform returns a new [`Image`]; the source is never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub(crate) buf: RgbImage,
}

impl Image {
    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image from tightly packed RGB8 data.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not contain exactly `3 * width * height` bytes.
    pub fn from_rgb8(res: Resolution, buf: Vec<u8>) -> Self {
        let expected_size = res.width() as usize * res.height() as usize * 3;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        Self {
            buf: ImageBuffer::from_raw(res.width(), res.height(), buf)
                .expect("buffer size does not match image resolution"),
        }
    }

    /// Creates an image by evaluating `f` for every pixel coordinate.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        Self {
            buf: ImageBuffer::from_fn(width, height, |x, y| Rgb(f(x, y).0)),
        }
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        let format = ImageFormat::from_path(path)?;
        log::trace!("saving {:?} as {:?} to {}", self, format, path.display());
        Ok(self.buf.save(path)?)
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgb(color.0);
    }

    /// Mirrors the image about its vertical axis.
    pub fn flip_horizontal(&self) -> Image {
        Image {
            buf: imageops::flip_horizontal(&self.buf),
        }
    }

    /// Mirrors the image about its horizontal axis.
    pub fn flip_vertical(&self) -> Image {
        Image {
            buf: imageops::flip_vertical(&self.buf),
        }
    }

    /// Rotates the image about its center by `degrees`.
    ///
    /// Positive angles rotate clockwise as displayed (the Y axis points down). The result has the
    /// size of the rotated image's bounding box, so width and height swap for quarter turns.
    ///
    /// Multiples of 90° are exact pixel permutations. Any other angle is resampled with
    /// nearest-neighbor sampling, and the corners not covered by the source are black.
    pub fn rotate(&self, degrees: f32) -> Image {
        let normalized = degrees.rem_euclid(360.0);
        let buf = if normalized == 0.0 {
            self.buf.clone()
        } else if normalized == 90.0 {
            imageops::rotate90(&self.buf)
        } else if normalized == 180.0 {
            imageops::rotate180(&self.buf)
        } else if normalized == 270.0 {
            imageops::rotate270(&self.buf)
        } else {
            return self.rotate_resampled(normalized.to_radians());
        };

        Image { buf }
    }

    fn rotate_resampled(&self, radians: f32) -> Image {
        let rotation = Rotation2::new(radians);
        let (w, h) = (self.width() as f32, self.height() as f32);
        let center = Point2::new(w / 2.0, h / 2.0);

        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for [x, y] in [[0.0, 0.0], [w, 0.0], [0.0, h], [w, h]] {
            let p = rotation * (Point2::new(x, y) - center);
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        // Shave off float noise so that an exact fit doesn't grow by a pixel.
        const EPS: f32 = 1e-3;
        let out_w = (max_x - min_x - EPS).ceil().max(1.0) as u32;
        let out_h = (max_y - min_y - EPS).ceil().max(1.0) as u32;
        let out_center = Point2::new(out_w as f32 / 2.0, out_h as f32 / 2.0);

        let inverse = rotation.inverse();
        let buf = ImageBuffer::from_fn(out_w, out_h, |x, y| {
            let dst = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
            let src = center + inverse * (dst - out_center);
            let (sx, sy) = (src.x.floor(), src.y.floor());
            if sx < 0.0 || sy < 0.0 || sx >= w || sy >= h {
                Rgb([0, 0, 0])
            } else {
                self.buf[(sx as u32, sy as u32)]
            }
        });

        log::trace!(
            "resampled {:?} by {:.1}° into {}x{}",
            self,
            radians.to_degrees(),
            out_w,
            out_h
        );
        Image { buf }
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns the tightly packed RGB8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An 8-bit RGB color in the sRGB color space.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 3]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0]);
    pub const WHITE: Self = Self([255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0]);
    pub const GREEN: Self = Self([0, 255, 0]);
    pub const BLUE: Self = Self([0, 0, 255]);
    pub const YELLOW: Self = Self([255, 255, 0]);
    pub const MAGENTA: Self = Self([255, 0, 255]);
    pub const CYAN: Self = Self([0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r(), self.g(), self.b())
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

// FIXME leaks `embedded-graphics` dependency
impl PixelColor for Color {
    type Raw = RawU24;
}
