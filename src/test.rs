use crate::frame::{PixelFormat, RawFrame};
use crate::hand::{DetectionResult, HandLandmarks, Handedness, NormalizedLandmark};
use crate::image::{Color, Image};
use crate::resolution::Resolution;

/// Builds an NV21 frame with the given luma and neutral chroma.
pub fn nv21_frame(width: u32, height: u32, luma: impl Fn(u32, u32) -> u8) -> RawFrame {
    let res = Resolution::new(width, height);
    let mut data = Vec::new();
    for y in 0..height {
        for x in 0..width {
            data.push(luma(x, y));
        }
    }
    let len = PixelFormat::Nv21.frame_size(res).unwrap();
    data.resize(len, 128);
    RawFrame::nv21(data, width, height)
}

/// Builds a frame with uniform `y`, `u` and `v` samples, laid out according to `format`.
pub fn yuv_frame(width: u32, height: u32, format: PixelFormat, y: u8, u: u8, v: u8) -> RawFrame {
    let res = Resolution::new(width, height);
    let luma = (width * height) as usize;
    let chroma = ((width as usize + 1) / 2) * ((height as usize + 1) / 2);

    let mut data = vec![y; luma];
    match format {
        PixelFormat::Nv21 => (0..chroma).for_each(|_| data.extend([v, u])),
        PixelFormat::Nv12 => (0..chroma).for_each(|_| data.extend([u, v])),
        PixelFormat::I420 => {
            data.extend(std::iter::repeat(u).take(chroma));
            data.extend(std::iter::repeat(v).take(chroma));
        }
    }
    assert_eq!(Some(data.len()), format.frame_size(res));

    RawFrame::new(data, width, height, format)
}

/// An image where every pixel has a distinct color.
pub fn gradient_image(width: u32, height: u32) -> Image {
    Image::from_fn(width, height, |x, y| {
        Color::from_rgb8((x * 8) as u8, (y * 8) as u8, 128)
    })
}

/// A hand with `count` landmarks placed on a diagonal.
pub fn diagonal_hand(count: usize) -> HandLandmarks {
    let landmarks = (0..count)
        .map(|i| {
            let t = i as f32 / 20.0;
            NormalizedLandmark::new(t, t)
        })
        .collect();
    HandLandmarks::new(landmarks).with_handedness(Handedness::Right, 0.9)
}

pub fn detection(hands: impl IntoIterator<Item = HandLandmarks>) -> DetectionResult {
    DetectionResult::new(hands.into_iter().collect())
}
