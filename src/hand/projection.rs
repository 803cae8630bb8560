use serde::{Deserialize, Serialize};

use super::{DetectionResult, HandLandmarks, CONNECTIVITY};

/// A landmark position in pixels of the frame it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelLandmark {
    pub x: f32,
    pub y: f32,
}

impl PixelLandmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns this landmark scaled by `factor` about the origin.
    #[inline]
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

/// A bone connecting two landmarks of the same hand.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkeletonEdge {
    pub start: PixelLandmark,
    pub end: PixelLandmark,
}

/// Pixel-space skeleton of all hands in a [`DetectionResult`].
///
/// Points and lines of all hands are concatenated in detection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    points: Vec<PixelLandmark>,
    lines: Vec<SkeletonEdge>,
}

impl Projection {
    /// Projects `result` into a frame of `width x height` pixels.
    ///
    /// The dimensions must be those of the frame the result was computed from.
    pub fn from_detection(result: &DetectionResult, width: u32, height: u32) -> Self {
        let mut projection = Self::default();
        for hand in result.hands() {
            projection.push_hand(hand, width as f32, height as f32);
        }
        projection
    }

    fn push_hand(&mut self, hand: &HandLandmarks, width: f32, height: f32) {
        let first = self.points.len();
        self.points.extend(
            hand.landmarks()
                .iter()
                .map(|lm| PixelLandmark::new(lm.x * width, lm.y * height)),
        );

        let points = &self.points[first..];
        for &(start, end) in CONNECTIVITY {
            let (start, end) = (start as usize, end as usize);
            if start < points.len() && end < points.len() {
                self.lines.push(SkeletonEdge {
                    start: points[start],
                    end: points[end],
                });
            }
        }
    }

    #[inline]
    pub fn points(&self) -> &[PixelLandmark] {
        &self.points
    }

    #[inline]
    pub fn lines(&self) -> &[SkeletonEdge] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Converts the projection to its message representation.
    pub fn to_payload(&self) -> LandmarkPayload {
        LandmarkPayload {
            points: self.points.iter().map(|p| [p.x, p.y]).collect(),
            lines: self
                .lines
                .iter()
                .map(|l| [[l.start.x, l.start.y], [l.end.x, l.end.y]])
                .collect(),
        }
    }
}

/// Serializable form of a [`Projection`].
///
/// Points are `[x, y]` pairs, lines are pairs of points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPayload {
    pub points: Vec<[f32; 2]>,
    pub lines: Vec<[[f32; 2]; 2]>,
}

/// Projects an optional detection result into a frame of `width x height` pixels.
///
/// Returns [`None`] if there is no result to project. A result without hands yields an empty
/// [`Projection`] instead.
pub fn project(result: Option<&DetectionResult>, width: u32, height: u32) -> Option<Projection> {
    result.map(|result| Projection::from_detection(result, width, height))
}
