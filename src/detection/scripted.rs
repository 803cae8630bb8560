//! A detector that replays a predefined script.
//!
//! Useful for tests and demos that need deterministic detection results without a real model.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::hand::DetectionResult;
use crate::image::Image;
use crate::resolution::Resolution;

use super::{DetectorError, HandDetector};

/// A frame that was passed to a [`ScriptedDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenFrame {
    pub resolution: Resolution,
    pub timestamp_ms: u64,
}

/// Shared record of the frames a [`ScriptedDetector`] has processed.
///
/// Remains accessible after the detector has been moved into a [`DetectionClient`].
///
/// [`DetectionClient`]: super::DetectionClient
#[derive(Debug, Clone, Default)]
pub struct SeenFrames(Arc<Mutex<Vec<SeenFrame>>>);

impl SeenFrames {
    /// Returns a copy of the frames seen so far, in processing order.
    pub fn get(&self) -> Vec<SeenFrame> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, frame: SeenFrame) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(frame);
    }
}

/// A [`HandDetector`] returning queued outcomes in order.
///
/// Once the script is exhausted, every frame yields a result without hands.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    script: VecDeque<Result<DetectionResult, DetectorError>>,
    seen: SeenFrames,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful detection result.
    pub fn push_result(&mut self, result: DetectionResult) -> &mut Self {
        self.script.push_back(Ok(result));
        self
    }

    /// Queues a detection failure.
    pub fn push_error(&mut self, error: DetectorError) -> &mut Self {
        self.script.push_back(Err(error));
        self
    }

    /// Returns a handle to the record of processed frames.
    pub fn seen(&self) -> SeenFrames {
        self.seen.clone()
    }
}

impl HandDetector for ScriptedDetector {
    fn detect(&mut self, image: &Image, timestamp_ms: u64) -> Result<DetectionResult, DetectorError> {
        self.seen.push(SeenFrame {
            resolution: image.resolution(),
            timestamp_ms,
        });
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(DetectionResult::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{detection, diagonal_hand};

    #[test]
    fn replays_script() {
        let mut detector = ScriptedDetector::new();
        detector
            .push_result(detection([diagonal_hand(21)]))
            .push_error(DetectorError::new("boom"));
        let seen = detector.seen();

        let image = Image::new(8, 6);
        assert_eq!(detector.detect(&image, 1).unwrap().hands().len(), 1);
        assert_eq!(detector.detect(&image, 2).unwrap_err().message(), "boom");
        assert!(detector.detect(&image, 3).unwrap().is_empty());

        let seen = seen.get();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|f| f.resolution == Resolution::new(8, 6)));
        assert_eq!(
            seen.iter().map(|f| f.timestamp_ms).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }
}
