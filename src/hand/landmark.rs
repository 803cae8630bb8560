use std::ops::Index;

use serde::{Deserialize, Serialize};

/// A landmark position relative to the frame it was detected in.
///
/// `x` and `y` are in range `[0, 1]` for landmarks inside the frame, but detectors may place
/// occluded joints slightly outside of it. `z` is the depth relative to the wrist, with roughly the
/// same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl NormalizedLandmark {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub const fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// The landmarks of a single detected hand, in detector index order.
///
/// A complete hand has [`NUM_LANDMARKS`] landmarks, indexed by [`LandmarkIdx`]. Detectors may
/// report fewer, in which case only the edges between reported landmarks are projected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandLandmarks {
    landmarks: Vec<NormalizedLandmark>,
    #[serde(default)]
    handedness: Option<Handedness>,
    #[serde(default)]
    score: f32,
}

impl HandLandmarks {
    pub fn new(landmarks: Vec<NormalizedLandmark>) -> Self {
        Self {
            landmarks,
            handedness: None,
            score: 0.0,
        }
    }

    /// Attaches the detector's handedness classification and its confidence score.
    pub fn with_handedness(mut self, handedness: Handedness, score: f32) -> Self {
        self.handedness = Some(handedness);
        self.score = score;
        self
    }

    #[inline]
    pub fn landmarks(&self) -> &[NormalizedLandmark] {
        &self.landmarks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Returns the landmark at `idx`, or [`None`] if the detector did not report it.
    pub fn get(&self, idx: LandmarkIdx) -> Option<&NormalizedLandmark> {
        self.landmarks.get(idx as usize)
    }

    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    pub fn handedness_score(&self) -> f32 {
        self.score
    }
}

impl Index<LandmarkIdx> for HandLandmarks {
    type Output = NormalizedLandmark;

    fn index(&self, idx: LandmarkIdx) -> &NormalizedLandmark {
        &self.landmarks[idx as usize]
    }
}

/// Output of a hand detector for one frame: zero or more hands, in detection order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    hands: Vec<HandLandmarks>,
}

impl DetectionResult {
    pub fn new(hands: Vec<HandLandmarks>) -> Self {
        Self { hands }
    }

    /// A result without any hands in it.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn hands(&self) -> &[HandLandmarks] {
        &self.hands
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}

/// Number of landmarks in a complete hand.
pub const NUM_LANDMARKS: usize = 21;

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Pairs of landmarks that are connected by a bone, in drawing order.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};
