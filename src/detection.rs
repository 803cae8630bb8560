//! Hand landmark detection.
//!
//! The detection engine itself is opaque: anything implementing [`HandDetector`] can be plugged
//! into a [`DetectionClient`], which runs it on a background thread and reports results through
//! [`Callbacks`].
//!
//! # Environment Variables
//!
//! - `HANDMARK_DELEGATE`: `cpu` or `gpu`; sets the default [`Delegate`] of [`DetectorOptions`].

pub mod client;
pub mod scripted;

use std::{
    env::{self, VarError},
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::hand::DetectionResult;
use crate::image::Image;
use crate::resolution::Resolution;
use crate::worker::Backlog;

pub use client::{Callbacks, ClientError, ClientState, DetectionClient};

/// A hand landmark detection engine.
///
/// Implementations are moved to a worker thread by [`DetectionClient`], and then only accessed from
/// that thread.
pub trait HandDetector: Send + 'static {
    /// Detects hands in `image`.
    ///
    /// `timestamp_ms` is strictly increasing between calls, which allows stateful engines to track
    /// hands across frames.
    fn detect(&mut self, image: &Image, timestamp_ms: u64) -> Result<DetectionResult, DetectorError>;
}

impl<F> HandDetector for F
where
    F: FnMut(&Image, u64) -> Result<DetectionResult, DetectorError> + Send + 'static,
{
    fn detect(&mut self, image: &Image, timestamp_ms: u64) -> Result<DetectionResult, DetectorError> {
        self(image, timestamp_ms)
    }
}

/// A failure reported by a [`HandDetector`] for a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DetectorError {
    message: String,
}

impl DetectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Identifies a submitted frame.
///
/// Created by [`DetectionClient::submit`] and handed back to the callback that reports the frame's
/// outcome, so that results can be interpreted in terms of the frame they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    width: u32,
    height: u32,
    timestamp_ms: u64,
}

impl FrameContext {
    pub fn new(resolution: Resolution, timestamp_ms: u64) -> Self {
        Self {
            width: resolution.width(),
            height: resolution.height(),
            timestamp_ms,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    #[inline]
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// How a detection engine processes input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    /// Independent still images.
    Image,
    /// Decoded video, processed synchronously frame by frame.
    Video,
    /// Live camera frames, processed asynchronously.
    LiveStream,
}

/// Hardware the detection engine should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delegate {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Error)]
#[error("invalid delegate '{0}' (expected 'cpu' or 'gpu')")]
pub struct InvalidDelegate(String);

impl FromStr for Delegate {
    type Err = InvalidDelegate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(InvalidDelegate(s.to_string())),
        }
    }
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

const DELEGATE_VAR: &str = "HANDMARK_DELEGATE";

static DEFAULT_DELEGATE: Lazy<Delegate> = Lazy::new(|| match env::var(DELEGATE_VAR) {
    Ok(v) => match v.parse() {
        Ok(delegate) => {
            log::debug!("using {delegate} delegate from `{DELEGATE_VAR}`");
            delegate
        }
        Err(e) => {
            log::warn!("ignoring `{DELEGATE_VAR}` variable: {e}");
            Delegate::default()
        }
    },
    Err(VarError::NotPresent) => Delegate::default(),
    Err(VarError::NotUnicode(s)) => {
        log::warn!(
            "ignoring `{DELEGATE_VAR}` variable: invalid value {}",
            s.to_string_lossy()
        );
        Delegate::default()
    }
});

/// Detector configuration.
///
/// The defaults run on the [`Delegate`] selected by `HANDMARK_DELEGATE` (CPU if unset), use
/// confidence thresholds of 0.5 and detect a single hand.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    delegate: Delegate,
    min_hand_detection_confidence: f32,
    min_tracking_confidence: f32,
    min_hand_presence_confidence: f32,
    num_hands: u32,
    backlog: Backlog,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            delegate: *DEFAULT_DELEGATE,
            min_hand_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            min_hand_presence_confidence: 0.5,
            num_hands: 1,
            backlog: Backlog::default(),
        }
    }
}

impl DetectorOptions {
    #[inline]
    pub fn delegate(self, delegate: Delegate) -> Self {
        Self { delegate, ..self }
    }

    /// Sets the minimum confidence score for a palm detection to be considered successful.
    #[inline]
    pub fn min_hand_detection_confidence(self, confidence: f32) -> Self {
        Self {
            min_hand_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum confidence score for a hand to keep being tracked between frames.
    ///
    /// If tracking fails, the engine falls back to detecting hands from scratch.
    #[inline]
    pub fn min_tracking_confidence(self, confidence: f32) -> Self {
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum hand presence score for landmarks to be reported.
    #[inline]
    pub fn min_hand_presence_confidence(self, confidence: f32) -> Self {
        Self {
            min_hand_presence_confidence: confidence,
            ..self
        }
    }

    /// Sets the maximum number of hands to detect per frame.
    #[inline]
    pub fn num_hands(self, num_hands: u32) -> Self {
        Self { num_hands, ..self }
    }

    /// Sets what happens to frames submitted while the detector is busy.
    ///
    /// By default, [`Backlog::Latest`] is used, so only the newest waiting frame is kept.
    #[inline]
    pub fn backlog(self, backlog: Backlog) -> Self {
        Self { backlog, ..self }
    }

    pub fn get_delegate(&self) -> Delegate {
        self.delegate
    }

    pub fn get_min_hand_detection_confidence(&self) -> f32 {
        self.min_hand_detection_confidence
    }

    pub fn get_min_tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }

    pub fn get_min_hand_presence_confidence(&self) -> f32 {
        self.min_hand_presence_confidence
    }

    pub fn get_num_hands(&self) -> u32 {
        self.num_hands
    }

    pub fn get_backlog(&self) -> Backlog {
        self.backlog
    }

    /// Frames submitted through a [`DetectionClient`] are always processed as a live stream.
    pub fn running_mode(&self) -> RunningMode {
        RunningMode::LiveStream
    }

    fn validate(&self) -> Result<(), InitError> {
        for (name, value) in [
            (
                "min_hand_detection_confidence",
                self.min_hand_detection_confidence,
            ),
            ("min_tracking_confidence", self.min_tracking_confidence),
            (
                "min_hand_presence_confidence",
                self.min_hand_presence_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(InitError::InvalidOptions(format!(
                    "{name} must be in range 0..=1, got {value}"
                )));
            }
        }
        if self.num_hands == 0 {
            return Err(InitError::InvalidOptions(
                "num_hands must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// The contents of a model file, loaded once when a [`DetectionClient`] is initialized.
#[derive(Clone)]
pub struct ModelAsset {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl ModelAsset {
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        log::debug!("loaded {} byte model from {}", bytes.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelAsset({}, {} bytes)", self.path.display(), self.bytes.len())
    }
}

/// Errors that prevent a [`DetectionClient`] from being created.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid detector options: {0}")]
    InvalidOptions(String),
    #[error("failed to load model asset from {}", path.display())]
    ModelAsset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create detector backend: {0}")]
    Backend(#[source] anyhow::Error),
    #[error("failed to spawn detection worker")]
    Spawn(#[source] io::Error),
}
