//! End-to-end hand landmark pipeline.
//!
//! A [`HandPipeline`] accepts [`InboundFrame`]s from the camera host, prepares and submits them for
//! detection, and delivers the projected results as [`PipelineEvent`]s on a channel. The render
//! context receives those events and applies them to its [`Overlay`], or converts them to
//! [`OutboundMessage`]s for the host.

use std::{path::Path, time::Instant};

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::detection::{
    Callbacks, ClientError, DetectionClient, DetectorOptions, FrameContext, HandDetector,
    InitError, ModelAsset, RunningMode,
};
use crate::frame::RawFrame;
use crate::hand::{self, LandmarkPayload, Projection};
use crate::orient::{CameraFacing, FramePrep};
use crate::overlay::{Overlay, Surface};
use crate::resolution::Resolution;
use crate::timer::FpsCounter;

/// A camera frame as sent by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// NV21 frame data.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub is_front_camera: bool,
}

impl InboundFrame {
    pub fn facing(&self) -> CameraFacing {
        CameraFacing::from_front(self.is_front_camera)
    }

    pub fn into_raw(self) -> RawFrame {
        RawFrame::nv21(self.bytes, self.width, self.height)
    }
}

/// A message sent back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arguments", rename_all = "camelCase")]
pub enum OutboundMessage {
    HandLandmarkerResult(LandmarkPayload),
    HandLandmarkerError(String),
}

impl OutboundMessage {
    /// Renders the message as the JSON object sent over the host channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outcome of a processed frame, delivered to the render context.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Landmarks {
        projection: Projection,
        /// Size of the frame the landmarks were detected in.
        source: Resolution,
        timestamp_ms: u64,
    },
    Error {
        message: String,
        timestamp_ms: u64,
    },
}

impl PipelineEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Landmarks { timestamp_ms, .. } | Self::Error { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }

    pub fn to_message(&self) -> OutboundMessage {
        match self {
            Self::Landmarks { projection, .. } => {
                OutboundMessage::HandLandmarkerResult(projection.to_payload())
            }
            Self::Error { message, .. } => OutboundMessage::HandLandmarkerError(message.clone()),
        }
    }

    /// Displays the event on `overlay`.
    ///
    /// Landmarks replace the displayed skeleton. Errors leave the overlay untouched.
    pub fn apply_to<S: Surface>(self, overlay: &mut Overlay<S>) {
        match self {
            Self::Landmarks {
                projection, source, ..
            } => overlay.set_result(projection, source, RunningMode::LiveStream),
            Self::Error { .. } => {}
        }
    }
}

/// Produces strictly increasing millisecond timestamps from a monotonic clock.
pub struct FrameClock {
    start: Instant,
    last: Option<u64>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: None,
        }
    }

    /// Returns the milliseconds since the clock was created.
    ///
    /// If less than a millisecond has passed since the last call, the previous value plus one is
    /// returned instead.
    pub fn now_ms(&mut self) -> u64 {
        let elapsed = self.start.elapsed().as_millis() as u64;
        let now = match self.last {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last = Some(now);
        now
    }
}

/// Decodes, orients and submits camera frames, and reports detected hands as [`PipelineEvent`]s.
pub struct HandPipeline {
    prep: FramePrep,
    client: DetectionClient,
    clock: FrameClock,
    events: Receiver<PipelineEvent>,
    fps: FpsCounter,
}

impl HandPipeline {
    /// Starts the pipeline with a detector created by `loader` from the model at
    /// `model_asset_path`.
    pub fn start<D, L>(
        model_asset_path: impl AsRef<Path>,
        options: DetectorOptions,
        loader: L,
    ) -> Result<Self, InitError>
    where
        D: HandDetector,
        L: FnOnce(ModelAsset, &DetectorOptions) -> anyhow::Result<D>,
    {
        let (sender, events) = crossbeam_channel::unbounded();
        let error_sender = sender.clone();
        let callbacks = Callbacks::new(
            move |result, cx: FrameContext| {
                let Some(projection) = hand::project(Some(&result), cx.width(), cx.height()) else {
                    return;
                };
                let event = PipelineEvent::Landmarks {
                    projection,
                    source: cx.resolution(),
                    timestamp_ms: cx.timestamp_ms(),
                };
                if sender.send(event).is_err() {
                    log::trace!("pipeline event receiver gone, discarding result");
                }
            },
            move |error, cx: FrameContext| {
                let event = PipelineEvent::Error {
                    message: error.to_string(),
                    timestamp_ms: cx.timestamp_ms(),
                };
                if error_sender.send(event).is_err() {
                    log::trace!("pipeline event receiver gone, discarding error");
                }
            },
        );

        let client = DetectionClient::initialize(model_asset_path, options, loader, callbacks)?;
        Ok(Self {
            prep: FramePrep::default(),
            client,
            clock: FrameClock::new(),
            events,
            fps: FpsCounter::new("frame prep"),
        })
    }

    /// Gives access to the mirror settings of the frame preparation stage.
    pub fn prep_mut(&mut self) -> &mut FramePrep {
        &mut self.prep
    }

    pub fn client(&self) -> &DetectionClient {
        &self.client
    }

    /// Returns the channel on which the outcome of each processed frame is delivered.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Prepares `frame` and submits it for detection.
    ///
    /// Returns the submitted frame's [`FrameContext`], or [`None`] if the frame could not be decoded
    /// and was skipped. Detection results arrive later on [`HandPipeline::events`].
    pub fn handle_frame(
        &mut self,
        frame: InboundFrame,
    ) -> Result<Option<FrameContext>, ClientError> {
        let facing = frame.facing();
        let raw = frame.into_raw();
        let image = match self.prep.prepare(&raw, facing) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("skipping frame: {e}");
                return Ok(None);
            }
        };

        let context = self.client.submit(image, self.clock.now_ms())?;
        self.fps.tick_with(self.prep.timers());
        Ok(Some(context))
    }

    /// Shuts down detection. Results of frames that were still pending are never delivered.
    pub fn close(&mut self) {
        self.client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::NUM_LANDMARKS;
    use crate::test::{detection, diagonal_hand};

    #[test]
    fn clock_is_strictly_increasing() {
        let mut clock = FrameClock::new();
        let mut last = clock.now_ms();
        for _ in 0..1000 {
            let now = clock.now_ms();
            assert!(now > last);
            last = now;
        }
    }

    #[test]
    fn inbound_frame_from_json() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"bytes": [1, 2, 3, 4, 5, 6], "width": 2, "height": 2, "isFrontCamera": true}"#,
        )
        .unwrap();
        assert_eq!(frame.facing(), CameraFacing::Front);
        let raw = frame.into_raw();
        assert_eq!(raw.resolution(), Resolution::new(2, 2));
        assert_eq!(raw.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn outbound_messages() {
        let projection = Projection::from_detection(&detection([diagonal_hand(2)]), 20, 20);
        let event = PipelineEvent::Landmarks {
            projection,
            source: Resolution::new(20, 20),
            timestamp_ms: 7,
        };
        assert_eq!(
            serde_json::to_value(event.to_message()).unwrap(),
            serde_json::json!({
                "method": "handLandmarkerResult",
                "arguments": {
                    "points": [[0.0, 0.0], [1.0, 1.0]],
                    "lines": [[[0.0, 0.0], [1.0, 1.0]]],
                },
            })
        );

        let event = PipelineEvent::Error {
            message: "out of memory".into(),
            timestamp_ms: 8,
        };
        assert_eq!(event.timestamp_ms(), 8);
        assert_eq!(
            event.to_message().to_json().unwrap(),
            r#"{"method":"handLandmarkerError","arguments":"out of memory"}"#
        );
    }

    #[test]
    fn empty_detection_is_an_empty_message() {
        let event = PipelineEvent::Landmarks {
            projection: Projection::from_detection(&detection([]), 20, 20),
            source: Resolution::new(20, 20),
            timestamp_ms: 1,
        };
        let OutboundMessage::HandLandmarkerResult(payload) = event.to_message() else {
            panic!("expected a result message");
        };
        assert!(payload.points.is_empty());
        assert!(payload.lines.is_empty());

        let full = Projection::from_detection(&detection([diagonal_hand(21)]), 20, 20);
        assert_eq!(full.to_payload().points.len(), NUM_LANDMARKS);
    }
}
