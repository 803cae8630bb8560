//! Asynchronous detection client.

use std::path::Path;

use thiserror::Error;

use crate::hand::DetectionResult;
use crate::image::Image;
use crate::timer::{FpsCounter, Timer};
use crate::worker::Worker;

use super::{DetectorError, DetectorOptions, FrameContext, HandDetector, InitError, ModelAsset};

type ResultCallback = Box<dyn FnMut(DetectionResult, FrameContext) + Send>;
type ErrorCallback = Box<dyn FnMut(DetectorError, FrameContext) + Send>;

/// Receivers for the outcome of submitted frames.
///
/// Both callbacks are invoked on the detection worker thread. Exactly one of them is called for
/// every frame the detector processes.
pub struct Callbacks {
    on_result: ResultCallback,
    on_error: ErrorCallback,
}

impl Callbacks {
    pub fn new<R, E>(on_result: R, on_error: E) -> Self
    where
        R: FnMut(DetectionResult, FrameContext) + Send + 'static,
        E: FnMut(DetectorError, FrameContext) + Send + 'static,
    {
        Self {
            on_result: Box::new(on_result),
            on_error: Box::new(on_error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Accepting frames.
    Ready,
    /// [`DetectionClient::close`] has been called, or the client was shut down.
    Closed,
}

/// Errors returned by [`DetectionClient::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("detection client is closed")]
    Closed,
    #[error("frame timestamp {timestamp_ms}ms does not follow previous timestamp {previous_ms}ms")]
    NonMonotonicTimestamp { previous_ms: u64, timestamp_ms: u64 },
}

struct Job {
    image: Image,
    context: FrameContext,
}

/// Runs a [`HandDetector`] on a background thread.
///
/// Frames are handed to the detector with [`DetectionClient::submit`], which returns immediately.
/// The outcome of each processed frame is reported through the [`Callbacks`] passed to
/// [`DetectionClient::initialize`], together with the [`FrameContext`] of that frame.
///
/// Dropping the client closes it.
pub struct DetectionClient {
    worker: Worker<Job>,
    options: DetectorOptions,
    last_timestamp: Option<u64>,
    dropped_frames: u64,
}

impl DetectionClient {
    /// Loads the model at `model_asset_path`, creates a detector from it using `loader`, and starts
    /// the detection worker.
    pub fn initialize<D, L>(
        model_asset_path: impl AsRef<Path>,
        options: DetectorOptions,
        loader: L,
        callbacks: Callbacks,
    ) -> Result<Self, InitError>
    where
        D: HandDetector,
        L: FnOnce(ModelAsset, &DetectorOptions) -> anyhow::Result<D>,
    {
        options.validate()?;

        let path = model_asset_path.as_ref();
        let asset = ModelAsset::load(path).map_err(|source| InitError::ModelAsset {
            path: path.to_path_buf(),
            source,
        })?;
        let detector = loader(asset, &options).map_err(InitError::Backend)?;

        let worker = Worker::builder()
            .name("hand detection")
            .backlog(options.get_backlog())
            .spawn(detection_loop(detector, callbacks))
            .map_err(InitError::Spawn)?;

        log::debug!("detection client ready ({:?})", options);
        Ok(Self {
            worker,
            options,
            last_timestamp: None,
            dropped_frames: 0,
        })
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    pub fn state(&self) -> ClientState {
        if self.worker.is_closed() {
            ClientState::Closed
        } else {
            ClientState::Ready
        }
    }

    /// Returns the number of submitted frames that were never handed to the detector.
    ///
    /// Frames are dropped when a newer frame displaces them under [`Backlog::Latest`], or when they
    /// are still pending while the client is closed.
    ///
    /// [`Backlog::Latest`]: crate::worker::Backlog::Latest
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Submits `image` for detection.
    ///
    /// Returns the [`FrameContext`] that will be passed to the callback reporting this frame's
    /// outcome. `timestamp_ms` must be greater than the timestamp of the previously submitted frame.
    ///
    /// This never waits for the detector. If the detector thread has panicked, the panic is
    /// propagated to the caller.
    pub fn submit(&mut self, image: Image, timestamp_ms: u64) -> Result<FrameContext, ClientError> {
        if self.state() == ClientState::Closed {
            return Err(ClientError::Closed);
        }
        if let Some(previous_ms) = self.last_timestamp {
            if timestamp_ms <= previous_ms {
                return Err(ClientError::NonMonotonicTimestamp {
                    previous_ms,
                    timestamp_ms,
                });
            }
        }

        let context = FrameContext::new(image.resolution(), timestamp_ms);
        match self.worker.send(Job { image, context }) {
            Ok(None) => {}
            Ok(Some(displaced)) => {
                self.dropped_frames += 1;
                log::debug!(
                    "dropping frame {}ms in favor of {}ms ({} dropped so far)",
                    displaced.context.timestamp_ms(),
                    timestamp_ms,
                    self.dropped_frames,
                );
            }
            Err(_) => {
                self.worker.close();
                return Err(ClientError::Closed);
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        log::trace!("submitted {:?}", context);
        Ok(context)
    }

    /// Closes the client.
    ///
    /// Frames that were not yet handed to the detector are discarded without invoking a callback.
    /// Blocks until a frame that is currently being processed has been reported. Closing an already
    /// closed client does nothing.
    pub fn close(&mut self) {
        if self.state() == ClientState::Closed {
            return;
        }
        let discarded = self.worker.close();
        self.dropped_frames += discarded as u64;
        log::debug!("detection client closed ({discarded} pending frames discarded)");
    }
}

fn detection_loop<D: HandDetector>(
    mut detector: D,
    mut callbacks: Callbacks,
) -> impl FnMut(Job) + Send {
    let t_detect = Timer::new("detect");
    let mut fps = FpsCounter::new("hand detection");
    move |job: Job| {
        let Job { image, context } = job;
        match t_detect.time(|| detector.detect(&image, context.timestamp_ms())) {
            Ok(result) => {
                log::trace!("{} hands in {:?}", result.hands().len(), context);
                (callbacks.on_result)(result, context);
            }
            Err(e) => {
                log::error!("detection failed for {:?}: {}", context, e);
                (callbacks.on_error)(e, context);
            }
        }
        fps.tick_with([&t_detect]);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        time::Duration,
    };

    use crossbeam_channel::{Receiver, Sender};

    use super::*;
    use crate::detection::scripted::ScriptedDetector;
    use crate::resolution::Resolution;
    use crate::worker::Backlog;

    const MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");

    enum Outcome {
        Result(DetectionResult, FrameContext),
        Error(DetectorError, FrameContext),
    }

    fn channel_callbacks() -> (Callbacks, Receiver<Outcome>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let err_tx = tx.clone();
        let callbacks = Callbacks::new(
            move |result, cx| tx.send(Outcome::Result(result, cx)).unwrap(),
            move |error, cx| err_tx.send(Outcome::Error(error, cx)).unwrap(),
        );
        (callbacks, rx)
    }

    fn client_with<D: HandDetector>(
        detector: D,
        options: DetectorOptions,
    ) -> (DetectionClient, Receiver<Outcome>) {
        let (callbacks, rx) = channel_callbacks();
        let client =
            DetectionClient::initialize(MODEL, options, move |_, _| Ok(detector), callbacks)
                .unwrap();
        (client, rx)
    }

    /// A detector that reports each frame on `started` and then waits for `gate` to close.
    fn gated_detector() -> (impl HandDetector, Receiver<u64>, Sender<()>) {
        let (started_tx, started) = crossbeam_channel::unbounded();
        let (gate, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let detector = move |_: &Image, ts: u64| -> Result<DetectionResult, DetectorError> {
            started_tx.send(ts).ok();
            gate_rx.recv().ok();
            Ok(DetectionResult::empty())
        };
        (detector, started, gate)
    }

    #[test]
    fn init_errors() {
        let (callbacks, _) = channel_callbacks();
        let err = DetectionClient::initialize(
            MODEL,
            DetectorOptions::default().num_hands(0),
            |_, _| Ok(ScriptedDetector::new()),
            callbacks,
        )
        .err()
        .unwrap();
        assert!(matches!(err, InitError::InvalidOptions(_)), "{err}");

        let (callbacks, _) = channel_callbacks();
        let err = DetectionClient::initialize(
            "/nonexistent/hand_landmarker.task",
            DetectorOptions::default(),
            |_, _| Ok(ScriptedDetector::new()),
            callbacks,
        )
        .err()
        .unwrap();
        assert!(matches!(err, InitError::ModelAsset { .. }), "{err}");

        let (callbacks, _) = channel_callbacks();
        let err = DetectionClient::initialize(
            MODEL,
            DetectorOptions::default(),
            |_, _| -> anyhow::Result<ScriptedDetector> { anyhow::bail!("no GPU available") },
            callbacks,
        )
        .err()
        .unwrap();
        assert!(matches!(err, InitError::Backend(_)), "{err}");
        assert!(err.to_string().contains("no GPU available"));
    }

    #[test]
    fn loader_receives_asset_and_options() {
        let (callbacks, _) = channel_callbacks();
        let options = DetectorOptions::default().num_hands(2);
        let client = DetectionClient::initialize(
            MODEL,
            options.clone(),
            |asset, opts| {
                assert!(asset.path().ends_with("Cargo.toml"));
                assert!(!asset.bytes().is_empty());
                assert_eq!(opts.get_num_hands(), 2);
                Ok(ScriptedDetector::new())
            },
            callbacks,
        )
        .unwrap();
        assert_eq!(client.options(), &options);
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[test]
    fn every_frame_is_reported_with_its_own_size() {
        let (mut client, rx) = client_with(
            ScriptedDetector::new(),
            DetectorOptions::default().backlog(Backlog::Unbounded),
        );

        let sizes = [(4, 8), (10, 3), (1, 1), (7, 7)];
        for (i, &(w, h)) in sizes.iter().enumerate() {
            let cx = client.submit(Image::new(w, h), i as u64 + 1).unwrap();
            assert_eq!(cx.resolution(), Resolution::new(w, h));
        }

        for (i, &(w, h)) in sizes.iter().enumerate() {
            match rx.recv().unwrap() {
                Outcome::Result(result, cx) => {
                    assert!(result.is_empty());
                    assert_eq!(cx.resolution(), Resolution::new(w, h));
                    assert_eq!(cx.timestamp_ms(), i as u64 + 1);
                }
                Outcome::Error(e, _) => panic!("unexpected error {e}"),
            }
        }
        client.close();
        assert_eq!(client.dropped_frames(), 0);
    }

    #[test]
    fn rejects_non_monotonic_timestamps() {
        let (mut client, _rx) = client_with(ScriptedDetector::new(), DetectorOptions::default());
        client.submit(Image::new(2, 2), 10).unwrap();
        assert_eq!(
            client.submit(Image::new(2, 2), 10),
            Err(ClientError::NonMonotonicTimestamp {
                previous_ms: 10,
                timestamp_ms: 10
            })
        );
        assert!(client.submit(Image::new(2, 2), 9).is_err());
        client.submit(Image::new(2, 2), 11).unwrap();
    }

    #[test]
    fn submit_after_close() {
        let (mut client, _rx) = client_with(ScriptedDetector::new(), DetectorOptions::default());
        client.close();
        assert_eq!(client.state(), ClientState::Closed);
        assert_eq!(client.submit(Image::new(2, 2), 1), Err(ClientError::Closed));
        client.close();
    }

    #[test]
    fn detector_error_keeps_client_ready() {
        let mut detector = ScriptedDetector::new();
        detector.push_error(DetectorError::new("model exploded"));
        let (mut client, rx) = client_with(
            detector,
            DetectorOptions::default().backlog(Backlog::Unbounded),
        );

        client.submit(Image::new(3, 3), 1).unwrap();
        client.submit(Image::new(3, 3), 2).unwrap();

        match rx.recv().unwrap() {
            Outcome::Error(e, cx) => {
                assert_eq!(e.message(), "model exploded");
                assert_eq!(cx.timestamp_ms(), 1);
            }
            Outcome::Result(..) => panic!("expected an error"),
        }
        assert!(matches!(rx.recv().unwrap(), Outcome::Result(_, cx) if cx.timestamp_ms() == 2));
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[test]
    fn latest_backlog_drops_stale_frames() {
        let (detector, started, gate) = gated_detector();
        let (mut client, rx) = client_with(detector, DetectorOptions::default());

        client.submit(Image::new(2, 2), 1).unwrap();
        assert_eq!(started.recv().unwrap(), 1);

        for ts in 2..=5 {
            client.submit(Image::new(2, 2), ts).unwrap();
        }
        // 2, 3 and 4 were displaced while waiting.
        assert_eq!(client.dropped_frames(), 3);

        drop(gate);
        assert_eq!(started.recv().unwrap(), 5);
        let reported = (0..2)
            .map(|_| match rx.recv().unwrap() {
                Outcome::Result(_, cx) => cx.timestamp_ms(),
                Outcome::Error(e, _) => panic!("unexpected error {e}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(reported, [1, 5]);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn close_discards_pending_frames() {
        let (detector, started, gate) = gated_detector();
        let (mut client, rx) = client_with(
            detector,
            DetectorOptions::default().backlog(Backlog::Unbounded),
        );

        client.submit(Image::new(2, 2), 1).unwrap();
        assert_eq!(started.recv().unwrap(), 1);
        client.submit(Image::new(2, 2), 2).unwrap();
        client.submit(Image::new(2, 2), 3).unwrap();

        // Let the running detection finish shortly after `close` has discarded the rest.
        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            drop(gate);
        });
        client.close();
        opener.join().unwrap();

        assert_eq!(client.dropped_frames(), 2);
        let reported = rx.try_iter().count();
        assert_eq!(reported, 1);
        assert!(started.try_iter().next().is_none());
    }

    #[test]
    fn detector_panic_propagates_on_close() {
        let (started_tx, started) = crossbeam_channel::unbounded();
        let detector = move |_: &Image, _: u64| -> Result<DetectionResult, DetectorError> {
            started_tx.send(()).ok();
            std::panic::resume_unwind(Box::new("detector panic"))
        };
        let (mut client, _rx) = client_with(detector, DetectorOptions::default());
        client.submit(Image::new(2, 2), 1).unwrap();
        // Once the frame is taken, closing has to wait for the panicking thread.
        started.recv().unwrap();
        catch_unwind(AssertUnwindSafe(|| client.close())).unwrap_err();
    }
}
