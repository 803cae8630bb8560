//! Runs a synthetic camera frame through the pipeline and renders the resulting overlay.
//!
//! Usage: `cargo run --example overlay_frame [output.png]`

use std::time::Duration;

use anyhow::Context;
use handmark::{
    detection::{scripted::ScriptedDetector, DetectorOptions},
    hand::{DetectionResult, HandLandmarks, Handedness, NormalizedLandmark},
    image::{Color, Image},
    overlay::{Overlay, Surface},
    pipeline::{HandPipeline, InboundFrame},
    resolution::Resolution,
};

/// The scripted detector ignores the model, so any readable file will do.
const MODEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;

struct Framebuffer {
    image: Image,
}

impl Surface for Framebuffer {
    fn size(&self) -> Resolution {
        self.image.resolution()
    }

    fn resize(&mut self, size: Resolution) {
        self.image = Image::new(size.width(), size.height());
    }

    fn request_redraw(&mut self) {
        log::debug!("redraw requested");
    }
}

/// An open right hand, fingers pointing up.
fn open_hand() -> HandLandmarks {
    let mut landmarks = vec![NormalizedLandmark::new(0.5, 0.85)];
    // Thumb, index, middle, ring, pinky: base position and per-joint step.
    let fingers = [
        ((0.40, 0.78), (-0.05, -0.05)),
        ((0.42, 0.60), (-0.01, -0.08)),
        ((0.50, 0.58), (0.0, -0.09)),
        ((0.58, 0.60), (0.01, -0.08)),
        ((0.65, 0.64), (0.03, -0.06)),
    ];
    for ((x, y), (dx, dy)) in fingers {
        for joint in 0..4 {
            let joint = joint as f32;
            landmarks.push(NormalizedLandmark::new(x + dx * joint, y + dy * joint));
        }
    }
    HandLandmarks::new(landmarks).with_handedness(Handedness::Right, 0.97)
}

fn synthetic_frame() -> InboundFrame {
    let (w, h) = (FRAME_WIDTH as usize, FRAME_HEIGHT as usize);
    let mut bytes = Vec::with_capacity(w * h * 3 / 2);
    for y in 0..h {
        for x in 0..w {
            bytes.push((16 + (x + y) * 200 / (w + h)) as u8);
        }
    }
    bytes.resize(w * h * 3 / 2, 128);
    InboundFrame {
        bytes,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        is_front_camera: true,
    }
}

fn main() -> anyhow::Result<()> {
    handmark::init_logger!();

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "overlay.png".to_string());

    let mut detector = ScriptedDetector::new();
    detector.push_result(DetectionResult::new(vec![open_hand()]));
    let mut pipeline = HandPipeline::start(MODEL, DetectorOptions::default(), move |asset, _| {
        log::info!("using {:?}", asset);
        Ok(detector)
    })?;

    let context = pipeline
        .handle_frame(synthetic_frame())?
        .context("synthetic frame could not be decoded")?;
    log::info!("submitted {:?}", context);

    let event = pipeline
        .events()
        .recv_timeout(Duration::from_secs(5))
        .context("no detection result")?;
    log::info!("{}", event.to_message().to_json()?);

    let mut overlay = Overlay::new(Framebuffer {
        image: Image::new(480, 640),
    });
    event.apply_to(&mut overlay);

    let mut canvas = overlay.surface().image.clone();
    canvas.clear(Color::from_rgb8(32, 32, 32));
    overlay.draw(&mut canvas);
    canvas.save(&output)?;
    log::info!("wrote overlay to {}", output);

    pipeline.close();
    Ok(())
}
