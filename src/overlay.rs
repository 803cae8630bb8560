//! Skeleton overlay state and rendering.
//!
//! An [`Overlay`] holds the most recent [`Projection`] and draws it, scaled to the render surface,
//! onto any [`Canvas`]. Every state change requests exactly one redraw from the [`Surface`].

use crate::hand::Projection;
use crate::image::{draw, Color, Image};
use crate::resolution::Resolution;

pub use crate::detection::RunningMode;

/// Computes the factor that maps `source` pixel coordinates onto a surface of
/// `surface_width x surface_height`.
///
/// Still images and video are fit entirely inside the surface (*contain*), while live streams fill
/// the whole surface and may be cropped (*cover*).
///
/// A `source` without pixels cannot be fit, and yields a factor of 1.
pub fn scale_factor(
    surface_width: u32,
    surface_height: u32,
    source: Resolution,
    mode: RunningMode,
) -> f32 {
    if source.is_empty() {
        log::warn!("cannot fit empty source {} to surface, not scaling", source);
        return 1.0;
    }

    let x = surface_width as f32 / source.width() as f32;
    let y = surface_height as f32 / source.height() as f32;
    match mode {
        RunningMode::Image | RunningMode::Video => x.min(y),
        RunningMode::LiveStream => x.max(y),
    }
}

/// The render target an [`Overlay`] is displayed on.
pub trait Surface {
    /// Returns the current size of the surface in pixels.
    fn size(&self) -> Resolution;

    /// Changes the size of the surface.
    fn resize(&mut self, size: Resolution);

    /// Asks the surface to redraw the overlay at its next opportunity.
    fn request_redraw(&mut self);
}

/// Colors and sizes used for drawing an [`Overlay`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    point_color: Color,
    line_color: Color,
    stroke_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            point_color: Color::YELLOW,
            line_color: Color::RED,
            stroke_width: 8,
        }
    }
}

impl OverlayStyle {
    pub fn point_color(self, point_color: Color) -> Self {
        Self {
            point_color,
            ..self
        }
    }

    pub fn line_color(self, line_color: Color) -> Self {
        Self { line_color, ..self }
    }

    /// Sets the width of lines and the diameter of points.
    pub fn stroke_width(self, stroke_width: u32) -> Self {
        assert!(stroke_width != 0, "stroke width must be greater than zero");
        Self {
            stroke_width,
            ..self
        }
    }
}

/// Something an [`Overlay`] can be drawn on.
pub trait Canvas {
    fn point(&mut self, x: f32, y: f32, color: Color, size: u32);

    fn line(&mut self, start: (f32, f32), end: (f32, f32), color: Color, width: u32);
}

impl Canvas for Image {
    fn point(&mut self, x: f32, y: f32, color: Color, size: u32) {
        draw::marker(self, x.round() as i32, y.round() as i32)
            .color(color)
            .size(size);
    }

    fn line(&mut self, start: (f32, f32), end: (f32, f32), color: Color, width: u32) {
        draw::line(
            self,
            start.0.round() as i32,
            start.1.round() as i32,
            end.0.round() as i32,
            end.1.round() as i32,
        )
        .color(color)
        .stroke_width(width);
    }
}

/// A drawing operation recorded by a [`DrawList`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Point {
        x: f32,
        y: f32,
        color: Color,
        size: u32,
    },
    Line {
        start: (f32, f32),
        end: (f32, f32),
        color: Color,
        width: u32,
    },
}

/// A [`Canvas`] that records primitives instead of rasterizing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    primitives: Vec<Primitive>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn points(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.primitives.iter().filter_map(|p| match *p {
            Primitive::Point { x, y, .. } => Some((x, y)),
            Primitive::Line { .. } => None,
        })
    }

    pub fn lines(&self) -> impl Iterator<Item = ((f32, f32), (f32, f32))> + '_ {
        self.primitives.iter().filter_map(|p| match *p {
            Primitive::Line { start, end, .. } => Some((start, end)),
            Primitive::Point { .. } => None,
        })
    }
}

impl Canvas for DrawList {
    fn point(&mut self, x: f32, y: f32, color: Color, size: u32) {
        self.primitives.push(Primitive::Point { x, y, color, size });
    }

    fn line(&mut self, start: (f32, f32), end: (f32, f32), color: Color, width: u32) {
        self.primitives.push(Primitive::Line {
            start,
            end,
            color,
            width,
        });
    }
}

/// What an [`Overlay`] currently displays.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayState {
    projection: Projection,
    source: Resolution,
    scale_factor: f32,
    mode: RunningMode,
}

impl OverlayState {
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Returns the size of the frame the projection was computed for.
    pub fn source(&self) -> Resolution {
        self.source
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn mode(&self) -> RunningMode {
        self.mode
    }
}

/// Displays hand skeletons on a [`Surface`].
///
/// The overlay is owned by the render context; results produced elsewhere have to be sent to it.
pub struct Overlay<S: Surface> {
    surface: S,
    style: OverlayStyle,
    state: Option<OverlayState>,
}

impl<S: Surface> Overlay<S> {
    pub fn new(surface: S) -> Self {
        Self::with_style(surface, OverlayStyle::default())
    }

    pub fn with_style(surface: S, style: OverlayStyle) -> Self {
        Self {
            surface,
            style,
            state: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn state(&self) -> Option<&OverlayState> {
        self.state.as_ref()
    }

    /// Replaces the displayed skeleton.
    ///
    /// `source` is the size of the frame `projection` was computed from. The scale factor to the
    /// surface is chosen according to `mode`, see [`scale_factor`].
    pub fn set_result(&mut self, projection: Projection, source: Resolution, mode: RunningMode) {
        let size = self.surface.size();
        let scale_factor = scale_factor(size.width(), size.height(), source, mode);
        log::trace!(
            "overlay: {} points from {} at {:.3}x on {}",
            projection.points().len(),
            source,
            scale_factor,
            size
        );
        self.state = Some(OverlayState {
            projection,
            source,
            scale_factor,
            mode,
        });
        self.surface.request_redraw();
    }

    /// Removes the displayed skeleton.
    pub fn clear(&mut self) {
        self.state = None;
        self.surface.request_redraw();
    }

    /// Resizes the surface and refits the displayed skeleton to it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(Resolution::new(width, height));
        if let Some(state) = &mut self.state {
            state.scale_factor = scale_factor(width, height, state.source, state.mode);
        }
        self.surface.request_redraw();
    }

    /// Draws the current skeleton onto `canvas`.
    ///
    /// Lines are drawn first, so that points stay visible on top of them. Does nothing if there is
    /// nothing to display.
    pub fn draw<C: Canvas>(&self, canvas: &mut C) {
        let Some(state) = &self.state else { return };
        let scale = state.scale_factor;
        let style = &self.style;

        for edge in state.projection.lines() {
            let (start, end) = (edge.start.scaled(scale), edge.end.scaled(scale));
            canvas.line(
                (start.x, start.y),
                (end.x, end.y),
                style.line_color,
                style.stroke_width,
            );
        }
        for point in state.projection.points() {
            let p = point.scaled(scale);
            canvas.point(p.x, p.y, style.point_color, style.stroke_width);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hand::{HandLandmarks, NormalizedLandmark};
    use crate::test::{detection, diagonal_hand};

    struct CountingSurface {
        size: Resolution,
        redraws: usize,
    }

    impl CountingSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                size: Resolution::new(width, height),
                redraws: 0,
            }
        }
    }

    impl Surface for CountingSurface {
        fn size(&self) -> Resolution {
            self.size
        }

        fn resize(&mut self, size: Resolution) {
            self.size = size;
        }

        fn request_redraw(&mut self) {
            self.redraws += 1;
        }
    }

    fn single_point(x: f32, y: f32, source: Resolution) -> Projection {
        let hand = HandLandmarks::new(vec![NormalizedLandmark::new(x, y)]);
        Projection::from_detection(&detection([hand]), source.width(), source.height())
    }

    #[test]
    fn contain_and_cover() {
        let source = Resolution::new(200, 200);
        assert_eq!(scale_factor(400, 800, source, RunningMode::Image), 2.0);
        assert_eq!(scale_factor(400, 800, source, RunningMode::Video), 2.0);
        assert_eq!(scale_factor(400, 800, source, RunningMode::LiveStream), 4.0);

        let source = Resolution::new(50, 50);
        assert_eq!(scale_factor(100, 200, source, RunningMode::Image), 2.0);
        assert_eq!(scale_factor(100, 200, source, RunningMode::LiveStream), 4.0);

        assert_relative_eq!(
            scale_factor(1080, 1920, Resolution::new(480, 640), RunningMode::LiveStream),
            3.0
        );
        assert_relative_eq!(
            scale_factor(1080, 1920, Resolution::new(480, 640), RunningMode::Image),
            2.25
        );
    }

    #[test]
    fn empty_source_is_not_scaled() {
        for mode in [RunningMode::Image, RunningMode::LiveStream] {
            assert_eq!(scale_factor(100, 100, Resolution::new(0, 10), mode), 1.0);
        }
    }

    #[test]
    fn mutations_request_one_redraw_each() {
        let mut overlay = Overlay::new(CountingSurface::new(100, 100));
        assert!(overlay.state().is_none());

        let source = Resolution::new(50, 50);
        overlay.set_result(single_point(0.5, 0.5, source), source, RunningMode::LiveStream);
        assert_eq!(overlay.surface().redraws, 1);
        assert_eq!(overlay.state().unwrap().scale_factor(), 2.0);

        overlay.clear();
        assert_eq!(overlay.surface().redraws, 2);
        assert!(overlay.state().is_none());
        overlay.clear();
        assert_eq!(overlay.surface().redraws, 3);
    }

    #[test]
    fn set_result_replaces_state() {
        let mut overlay = Overlay::new(CountingSurface::new(100, 100));
        let source = Resolution::new(100, 100);
        overlay.set_result(single_point(0.1, 0.1, source), source, RunningMode::Image);
        overlay.set_result(single_point(0.9, 0.9, source), source, RunningMode::Image);

        let mut list = DrawList::new();
        overlay.draw(&mut list);
        let points = list.points().collect::<Vec<_>>();
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].0, 90.0);
    }

    #[test]
    fn draw_scales_primitives() {
        let mut overlay = Overlay::new(CountingSurface::new(400, 800));
        let source = Resolution::new(200, 200);
        let projection = single_point(0.5, 0.25, source);
        overlay.set_result(projection, source, RunningMode::Image);

        let mut list = DrawList::new();
        overlay.draw(&mut list);
        assert_eq!(
            list.primitives(),
            &[Primitive::Point {
                x: 200.0,
                y: 100.0,
                color: Color::YELLOW,
                size: 8,
            }]
        );

        overlay.resize(800, 1600);
        assert_eq!(overlay.surface().redraws, 2);
        let mut list = DrawList::new();
        overlay.draw(&mut list);
        assert_eq!(list.points().collect::<Vec<_>>(), [(400.0, 200.0)]);
    }

    #[test]
    fn lines_before_points() {
        let mut overlay = Overlay::with_style(
            CountingSurface::new(100, 100),
            OverlayStyle::default().line_color(Color::GREEN).stroke_width(2),
        );
        let projection = Projection::from_detection(&detection([diagonal_hand(21)]), 100, 100);
        overlay.set_result(projection, Resolution::new(100, 100), RunningMode::Video);

        let mut list = DrawList::new();
        overlay.draw(&mut list);
        let primitives = list.primitives();
        assert_eq!(primitives.len(), 42);
        assert!(primitives[..21]
            .iter()
            .all(|p| matches!(p, Primitive::Line { color, width: 2, .. } if *color == Color::GREEN)));
        assert!(primitives[21..]
            .iter()
            .all(|p| matches!(p, Primitive::Point { .. })));
    }

    #[test]
    fn draw_onto_image() {
        let mut overlay = Overlay::new(CountingSurface::new(20, 20));
        let source = Resolution::new(10, 10);
        overlay.set_result(single_point(0.5, 0.5, source), source, RunningMode::Image);

        let mut image = Image::new(20, 20);
        overlay.draw(&mut image);
        assert_eq!(image.get(10, 10), Color::YELLOW);
        assert_eq!(image.get(0, 0), Color::BLACK);
    }

    #[test]
    fn empty_overlay_draws_nothing() {
        let overlay = Overlay::new(CountingSurface::new(20, 20));
        let mut list = DrawList::new();
        overlay.draw(&mut list);
        assert!(list.primitives().is_empty());
    }
}
