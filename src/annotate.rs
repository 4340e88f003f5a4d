//! Freehand annotation: stroke lists, the drawing state machine, and software
//! polyline rendering.
//!
//! A surface is either the live feed or a captured still; each carries its own
//! ordered stroke list (insertion order = z-order). Strokes are append-only
//! while active and immutable once committed.
//!
//! Eraser strokes do not remove ink: they paint an opaque background-colored
//! path at an amplified width. That is exact over a captured still with a
//! flat background, and an explicitly degraded mode over live video, where it
//! covers moving content with a flat patch.

use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Eraser strokes render this much wider than the nominal pen width so prior
/// ink is fully covered.
pub const ERASER_WIDTH_FACTOR: f32 = 1.5;

/// The flat canvas color eraser strokes paint with.
pub const BACKGROUND_COLOR: [u8; 3] = [255, 255, 255];

/// Minimum delay between consecutive point samples during a drag. Prevents
/// jitter-induced overdraw; dropping a sample is always harmless.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Thumbnail bounds (aspect-preserving fit).
pub const THUMBNAIL_SIZE: (u32, u32) = (120, 90);

pub type Rgb = [u8; 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Pen,
    Eraser,
}

/// One continuous freehand path, pointer-down to pointer-up.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub tool: Tool,
    /// Ignored for the eraser.
    pub color: Rgb,
    pub width: u32,
    pub points: Vec<(f32, f32)>,
}

impl Stroke {
    fn new(tool: Tool, color: Rgb, width: u32, first: (f32, f32)) -> Self {
        Self {
            tool,
            color,
            width: width.max(1),
            points: vec![first],
        }
    }

    fn render_color(&self) -> Rgb {
        match self.tool {
            Tool::Pen => self.color,
            Tool::Eraser => BACKGROUND_COLOR,
        }
    }

    fn render_width(&self) -> u32 {
        match self.tool {
            Tool::Pen => self.width,
            Tool::Eraser => (self.width as f32 * ERASER_WIDTH_FACTOR).ceil() as u32,
        }
    }
}

/// Stroke list plus the Idle -> Drawing -> Idle machine for one surface.
///
/// Mutators bump `generation`, which is how dependent caches (composite,
/// thumbnail) know they are stale: a cache remembers the generation it was
/// built at and rebuilds on mismatch.
#[derive(Debug, Default)]
pub struct AnnotationSurface {
    strokes: Vec<Stroke>,
    in_progress: Option<Stroke>,
    last_sample_at: Option<Instant>,
    generation: u64,
}

impl AnnotationSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drawing(&self) -> bool {
        self.in_progress.is_some()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn in_progress(&self) -> Option<&Stroke> {
        self.in_progress.as_ref()
    }

    /// Monotonic mutation counter for cache staleness checks.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Idle -> Drawing. An interrupted stroke (tool switch mid-drag) is
    /// finalized, not discarded.
    pub fn begin_stroke(&mut self, point: (f32, f32), tool: Tool, color: Rgb, width: u32) {
        if self.in_progress.is_some() {
            self.end_stroke();
        }
        self.in_progress = Some(Stroke::new(tool, color, width, point));
        self.last_sample_at = Some(Instant::now());
        self.generation += 1;
    }

    /// Append a point to the in-progress stroke. No-op when not drawing, and
    /// samples arriving faster than `MIN_SAMPLE_INTERVAL` are dropped.
    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        self.extend_stroke_at(point, Instant::now());
    }

    pub(crate) fn extend_stroke_at(&mut self, point: (f32, f32), now: Instant) {
        let Some(stroke) = self.in_progress.as_mut() else {
            return;
        };
        if let Some(last) = self.last_sample_at {
            if now.saturating_duration_since(last) < MIN_SAMPLE_INTERVAL {
                return;
            }
        }
        stroke.points.push(point);
        self.last_sample_at = Some(now);
        self.generation += 1;
    }

    /// Drawing -> Idle. Commits the in-progress stroke to the list. Returns
    /// whether a stroke was committed.
    pub fn end_stroke(&mut self) -> bool {
        match self.in_progress.take() {
            Some(stroke) => {
                self.strokes.push(stroke);
                self.last_sample_at = None;
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Remove the most recently committed stroke. Returns whether a removal
    /// occurred; an empty list reports "nothing to undo", not an error.
    pub fn undo(&mut self) -> bool {
        let removed = self.strokes.pop().is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.strokes.is_empty() || self.in_progress.is_some() {
            self.strokes.clear();
            self.in_progress = None;
            self.last_sample_at = None;
            self.generation += 1;
        }
    }

    /// Draw committed strokes in list order, then the in-progress stroke on
    /// top, onto a copy of `base`.
    pub fn render(&self, base: &Frame) -> Frame {
        let mut out = base.clone();
        for stroke in &self.strokes {
            draw_stroke(&mut out, stroke);
        }
        if let Some(stroke) = &self.in_progress {
            draw_stroke(&mut out, stroke);
        }
        out
    }
}

// ----------------------------------------------------------------------------
// Software rasterization
// ----------------------------------------------------------------------------

/// Stamp a stroke as a round-capped, round-joined polyline: filled discs of
/// half the render width, marched along each segment at sub-pixel spacing.
/// Disc stamping gives round caps and joins for free.
fn draw_stroke(frame: &mut Frame, stroke: &Stroke) {
    let radius = stroke.render_width() as f32 / 2.0;
    let color = stroke.render_color();

    let mut points = stroke.points.iter();
    let Some(&first) = points.next() else {
        return;
    };
    stamp_disc(frame, first.0, first.1, radius, color);

    let mut prev = first;
    for &next in points {
        let dx = next.0 - prev.0;
        let dy = next.1 - prev.1;
        let len = (dx * dx + dy * dy).sqrt();
        let steps = (len / 0.5).ceil().max(1.0) as u32;
        for s in 1..=steps {
            let t = s as f32 / steps as f32;
            stamp_disc(frame, prev.0 + dx * t, prev.1 + dy * t, radius, color);
        }
        prev = next;
    }
}

fn stamp_disc(frame: &mut Frame, cx: f32, cy: f32, radius: f32, color: Rgb) {
    let r = radius.max(0.5);
    let r2 = r * r;
    let min_x = (cx - r).floor() as i64;
    let max_x = (cx + r).ceil() as i64;
    let min_y = (cy - r).floor() as i64;
    let max_y = (cy + r).ceil() as i64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Captured surfaces
// ----------------------------------------------------------------------------

/// A captured still: its own original pixels, stroke list, and memoized
/// composite + thumbnail. Persists until explicitly cleared.
#[derive(Debug)]
pub struct CapturedSurface {
    original: Frame,
    pub annotations: AnnotationSurface,
    composite: Option<(u64, Frame)>,
    thumbnail: Option<(u64, Frame)>,
}

impl CapturedSurface {
    pub fn new(original: Frame) -> Self {
        Self {
            original,
            annotations: AnnotationSurface::new(),
            composite: None,
            thumbnail: None,
        }
    }

    pub fn original(&self) -> &Frame {
        &self.original
    }

    /// Annotated composite, rebuilt only when the stroke list has mutated
    /// since the cached copy was rendered.
    pub fn composite(&mut self) -> &Frame {
        let generation = self.annotations.generation();
        let stale = !matches!(&self.composite, Some((g, _)) if *g == generation);
        if stale {
            let rendered = self.annotations.render(&self.original);
            self.composite = Some((generation, rendered));
            self.thumbnail = None;
        }
        &self.composite.as_ref().unwrap().1
    }

    /// Aspect-fit thumbnail of the composite, same memoization contract.
    pub fn thumbnail(&mut self) -> &Frame {
        let generation = self.annotations.generation();
        let stale = !matches!(&self.thumbnail, Some((g, _)) if *g == generation);
        if stale {
            let composite = self.composite().clone();
            let thumb = scale_to_fit(&composite, THUMBNAIL_SIZE);
            self.thumbnail = Some((generation, thumb));
        }
        &self.thumbnail.as_ref().unwrap().1
    }
}

/// Nearest-neighbor downscale preserving aspect ratio.
fn scale_to_fit(frame: &Frame, bounds: (u32, u32)) -> Frame {
    let (w, h) = frame.size();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let scale = (bounds.0 as f64 / w as f64)
        .min(bounds.1 as f64 / h as f64)
        .min(1.0);
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    let mut out = Frame::black(tw, th);
    for y in 0..th {
        for x in 0..tw {
            let sx = (x as f64 / scale).min(w as f64 - 1.0) as u32;
            let sy = (y as f64 / scale).min(h as f64 - 1.0) as u32;
            out.put_pixel(x as i64, y as i64, frame.pixel(sx, sy));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = [255, 0, 0];

    #[test]
    fn begin_extend_end_commits_one_stroke() {
        let mut surface = AnnotationSurface::new();
        surface.begin_stroke((5.0, 5.0), Tool::Pen, RED, 3);
        surface.extend_stroke_at((10.0, 5.0), Instant::now() + MIN_SAMPLE_INTERVAL);
        assert!(surface.end_stroke());

        assert_eq!(surface.strokes().len(), 1);
        assert_eq!(surface.strokes()[0].points, vec![(5.0, 5.0), (10.0, 5.0)]);

        assert!(surface.undo());
        assert!(surface.strokes().is_empty());
    }

    #[test]
    fn undo_removes_exactly_the_latest_stroke() {
        let mut surface = AnnotationSurface::new();
        for i in 0..3 {
            surface.begin_stroke((i as f32, 0.0), Tool::Pen, RED, 1);
            surface.end_stroke();
        }
        let latest = surface.strokes().last().cloned().unwrap();
        assert!(surface.undo());
        assert_eq!(surface.strokes().len(), 2);
        assert!(!surface.strokes().contains(&latest));
        assert!(surface.undo());
        assert!(surface.undo());
        assert!(!surface.undo(), "empty list reports nothing to undo");
    }

    #[test]
    fn clear_is_idempotent() {
        let mut surface = AnnotationSurface::new();
        surface.begin_stroke((1.0, 1.0), Tool::Pen, RED, 1);
        surface.end_stroke();
        surface.clear();
        let after_first = surface.generation();
        surface.clear();
        assert!(surface.strokes().is_empty());
        assert_eq!(surface.generation(), after_first, "second clear is a no-op");
    }

    #[test]
    fn extend_without_begin_is_a_noop() {
        let mut surface = AnnotationSurface::new();
        surface.extend_stroke((3.0, 3.0));
        assert!(!surface.is_drawing());
        assert!(!surface.end_stroke());
    }

    #[test]
    fn fast_samples_are_throttled() {
        let mut surface = AnnotationSurface::new();
        let t0 = Instant::now();
        surface.begin_stroke((0.0, 0.0), Tool::Pen, RED, 1);
        surface.extend_stroke_at((1.0, 0.0), t0 + Duration::from_millis(5));
        surface.extend_stroke_at((2.0, 0.0), t0 + Duration::from_millis(200));
        surface.end_stroke();
        let points = &surface.strokes()[0].points;
        assert_eq!(points.len(), 2, "5ms sample dropped, 200ms sample kept");
        assert_eq!(points[1], (2.0, 0.0));
    }

    #[test]
    fn begin_while_drawing_finalizes_previous_stroke() {
        let mut surface = AnnotationSurface::new();
        surface.begin_stroke((0.0, 0.0), Tool::Pen, RED, 2);
        surface.begin_stroke((9.0, 9.0), Tool::Eraser, RED, 2);
        assert_eq!(surface.strokes().len(), 1, "interrupted stroke committed");
        assert_eq!(surface.strokes()[0].tool, Tool::Pen);
        assert!(surface.is_drawing());
    }

    #[test]
    fn render_draws_pen_ink_and_in_progress_on_top() {
        let base = Frame::black(20, 20);
        let mut surface = AnnotationSurface::new();
        surface.begin_stroke((5.0, 10.0), Tool::Pen, RED, 3);
        surface.extend_stroke_at((15.0, 10.0), Instant::now() + MIN_SAMPLE_INTERVAL);

        // Still in progress: rendered anyway.
        let out = surface.render(&base);
        assert_eq!(out.pixel(10, 10), RED);
        // Base is untouched.
        assert_eq!(base.pixel(10, 10), [0, 0, 0]);
    }

    #[test]
    fn eraser_paints_background_at_amplified_width() {
        let base = Frame::black(30, 30);
        let mut surface = AnnotationSurface::new();
        surface.begin_stroke((15.0, 15.0), Tool::Eraser, RED, 8);
        surface.end_stroke();
        let out = surface.render(&base);
        // 8 * 1.5 = 12 wide: a pixel 5 px from center is covered, in
        // background color, not the stroke's nominal color.
        assert_eq!(out.pixel(15, 20), BACKGROUND_COLOR);
        assert_eq!(out.pixel(15, 15), BACKGROUND_COLOR);
    }

    #[test]
    fn captured_surface_memoizes_composite_until_mutation() {
        let mut captured = CapturedSurface::new(Frame::black(40, 40));
        captured.annotations.begin_stroke((20.0, 20.0), Tool::Pen, RED, 4);
        captured.annotations.end_stroke();

        assert_eq!(captured.composite().pixel(20, 20), RED);
        let generation = captured.annotations.generation();
        captured.composite();
        assert_eq!(captured.annotations.generation(), generation);

        // Mutation invalidates: undo clears the ink on the next composite.
        assert!(captured.annotations.undo());
        assert_eq!(captured.composite().pixel(20, 20), [0, 0, 0]);
    }

    #[test]
    fn thumbnail_fits_bounds_and_keeps_aspect() {
        let mut captured = CapturedSurface::new(Frame::black(640, 480));
        let thumb = captured.thumbnail();
        assert_eq!(thumb.size(), (120, 90));

        let mut wide = CapturedSurface::new(Frame::black(400, 100));
        let thumb = wide.thumbnail();
        assert_eq!(thumb.size(), (120, 30));
    }
}
