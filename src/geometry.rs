//! Screen/image coordinate mapping under zoom, pan and letterboxing.
//!
//! One `DisplayMapping` is computed per tick and shared between input mapping
//! and compositing. Both directions go through the same transform, so a drawn
//! stroke can never drift away from the cursor that drew it.

/// Zoom bounds, matching the wheel/pinch clamp of the viewer.
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;

/// Wheel zoom step.
pub const ZOOM_STEP_IN: f32 = 1.1;
pub const ZOOM_STEP_OUT: f32 = 0.9;

/// Display-only zoom/pan state. Independent of image content.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    pub pan: (f32, f32),
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: (0.0, 0.0),
        }
    }
}

impl ViewTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.zoom == 1.0 && self.pan == (0.0, 0.0)
    }

    /// Multiply zoom by `factor`, clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn zoom_by(&mut self, factor: f32) {
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan.0 += dx;
        self.pan.1 += dy;
    }
}

/// The on-screen area the composited frame is drawn into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Concrete screen placement of an image for one tick: aspect-preserving fit
/// into the viewport, times zoom, centered, plus pan.
#[derive(Clone, Copy, Debug)]
pub struct DisplayMapping {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    image_width: u32,
    image_height: u32,
}

impl DisplayMapping {
    pub fn compute(viewport: Viewport, image_size: (u32, u32), view: &ViewTransform) -> Self {
        let (iw, ih) = image_size;
        let fit = if iw == 0 || ih == 0 {
            1.0
        } else {
            (viewport.width as f64 / iw as f64).min(viewport.height as f64 / ih as f64)
        };
        let scale = fit * view.zoom as f64;
        let scaled_w = iw as f64 * scale;
        let scaled_h = ih as f64 * scale;
        Self {
            scale,
            offset_x: (viewport.width as f64 - scaled_w) / 2.0 + view.pan.0 as f64,
            offset_y: (viewport.height as f64 - scaled_h) / 2.0 + view.pan.1 as f64,
            image_width: iw,
            image_height: ih,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Top-left corner of the image on screen.
    pub fn screen_origin(&self) -> (f64, f64) {
        (self.offset_x, self.offset_y)
    }

    /// Map a screen point to image-pixel coordinates. Returns `None` when the
    /// point lands outside `[0,width) x [0,height)`; callers treat that as
    /// "ignore input", not an error.
    pub fn to_image(&self, screen_x: f64, screen_y: f64) -> Option<(f64, f64)> {
        let (x, y) = self.to_image_unclamped(screen_x, screen_y);
        if x >= 0.0 && x < self.image_width as f64 && y >= 0.0 && y < self.image_height as f64 {
            Some((x, y))
        } else {
            None
        }
    }

    /// Same transform without the bounds check. Used for zoom anchoring where
    /// the cursor may sit on the letterbox.
    pub fn to_image_unclamped(&self, screen_x: f64, screen_y: f64) -> (f64, f64) {
        (
            (screen_x - self.offset_x) / self.scale,
            (screen_y - self.offset_y) / self.scale,
        )
    }

    /// Exact inverse of `to_image`.
    pub fn to_screen(&self, image_x: f64, image_y: f64) -> (f64, f64) {
        (
            image_x * self.scale + self.offset_x,
            image_y * self.scale + self.offset_y,
        )
    }
}

/// Zoom about a screen anchor: the image point under the cursor stays under
/// the cursor after the zoom.
pub fn zoom_about(
    view: &mut ViewTransform,
    viewport: Viewport,
    image_size: (u32, u32),
    anchor: (f64, f64),
    factor: f32,
) {
    let before = DisplayMapping::compute(viewport, image_size, view);
    let pivot = before.to_image_unclamped(anchor.0, anchor.1);

    view.zoom_by(factor);

    let after = DisplayMapping::compute(viewport, image_size, view);
    let landed = after.to_screen(pivot.0, pivot.1);
    view.pan_by((anchor.0 - landed.0) as f32, (anchor.1 - landed.1) as f32);
}
