//! Brightness/contrast rescaling, quadrant rotation and axis flips.
//!
//! `adjust` is a pure function over frames with a fixed order of operations:
//! brightness/contrast rescale, then rotate, then flip. Malformed settings are
//! clamped to their valid ranges, never rejected.
//!
//! The per-pixel mapping is `out = clamp(alpha * in + beta, 0, 255)` with
//!   alpha = (contrast + 100) / 100      (contrast -100..100 -> 0.0..2.0)
//!   beta  = 2.55 * brightness           (brightness -100..100 -> -255..255)
//! Both are monotonic in their setting, and brightness=0, contrast=0 is the
//! exact identity.

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, CHANNELS};

pub const BRIGHTNESS_RANGE: (i32, i32) = (-100, 100);
pub const CONTRAST_RANGE: (i32, i32) = (-100, 100);

/// Rotation by quadrant, clockwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Orientation index 0..=3 as persisted by the settings record.
    pub fn from_index(index: u32) -> Self {
        match index % 4 {
            1 => Self::Cw90,
            2 => Self::Cw180,
            3 => Self::Cw270,
            _ => Self::None,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 1,
            Self::Cw180 => 2,
            Self::Cw270 => 3,
        }
    }

    /// 90 and 270 swap width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageAdjustmentSettings {
    pub brightness: i32,
    pub contrast: i32,
    pub rotation: Rotation,
    pub flip: Flip,
    /// Changing this requires a capture-session restart; the pipeline does
    /// not apply it mid-stream.
    pub requested_resolution: Option<(u32, u32)>,
}

impl Default for ImageAdjustmentSettings {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: 0,
            rotation: Rotation::None,
            flip: Flip::None,
            requested_resolution: None,
        }
    }
}

impl ImageAdjustmentSettings {
    /// Clamp out-of-range values to their valid ranges.
    pub fn clamped(mut self) -> Self {
        self.brightness = self.brightness.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1);
        self.contrast = self.contrast.clamp(CONTRAST_RANGE.0, CONTRAST_RANGE.1);
        self
    }

    pub fn is_identity(&self) -> bool {
        self.brightness == 0
            && self.contrast == 0
            && self.rotation == Rotation::None
            && self.flip == Flip::None
    }
}

/// Apply adjustments in fixed order: rescale, rotate, flip.
pub fn adjust(frame: &Frame, settings: &ImageAdjustmentSettings) -> Frame {
    let settings = settings.clamped();
    if settings.is_identity() {
        return frame.clone();
    }
    let rescaled = rescale(frame, settings.brightness, settings.contrast);
    let rotated = rotate(&rescaled, settings.rotation);
    flip(&rotated, settings.flip)
}

fn rescale(frame: &Frame, brightness: i32, contrast: i32) -> Frame {
    if brightness == 0 && contrast == 0 {
        return frame.clone();
    }
    let alpha = (contrast + 100) as f32 / 100.0;
    let beta = 2.55 * brightness as f32;

    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = (alpha * i as f32 + beta).round().clamp(0.0, 255.0) as u8;
    }

    let mut out = frame.clone();
    for b in out.data_mut() {
        *b = lut[*b as usize];
    }
    out
}

fn rotate(frame: &Frame, rotation: Rotation) -> Frame {
    if rotation == Rotation::None {
        return frame.clone();
    }
    let (w, h) = frame.size();
    let (ow, oh) = if rotation.swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    };
    let mut out = Frame::black(ow, oh);
    for y in 0..h {
        for x in 0..w {
            let (nx, ny) = match rotation {
                Rotation::None => (x, y),
                Rotation::Cw90 => (h - 1 - y, x),
                Rotation::Cw180 => (w - 1 - x, h - 1 - y),
                Rotation::Cw270 => (y, w - 1 - x),
            };
            out.put_pixel(nx as i64, ny as i64, frame.pixel(x, y));
        }
    }
    out
}

fn flip(frame: &Frame, flip: Flip) -> Frame {
    match flip {
        Flip::None => frame.clone(),
        Flip::Horizontal => {
            let (w, h) = frame.size();
            let mut out = Frame::black(w, h);
            for y in 0..h {
                for x in 0..w {
                    out.put_pixel((w - 1 - x) as i64, y as i64, frame.pixel(x, y));
                }
            }
            out
        }
        Flip::Vertical => {
            let (w, h) = frame.size();
            let mut out = Frame::black(w, h);
            let row = w as usize * CHANNELS;
            for y in 0..h as usize {
                let src = &frame.data()[y * row..(y + 1) * row];
                let dst_y = h as usize - 1 - y;
                out.data_mut()[dst_y * row..(dst_y + 1) * row].copy_from_slice(src);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame() -> Frame {
        let mut f = Frame::black(16, 4);
        for y in 0..4 {
            for x in 0..16 {
                let v = (x * 16) as u8;
                f.put_pixel(x as i64, y as i64, [v, v / 2, 255 - v]);
            }
        }
        f
    }

    #[test]
    fn neutral_settings_are_exact_identity() {
        let f = gradient_frame();
        let out = adjust(&f, &ImageAdjustmentSettings::default());
        assert_eq!(out, f);
    }

    fn spread(frame: &Frame) -> i32 {
        let min = *frame.data().iter().min().unwrap() as i32;
        let max = *frame.data().iter().max().unwrap() as i32;
        max - min
    }

    #[test]
    fn raising_contrast_increases_spread() {
        let f = gradient_frame();
        let mut low = ImageAdjustmentSettings::default();
        low.contrast = -50;
        let mut high = ImageAdjustmentSettings::default();
        high.contrast = 50;
        let base = spread(&adjust(&f, &ImageAdjustmentSettings::default()));
        assert!(spread(&adjust(&f, &low)) < base);
        assert!(spread(&adjust(&f, &high)) > spread(&adjust(&f, &low)));
    }

    #[test]
    fn brightness_saturates_at_bounds() {
        let f = gradient_frame();
        let mut s = ImageAdjustmentSettings::default();
        s.brightness = 100;
        let out = adjust(&f, &s);
        assert!(out.data().iter().all(|&b| b == 255));
    }

    #[test]
    fn out_of_range_settings_are_clamped() {
        let s = ImageAdjustmentSettings {
            brightness: 1_000,
            contrast: -1_000,
            ..Default::default()
        }
        .clamped();
        assert_eq!(s.brightness, 100);
        assert_eq!(s.contrast, -100);
    }

    #[test]
    fn quadrant_rotation_moves_corner_and_swaps_dimensions() {
        let mut f = Frame::black(4, 2);
        f.put_pixel(0, 0, [9, 9, 9]);

        let mut s = ImageAdjustmentSettings::default();
        s.rotation = Rotation::Cw90;
        let out = adjust(&f, &s);
        assert_eq!(out.size(), (2, 4));
        assert_eq!(out.pixel(1, 0), [9, 9, 9]);

        s.rotation = Rotation::Cw180;
        let out = adjust(&f, &s);
        assert_eq!(out.size(), (4, 2));
        assert_eq!(out.pixel(3, 1), [9, 9, 9]);

        s.rotation = Rotation::Cw270;
        let out = adjust(&f, &s);
        assert_eq!(out.size(), (2, 4));
        assert_eq!(out.pixel(0, 3), [9, 9, 9]);
    }

    #[test]
    fn flips_mirror_axes() {
        let mut f = Frame::black(3, 2);
        f.put_pixel(0, 0, [1, 1, 1]);

        let mut s = ImageAdjustmentSettings::default();
        s.flip = Flip::Horizontal;
        assert_eq!(adjust(&f, &s).pixel(2, 0), [1, 1, 1]);

        s.flip = Flip::Vertical;
        assert_eq!(adjust(&f, &s).pixel(0, 1), [1, 1, 1]);
    }

    #[test]
    fn flip_applies_after_rotation() {
        // A pixel at (0,0) of a 4x2 frame: Cw90 puts it at (1,0) in the 2x4
        // result; a horizontal flip then mirrors it to (0,0).
        let mut f = Frame::black(4, 2);
        f.put_pixel(0, 0, [7, 7, 7]);
        let s = ImageAdjustmentSettings {
            rotation: Rotation::Cw90,
            flip: Flip::Horizontal,
            ..Default::default()
        };
        let out = adjust(&f, &s);
        assert_eq!(out.size(), (2, 4));
        assert_eq!(out.pixel(0, 0), [7, 7, 7]);
    }
}
