//! Keystone/perspective correction.
//!
//! Four user-placed control points (TL, TR, BR, BL, in the frame's own pixel
//! space) define the source quadrilateral; `compute_matrix` solves the unique
//! planar homography mapping them onto the corners of a target rectangle, and
//! `apply` resamples a frame through the inverse of that matrix.
//!
//! Degenerate configurations fail with `DegenerateGeometry` instead of
//! producing an unusable matrix; callers fall back to "no correction".
//! The matrix is recomputed only when control points change - the orchestrator
//! caches it across ticks.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::frame::Frame;

/// A control-point set is valid only with exactly this many points.
pub const CONTROL_POINT_COUNT: usize = 4;

/// Relative collinearity/area threshold, applied after scaling points by
/// their bounding-box diagonal.
const DEGENERACY_EPS: f64 = 1e-7;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Exactly four corners in fixed order: top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPointSet {
    points: [Point; CONTROL_POINT_COUNT],
}

impl ControlPointSet {
    pub fn new(points: [Point; CONTROL_POINT_COUNT]) -> Self {
        Self { points }
    }

    /// Fewer (or more) than four points means "no correction active".
    pub fn from_slice(points: &[Point]) -> Option<Self> {
        let points: [Point; CONTROL_POINT_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    /// Default corners: a 5% margin inside the reference resolution.
    pub fn with_margin(reference: (u32, u32)) -> Self {
        let (w, h) = (reference.0 as f64, reference.1 as f64);
        let m = 0.05;
        Self::new([
            Point::new(w * m, h * m),
            Point::new(w * (1.0 - m), h * m),
            Point::new(w * (1.0 - m), h * (1.0 - m)),
            Point::new(w * m, h * (1.0 - m)),
        ])
    }

    pub fn points(&self) -> &[Point; CONTROL_POINT_COUNT] {
        &self.points
    }

    /// Absolute pixel coordinates -> normalized [0,1]x[0,1], against a known
    /// reference resolution.
    pub fn to_normalized(&self, reference: (u32, u32)) -> Self {
        let (w, h) = (reference.0.max(1) as f64, reference.1.max(1) as f64);
        Self::new(self.points.map(|p| Point::new(p.x / w, p.y / h)))
    }

    /// Normalized [0,1]x[0,1] -> absolute pixels, against a known reference
    /// resolution.
    pub fn to_absolute(&self, reference: (u32, u32)) -> Self {
        let (w, h) = (reference.0 as f64, reference.1 as f64);
        Self::new(self.points.map(|p| Point::new(p.x * w, p.y * h)))
    }

    /// Rescale absolute points captured against one resolution to another.
    pub fn rescale(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        self.to_normalized(from).to_absolute(to)
    }

    /// Solve the homography mapping the four control points onto the corners
    /// of `target`, order TL, TR, BR, BL.
    pub fn compute_matrix(&self, target: (u32, u32)) -> Result<Homography, ViewerError> {
        if target.0 < 2 || target.1 < 2 {
            return Err(ViewerError::DegenerateGeometry(format!(
                "target {}x{} too small",
                target.0, target.1
            )));
        }
        self.check_degeneracy()?;

        let (tw, th) = (target.0 as f64 - 1.0, target.1 as f64 - 1.0);
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(tw, 0.0),
            Point::new(tw, th),
            Point::new(0.0, th),
        ];

        // Eight unknowns a..h of H = [a b c; d e f; g h 1], two equations per
        // correspondence:
        //   a*x + b*y + c - u*g*x - u*h*y = u
        //   d*x + e*y + f - v*g*x - v*h*y = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (i, (s, d)) in self.points.iter().zip(dst.iter()).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = s.x;
            a[(r, 1)] = s.y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -d.x * s.x;
            a[(r, 7)] = -d.x * s.y;
            b[r] = d.x;

            a[(r + 1, 3)] = s.x;
            a[(r + 1, 4)] = s.y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -d.y * s.x;
            a[(r + 1, 7)] = -d.y * s.y;
            b[r + 1] = d.y;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| ViewerError::DegenerateGeometry("singular system".into()))?;

        let forward = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let inverse = forward.try_inverse().ok_or_else(|| {
            ViewerError::DegenerateGeometry("homography not invertible".into())
        })?;

        Ok(Homography {
            forward,
            inverse,
            target,
        })
    }

    /// Reject 3+ collinear points and zero-area quadrilaterals. Thresholds are
    /// relative to the bounding-box diagonal so the check is scale-invariant.
    fn check_degeneracy(&self) -> Result<(), ViewerError> {
        let xs = self.points.iter().map(|p| p.x);
        let ys = self.points.iter().map(|p| p.y);
        let (min_x, max_x) = (xs.clone().fold(f64::MAX, f64::min), xs.fold(f64::MIN, f64::max));
        let (min_y, max_y) = (ys.clone().fold(f64::MAX, f64::min), ys.fold(f64::MIN, f64::max));
        let diag = ((max_x - min_x).powi(2) + (max_y - min_y).powi(2)).sqrt();
        if diag < f64::EPSILON {
            return Err(ViewerError::DegenerateGeometry(
                "all control points coincide".into(),
            ));
        }

        let scaled: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|p| ((p.x - min_x) / diag, (p.y - min_y) / diag))
            .collect();

        // Any triple collinear?
        for i in 0..CONTROL_POINT_COUNT {
            for j in (i + 1)..CONTROL_POINT_COUNT {
                for k in (j + 1)..CONTROL_POINT_COUNT {
                    let (ax, ay) = scaled[i];
                    let (bx, by) = scaled[j];
                    let (cx, cy) = scaled[k];
                    let cross = (bx - ax) * (cy - ay) - (by - ay) * (cx - ax);
                    if cross.abs() < DEGENERACY_EPS {
                        return Err(ViewerError::DegenerateGeometry(format!(
                            "points {}, {} and {} are collinear",
                            i, j, k
                        )));
                    }
                }
            }
        }

        // Shoelace area of the quadrilateral.
        let mut area = 0.0;
        for i in 0..CONTROL_POINT_COUNT {
            let (x0, y0) = scaled[i];
            let (x1, y1) = scaled[(i + 1) % CONTROL_POINT_COUNT];
            area += x0 * y1 - x1 * y0;
        }
        if (area / 2.0).abs() < DEGENERACY_EPS {
            return Err(ViewerError::DegenerateGeometry(
                "zero-area quadrilateral".into(),
            ));
        }
        Ok(())
    }
}

/// A solved planar homography plus its cached inverse and target size.
#[derive(Clone, Debug)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
    target: (u32, u32),
}

impl Homography {
    pub fn target(&self) -> (u32, u32) {
        self.target
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Project a source point through the forward matrix.
    pub fn project(&self, x: f64, y: f64) -> (f64, f64) {
        project_through(&self.forward, x, y)
    }

    fn project_inverse(&self, u: f64, v: f64) -> (f64, f64) {
        project_through(&self.inverse, u, v)
    }
}

fn project_through(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = m * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return (f64::NAN, f64::NAN);
    }
    (p[0] / p[2], p[1] / p[2])
}

/// Resample `frame` through the inverse of `homography`, producing a frame of
/// exactly the target size. Pixels mapping outside the source are black.
pub fn apply(frame: &Frame, homography: &Homography) -> Frame {
    let (tw, th) = homography.target;
    let (sw, sh) = (frame.width() as f64, frame.height() as f64);
    let mut out = Frame::black(tw, th);

    for v in 0..th {
        for u in 0..tw {
            let (sx, sy) = homography.project_inverse(u as f64, v as f64);
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            if sx < 0.0 || sy < 0.0 || sx > sw - 1.0 || sy > sh - 1.0 {
                continue;
            }
            out.put_pixel(u as i64, v as i64, sample_bilinear(frame, sx, sy));
        }
    }
    out
}

fn sample_bilinear(frame: &Frame, x: f64, y: f64) -> [u8; 3] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);

    let p00 = frame.pixel(x0, y0);
    let p10 = frame.pixel(x1, y0);
    let p01 = frame.pixel(x0, y1);
    let p11 = frame.pixel(x1, y1);

    let mut rgb = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        rgb[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_frame_points(w: u32, h: u32) -> ControlPointSet {
        let (w, h) = (w as f64 - 1.0, h as f64 - 1.0);
        ControlPointSet::new([
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
    }

    #[test]
    fn control_points_map_to_target_corners() {
        let set = ControlPointSet::new([
            Point::new(42.0, 17.0),
            Point::new(580.0, 30.0),
            Point::new(611.0, 455.0),
            Point::new(25.0, 430.0),
        ]);
        let h = set.compute_matrix((640, 480)).unwrap();
        let expected = [(0.0, 0.0), (639.0, 0.0), (639.0, 479.0), (0.0, 479.0)];
        for (p, (ex, ey)) in set.points().iter().zip(expected) {
            let (u, v) = h.project(p.x, p.y);
            assert!((u - ex).abs() < 1e-6, "u {} vs {}", u, ex);
            assert!((v - ey).abs() < 1e-6, "v {} vs {}", v, ey);
        }
    }

    #[test]
    fn full_frame_points_give_exact_identity() {
        let h = full_frame_points(640, 480).compute_matrix((640, 480)).unwrap();
        let m = h.matrix();
        for r in 0..3 {
            for c in 0..3 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!((m[(r, c)] - expected).abs() < 1e-9, "m[{},{}]={}", r, c, m[(r, c)]);
            }
        }
    }

    #[test]
    fn margin_rectangle_is_near_identity() {
        // The corners already form the destination rectangle, shrunk by a
        // 10-pixel margin: the linear part stays close to identity.
        let set = ControlPointSet::new([
            Point::new(10.0, 10.0),
            Point::new(630.0, 10.0),
            Point::new(630.0, 470.0),
            Point::new(10.0, 470.0),
        ]);
        let h = set.compute_matrix((640, 480)).unwrap();
        let m = h.matrix();
        assert!((m[(0, 0)] - 1.0).abs() < 0.05);
        assert!((m[(1, 1)] - 1.0).abs() < 0.05);
        assert!(m[(0, 1)].abs() < 0.01 && m[(1, 0)].abs() < 0.01);
        assert!(m[(2, 0)].abs() < 1e-6 && m[(2, 1)].abs() < 1e-6);
        assert!(m[(0, 2)].abs() < 12.0 && m[(1, 2)].abs() < 12.0);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let set = ControlPointSet::new([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(0.0, 100.0),
        ]);
        match set.compute_matrix((640, 480)) {
            Err(ViewerError::DegenerateGeometry(_)) => {}
            other => panic!("expected DegenerateGeometry, got {:?}", other),
        }
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let p = Point::new(5.0, 5.0);
        let set = ControlPointSet::new([p, p, p, p]);
        assert!(matches!(
            set.compute_matrix((640, 480)),
            Err(ViewerError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn from_slice_requires_exactly_four() {
        let p = Point::new(1.0, 2.0);
        assert!(ControlPointSet::from_slice(&[p, p, p]).is_none());
        assert!(ControlPointSet::from_slice(&[p; 4]).is_some());
        assert!(ControlPointSet::from_slice(&[p; 5]).is_none());
    }

    #[test]
    fn normalized_round_trip() {
        let set = ControlPointSet::with_margin((1280, 720));
        let back = set.to_normalized((1280, 720)).to_absolute((1280, 720));
        for (a, b) in set.points().iter().zip(back.points()) {
            assert!((a.x - b.x).abs() < 1e-9);
            assert!((a.y - b.y).abs() < 1e-9);
        }
    }

    #[test]
    fn apply_produces_target_size_with_black_fill() {
        // Shrink a solid white frame through a quad smaller than the frame:
        // corners of the output sample inside the source (white), while a
        // quad partly outside the source leaves black fill.
        let frame = Frame::filled(100, 100, [255, 255, 255]);
        let set = ControlPointSet::new([
            Point::new(-50.0, -50.0),
            Point::new(99.0, 0.0),
            Point::new(99.0, 99.0),
            Point::new(0.0, 99.0),
        ]);
        let h = set.compute_matrix((100, 100)).unwrap();
        let out = apply(&frame, &h);
        assert_eq!(out.size(), (100, 100));
        // The TL corner maps from (-50,-50), outside the source: black.
        assert_eq!(out.pixel(0, 0), [0, 0, 0]);
        // The BR corner maps from (99,99), inside: white.
        assert_eq!(out.pixel(99, 99), [255, 255, 255]);
    }
}
