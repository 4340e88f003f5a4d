//! Recoverable error taxonomy.
//!
//! Every variant here is recoverable by design: the boundary that observes it
//! converts it into a status signal for display and carries on. Nothing in
//! this enum should ever tear the process down.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerError {
    /// Capture open failed after trying every candidate resolution.
    DeviceUnavailable { device: String, detail: String },
    /// A single frame read failed; retried next tick, no session teardown.
    TransientReadFailure(String),
    /// Control points cannot form a valid homography (collinear points,
    /// zero-area quadrilateral, singular system).
    DegenerateGeometry(String),
    /// Persisted settings unreadable or malformed; replaced with defaults.
    ConfigCorrupt(String),
    /// Writing an exported frame failed; in-memory state untouched.
    ExportFailure(String),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceUnavailable { device, detail } => {
                write!(f, "device {} unavailable: {}", device, detail)
            }
            Self::TransientReadFailure(msg) => write!(f, "frame read failed: {}", msg),
            Self::DegenerateGeometry(msg) => write!(f, "degenerate control points: {}", msg),
            Self::ConfigCorrupt(msg) => write!(f, "settings unreadable: {}", msg),
            Self::ExportFailure(msg) => write!(f, "export failed: {}", msg),
        }
    }
}

impl std::error::Error for ViewerError {}
