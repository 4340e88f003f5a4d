//! Capture session management.
//!
//! Owns the camera handle lifecycle: open, negotiate resolution, read,
//! release. Device negotiation can be slow, so `open_background` runs it on a
//! spawned thread and delivers the result over a channel the orchestrator
//! polls; nothing here ever blocks the interactive path beyond a single
//! bounded `read`.
//!
//! Two backends:
//! - Synthetic (always compiled): deterministic document-style test pattern,
//!   used by tests and `stub` device ids.
//! - Device (feature `capture-nokhwa`): real cameras through nokhwa with the
//!   native input backend per OS.

mod synthetic;

#[cfg(feature = "capture-nokhwa")]
mod device;

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use crate::error::ViewerError;
use crate::frame::Frame;

use synthetic::SyntheticSource;

#[cfg(feature = "capture-nokhwa")]
use device::DeviceSource;

/// Fallback candidates tried after the preferred resolution, in order.
pub const RESOLUTION_LADDER: [(u32, u32); 2] = [(1280, 720), (640, 480)];

pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Which camera to open. Parsed from config/CLI strings: an integer index,
/// or `stub` for the synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureDevice {
    Synthetic,
    Index(u32),
}

impl FromStr for CaptureDevice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "stub" || s.starts_with("stub://") {
            return Ok(Self::Synthetic);
        }
        s.parse::<u32>()
            .map(Self::Index)
            .map_err(|_| format!("device must be an index or 'stub', got '{}'", s))
    }
}

impl fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthetic => write!(f, "stub"),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub device: CaptureDevice,
    /// Tried before the ladder; also the bound the device must honor.
    pub preferred_resolution: Option<(u32, u32)>,
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: CaptureDevice::Index(0),
            preferred_resolution: None,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl CaptureConfig {
    /// Candidate resolutions in descending preference order.
    fn candidates(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::with_capacity(1 + RESOLUTION_LADDER.len());
        if let Some(preferred) = self.preferred_resolution {
            out.push(preferred);
        }
        for &step in &RESOLUTION_LADDER {
            if !out.contains(&step) {
                out.push(step);
            }
        }
        out
    }
}

enum Backend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "capture-nokhwa")]
    Device(DeviceSource),
}

/// An open camera stream at a negotiated resolution.
pub struct CaptureSession {
    backend: Backend,
    device: CaptureDevice,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl CaptureSession {
    /// Open a device, walking the candidate resolutions and accepting the
    /// first the device honors at or above the requested bounds. Fails with
    /// `DeviceUnavailable` when every candidate is refused.
    pub fn open(config: &CaptureConfig) -> Result<Self, ViewerError> {
        let candidates = config.candidates();
        match &config.device {
            CaptureDevice::Synthetic => {
                // The synthetic source honors any resolution.
                let (width, height) = candidates[0];
                let source = SyntheticSource::new(width, height);
                log::info!("capture: synthetic source at {}x{}", width, height);
                Ok(Self {
                    backend: Backend::Synthetic(source),
                    device: CaptureDevice::Synthetic,
                    width,
                    height,
                    frames_read: 0,
                })
            }
            #[cfg(feature = "capture-nokhwa")]
            CaptureDevice::Index(index) => {
                let source = DeviceSource::open(*index, &candidates, config.target_fps)?;
                let (width, height) = source.resolution();
                log::info!("capture: device {} at {}x{}", index, width, height);
                Ok(Self {
                    backend: Backend::Device(source),
                    device: config.device.clone(),
                    width,
                    height,
                    frames_read: 0,
                })
            }
            #[cfg(not(feature = "capture-nokhwa"))]
            CaptureDevice::Index(index) => Err(ViewerError::DeviceUnavailable {
                device: index.to_string(),
                detail: "built without the capture-nokhwa feature".into(),
            }),
        }
    }

    /// Read the next frame. A failure here is transient: the caller retries
    /// next tick and never tears the session down over a single miss.
    pub fn read(&mut self) -> Result<Frame, ViewerError> {
        let frame = match &mut self.backend {
            Backend::Synthetic(source) => Ok(source.next_frame()),
            #[cfg(feature = "capture-nokhwa")]
            Backend::Device(source) => source.next_frame(),
        }?;
        self.frames_read += 1;
        Ok(frame)
    }

    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Release the device outright. No graceful drain of in-flight reads.
    pub fn close(self) {
        log::info!(
            "capture: closed device {} after {} frames",
            self.device,
            self.frames_read
        );
    }
}

// ----------------------------------------------------------------------------
// Background open
// ----------------------------------------------------------------------------

/// A capture open in flight on a background thread. Poll from the interactive
/// task; the result arrives exactly once.
pub struct PendingOpen {
    device: CaptureDevice,
    receiver: Receiver<Result<CaptureSession, ViewerError>>,
}

impl PendingOpen {
    /// The device this open was requested for, so the orchestrator can apply
    /// last-requested-wins when a newer open supersedes this one.
    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }

    /// Non-blocking poll. `None` while negotiation is still running.
    pub fn poll(&self) -> Option<Result<CaptureSession, ViewerError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ViewerError::DeviceUnavailable {
                device: self.device.to_string(),
                detail: "open thread exited without a result".into(),
            })),
        }
    }
}

/// Run `CaptureSession::open` off the interactive path. The spawned thread
/// sends exactly one result and exits.
pub fn open_background(config: CaptureConfig) -> PendingOpen {
    let (sender, receiver) = mpsc::channel();
    let device = config.device.clone();
    thread::spawn(move || {
        let result = CaptureSession::open(&config);
        // The receiver may be gone if a newer open superseded this one.
        let _ = sender.send(result);
    });
    PendingOpen { device, receiver }
}

// ----------------------------------------------------------------------------
// Device enumeration
// ----------------------------------------------------------------------------

/// Probe device indices on a background thread; the single result arrives on
/// the returned channel. Probing can stall on slow drivers, so the
/// interactive task should never run it inline.
pub fn enumerate_background(max_index: u32) -> Receiver<Vec<u32>> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(list_available_devices(max_index));
    });
    receiver
}

/// Finite open-probe over device indices. An empty result means "no device",
/// which callers surface as status, not an error.
pub fn list_available_devices(max_index: u32) -> Vec<u32> {
    #[cfg(feature = "capture-nokhwa")]
    {
        (0..max_index).filter(|&i| device::probe(i)).collect()
    }
    #[cfg(not(feature = "capture-nokhwa"))]
    {
        log::debug!(
            "device probe up to index {} skipped: built without capture-nokhwa",
            max_index
        );
        Vec::new()
    }
}
