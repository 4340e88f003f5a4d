//! Real-camera backend through nokhwa.
//!
//! Negotiation walks the caller's candidate resolutions; a candidate is
//! accepted only when the opened stream reports a resolution at or above the
//! requested bounds. Decoded frames arrive as RGB8 regardless of the wire
//! format the device picked.

use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
    Camera,
};

use crate::error::ViewerError;
use crate::frame::Frame;

pub(super) struct DeviceSource {
    camera: Camera,
    width: u32,
    height: u32,
}

impl DeviceSource {
    pub(super) fn open(
        index: u32,
        candidates: &[(u32, u32)],
        target_fps: u32,
    ) -> Result<Self, ViewerError> {
        let mut last_error = String::from("no candidate resolutions");

        for &(width, height) in candidates {
            let format = CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::YUYV,
                target_fps.max(1),
            );
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

            let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
                Ok(camera) => camera,
                Err(err) => {
                    last_error = format!("create camera at {}x{}: {}", width, height, err);
                    continue;
                }
            };
            if let Err(err) = camera.open_stream() {
                last_error = format!("open stream at {}x{}: {}", width, height, err);
                continue;
            }

            let actual = camera.resolution();
            if actual.width() >= width && actual.height() >= height {
                return Ok(Self {
                    camera,
                    width: actual.width(),
                    height: actual.height(),
                });
            }
            last_error = format!(
                "device honored {}x{} below requested {}x{}",
                actual.width(),
                actual.height(),
                width,
                height
            );
            let _ = camera.stop_stream();
        }

        Err(ViewerError::DeviceUnavailable {
            device: index.to_string(),
            detail: last_error,
        })
    }

    pub(super) fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame, ViewerError> {
        let raw = self
            .camera
            .frame()
            .map_err(|err| ViewerError::TransientReadFailure(err.to_string()))?;
        let decoded = raw
            .decode_image::<RgbFormat>()
            .map_err(|err| ViewerError::TransientReadFailure(format!("decode: {}", err)))?;
        let (width, height) = decoded.dimensions();
        Frame::from_raw(width, height, decoded.into_raw())
            .map_err(|err| ViewerError::TransientReadFailure(err.to_string()))
    }
}

/// Open-probe a single index: true when a camera answers at all.
pub(super) fn probe(index: u32) -> bool {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    Camera::new(CameraIndex::Index(index), requested).is_ok()
}
