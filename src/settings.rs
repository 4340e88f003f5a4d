//! Persisted viewer settings.
//!
//! A flat keyed JSON record, read and written by an external config
//! collaborator. Loading never fails: a missing or corrupt file falls back to
//! defaults with a warning, and saving is best-effort. Environment variables
//! override the file, which is how deployments pin a device without touching
//! the record.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adjust::{Flip, ImageAdjustmentSettings, Rotation};
use crate::capture::CaptureDevice;
use crate::correct::{ControlPointSet, Point};
use crate::error::ViewerError;

const DEFAULT_SETTINGS_PATH: &str = "deskview_settings.json";
const DEFAULT_REFERENCE_RESOLUTION: (u32, u32) = (1280, 720);

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    camera_index: Option<u32>,
    #[serde(alias = "perspective_points")]
    correction_points: Option<Vec<Point>>,
    reference_resolution: Option<ResolutionRecord>,
    image_adjustments: Option<AdjustmentsFile>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
struct ResolutionRecord {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize, Default)]
struct AdjustmentsFile {
    brightness: Option<i32>,
    contrast: Option<i32>,
    #[serde(alias = "rotation")]
    orientation: Option<u32>,
    flip: Option<Flip>,
    flip_horizontal: Option<bool>,
    resolution: Option<ResolutionRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub device: CaptureDevice,
    /// Absolute pixel coordinates against `reference_resolution`; `None`
    /// (or anything but exactly four entries) means no correction active.
    pub correction_points: Option<ControlPointSet>,
    pub reference_resolution: (u32, u32),
    pub adjustments: ImageAdjustmentSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: CaptureDevice::Index(0),
            correction_points: None,
            reference_resolution: DEFAULT_REFERENCE_RESOLUTION,
            adjustments: ImageAdjustmentSettings::default(),
        }
    }
}

impl Settings {
    /// Load from `DESKVIEW_SETTINGS` (or the default path), then apply env
    /// overrides. Never fails: corrupt input is logged and replaced with
    /// defaults, per record and per field.
    pub fn load() -> Self {
        let path = std::env::var("DESKVIEW_SETTINGS")
            .unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
        let mut settings = Self::load_from(Path::new(&path));
        settings.apply_env();
        settings
    }

    /// Load from an explicit path, defaults on missing/corrupt.
    pub fn load_from(path: &Path) -> Self {
        match read_settings_file(path) {
            Ok(Some(file)) => Self::from_file(file),
            Ok(None) => Self::default(),
            Err(err) => {
                let status = ViewerError::ConfigCorrupt(err.to_string());
                log::warn!("{}; using defaults", status);
                Self::default()
            }
        }
    }

    fn from_file(file: SettingsFile) -> Self {
        let device = CaptureDevice::Index(file.camera_index.unwrap_or(0));
        let correction_points = file
            .correction_points
            .as_deref()
            .and_then(ControlPointSet::from_slice);
        if file.correction_points.is_some() && correction_points.is_none() {
            log::warn!("settings: correction_points does not hold exactly 4 points, ignored");
        }
        let reference_resolution = file
            .reference_resolution
            .map(|r| (r.width.max(1), r.height.max(1)))
            .unwrap_or(DEFAULT_REFERENCE_RESOLUTION);

        let adj = file.image_adjustments.unwrap_or_default();
        let flip = adj.flip.unwrap_or(match adj.flip_horizontal {
            Some(true) => Flip::Horizontal,
            _ => Flip::None,
        });
        let adjustments = ImageAdjustmentSettings {
            brightness: adj.brightness.unwrap_or(0),
            contrast: adj.contrast.unwrap_or(0),
            rotation: Rotation::from_index(adj.orientation.unwrap_or(0)),
            flip,
            requested_resolution: adj.resolution.map(|r| (r.width, r.height)),
        }
        .clamped();

        Self {
            device,
            correction_points,
            reference_resolution,
            adjustments,
        }
    }

    fn apply_env(&mut self) {
        if let Ok(device) = std::env::var("DESKVIEW_DEVICE") {
            match device.parse() {
                Ok(parsed) => self.device = parsed,
                Err(err) => log::warn!("DESKVIEW_DEVICE ignored: {}", err),
            }
        }
        if let Ok(resolution) = std::env::var("DESKVIEW_RESOLUTION") {
            match parse_resolution(&resolution) {
                Ok(parsed) => self.adjustments.requested_resolution = Some(parsed),
                Err(err) => log::warn!("DESKVIEW_RESOLUTION ignored: {}", err),
            }
        }
    }

    /// Best-effort save: failures are logged, never propagated.
    pub fn save(&self, path: &Path) {
        if let Err(err) = self.try_save(path) {
            log::warn!("settings save to {} failed: {}", path.display(), err);
        }
    }

    pub fn try_save(&self, path: &Path) -> Result<()> {
        let record = serde_json::json!({
            "camera_index": match self.device {
                CaptureDevice::Index(i) => i,
                CaptureDevice::Synthetic => 0,
            },
            "correction_points": self
                .correction_points
                .as_ref()
                .map(|set| set.points().to_vec()),
            "reference_resolution": ResolutionRecord {
                width: self.reference_resolution.0,
                height: self.reference_resolution.1,
            },
            "image_adjustments": {
                "brightness": self.adjustments.brightness,
                "contrast": self.adjustments.contrast,
                "orientation": self.adjustments.rotation.index(),
                "flip": self.adjustments.flip,
                "resolution": self.adjustments.requested_resolution.map(|(width, height)| {
                    ResolutionRecord { width, height }
                }),
            },
        });
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(path, json)
            .with_context(|| format!("write settings file {}", path.display()))?;
        Ok(())
    }
}

fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read settings file {}: {}", path.display(), e))?;
    let file = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid settings file {}: {}", path.display(), e))?;
    Ok(Some(file))
}

fn parse_resolution(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got '{}'", value))?;
    Ok((
        w.trim().parse().context("resolution width")?,
        h.trim().parse().context("resolution height")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("definitely/not/here.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn wrong_point_count_disables_correction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"camera_index": 1, "correction_points": [{"x": 1.0, "y": 2.0}]}"#,
        )
        .unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.device, CaptureDevice::Index(1));
        assert!(settings.correction_points.is_none());
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "perspective_points": [
                    {"x": 0.0, "y": 0.0}, {"x": 100.0, "y": 0.0},
                    {"x": 100.0, "y": 100.0}, {"x": 0.0, "y": 100.0}
                ],
                "image_adjustments": {"rotation": 2, "flip_horizontal": true}
            }"#,
        )
        .unwrap();
        let settings = Settings::load_from(&path);
        assert!(settings.correction_points.is_some());
        assert_eq!(settings.adjustments.rotation, Rotation::Cw180);
        assert_eq!(settings.adjustments.flip, Flip::Horizontal);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            device: CaptureDevice::Index(2),
            correction_points: Some(ControlPointSet::with_margin((640, 480))),
            reference_resolution: (640, 480),
            adjustments: ImageAdjustmentSettings {
                brightness: 10,
                contrast: -5,
                rotation: Rotation::Cw90,
                flip: Flip::Vertical,
                requested_resolution: Some((1280, 720)),
            },
        };
        settings.try_save(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn out_of_range_adjustments_are_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"image_adjustments": {"brightness": 900, "contrast": -900}}"#,
        )
        .unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.adjustments.brightness, 100);
        assert_eq!(settings.adjustments.contrast, -100);
    }
}
