use std::sync::Mutex;

use tempfile::NamedTempFile;

use deskview::{CaptureDevice, Flip, Rotation, Settings};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in ["DESKVIEW_SETTINGS", "DESKVIEW_DEVICE", "DESKVIEW_RESOLUTION"] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_settings_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp settings");
    let json = r#"{
        "camera_index": 1,
        "correction_points": [
            {"x": 64.0, "y": 36.0},
            {"x": 1216.0, "y": 36.0},
            {"x": 1216.0, "y": 684.0},
            {"x": 64.0, "y": 684.0}
        ],
        "reference_resolution": {"width": 1280, "height": 720},
        "image_adjustments": {
            "brightness": 20,
            "contrast": -10,
            "orientation": 1,
            "flip": "vertical"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write settings");

    std::env::set_var("DESKVIEW_SETTINGS", file.path());
    std::env::set_var("DESKVIEW_DEVICE", "stub");
    std::env::set_var("DESKVIEW_RESOLUTION", "640x480");

    let settings = Settings::load();

    // Env wins over the record for the device and requested resolution.
    assert_eq!(settings.device, CaptureDevice::Synthetic);
    assert_eq!(settings.adjustments.requested_resolution, Some((640, 480)));

    // The rest comes from the file.
    assert!(settings.correction_points.is_some());
    assert_eq!(settings.reference_resolution, (1280, 720));
    assert_eq!(settings.adjustments.brightness, 20);
    assert_eq!(settings.adjustments.contrast, -10);
    assert_eq!(settings.adjustments.rotation, Rotation::Cw90);
    assert_eq!(settings.adjustments.flip, Flip::Vertical);

    clear_env();
}

#[test]
fn missing_file_and_bad_env_fall_back_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DESKVIEW_SETTINGS", "/nonexistent/deskview.json");
    std::env::set_var("DESKVIEW_DEVICE", "not-a-device");
    std::env::set_var("DESKVIEW_RESOLUTION", "garbage");

    let settings = Settings::load();
    assert_eq!(settings, Settings::default());

    clear_env();
}
