// Test harness shared by unit tests and the integration_tests binary

pub mod clock;
#[cfg(unix)]
pub mod fake_ffmpeg;
pub mod runner;
pub mod scenarios;
pub mod synthetic;

pub use clock::ManualClock;
pub use synthetic::SyntheticStream;

use std::path::PathBuf;

use crate::config::{CameraProfile, HysteresisParams};

/// Geometry of harness cameras: small enough to be fast, and 1000 pixels so
/// deltas in steps of 0.001 are exact.
pub const TEST_WIDTH: u32 = 100;
pub const TEST_HEIGHT: u32 = 10;

/// Camera with the given hysteresis and a dummy output directory
pub fn camera_with(hysteresis: HysteresisParams) -> CameraProfile {
    CameraProfile {
        name: "test".to_string(),
        stream_hq: "synthetic://hq".to_string(),
        stream_lq: "synthetic://lq".to_string(),
        output_dir: std::env::temp_dir().join("motioncam-test"),
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
        hysteresis,
        shader: None,
    }
}

/// Camera with default hysteresis recording into `output_dir`
pub fn camera_in(output_dir: PathBuf) -> CameraProfile {
    CameraProfile {
        output_dir,
        ..camera_with(HysteresisParams::default())
    }
}
