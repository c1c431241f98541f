use crate::config::CameraProfile;

/// Frame generator with exact frame-to-frame deltas.
///
/// The stream starts from an all-black frame, matching the detector's zeroed
/// previous mask. Each call flips `round(delta * pixels)` pixels between 0
/// and 255, so the delta against the previous frame is exactly `k / pixels`.
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    frame: Vec<u8>,
}

impl SyntheticStream {
    pub fn new(pixels: usize) -> Self {
        Self {
            frame: vec![0u8; pixels],
        }
    }

    pub fn for_camera(camera: &CameraProfile) -> Self {
        Self::new(camera.pixels())
    }

    /// Next frame, differing from the previous one by `delta`
    pub fn next_with_delta(&mut self, delta: f64) -> Vec<u8> {
        let pixels = self.frame.len();
        let flips = ((delta.clamp(0.0, 1.0) * pixels as f64).round() as usize).min(pixels);
        for px in &mut self.frame[..flips] {
            *px = 255 - *px;
        }
        self.frame.clone()
    }

    /// Frame identical to the previous one
    pub fn repeat(&self) -> Vec<u8> {
        self.frame.clone()
    }
}
