// Recording modules

pub mod controller;
pub mod frames;
pub mod worker;

pub use controller::{FfmpegRecorder, RecorderSpawner, RecordingController, RecordingStats};
pub use frames::FramePump;
pub use worker::{CameraWorker, ExitReason, WorkerError, WorkerReport};
