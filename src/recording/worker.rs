// Per-camera pipeline: frame source -> detector -> recorder

use std::collections::TryReserveError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crossbeam_channel::select;

use crate::config::{CameraProfile, Settings};
use crate::ffmpeg::{self, ManagedProcess, ProcessError};
use crate::motion::{shader, MonotonicClock, MotionDetector};
use crate::shutdown::ShutdownToken;

use super::controller::{FfmpegRecorder, RecordingController, RecordingStats};
use super::frames::FramePump;

/// Failures that keep a worker from starting
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("failed to allocate frame buffers: {0}")]
    Alloc(#[from] TryReserveError),
}

/// Why the frame loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The frame source closed its output between frames
    StreamEnded,
    /// A read failed or a frame was truncated
    StreamError(String),
    /// The shutdown token was cancelled
    Shutdown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StreamEnded => write!(f, "stream ended"),
            ExitReason::StreamError(e) => write!(f, "stream error: {}", e),
            ExitReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What a finished worker reports to the supervisor
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub camera: String,
    pub frames: u64,
    pub recordings: RecordingStats,
    pub exit: ExitReason,
}

pub struct CameraWorker<'a> {
    camera: &'a CameraProfile,
    settings: &'a Settings,
    shutdown: ShutdownToken,
}

impl<'a> CameraWorker<'a> {
    pub fn new(camera: &'a CameraProfile, settings: &'a Settings, shutdown: ShutdownToken) -> Self {
        Self {
            camera,
            settings,
            shutdown,
        }
    }

    /// Shader handed to the frame source
    fn shader_path(&self) -> io::Result<PathBuf> {
        match &self.camera.shader {
            Some(params) => shader::generate_motion_shader(
                params,
                self.camera.width,
                self.camera.height,
                &self.settings.shader_dir,
            ),
            None => Ok(self.settings.filter_shader.clone()),
        }
    }

    /// Run until the stream ends or shutdown is requested.
    ///
    /// Any recording in progress is stopped before this returns, on every
    /// path out of the frame loop.
    pub fn run(self) -> Result<WorkerReport, WorkerError> {
        let camera = self.camera;
        let settings = self.settings;

        let mut detector = MotionDetector::new(camera, MonotonicClock)?;
        let shader = self.shader_path()?;

        let args = ffmpeg::motion_source_args(settings, camera, &shader);
        let mut source = ManagedProcess::spawn(
            format!("{}-source", camera.name),
            &settings.ffmpeg_path,
            &args,
            true,
        )?
        .with_stop_timeout(settings.stop_timeout());
        let pump = FramePump::spawn(&camera.name, source.take_stdout()?, detector.frame_len())?;

        log::info!(
            "[{}] Watching {} ({}x{}, pid {})",
            camera.name,
            camera.stream_lq,
            camera.width,
            camera.height,
            source.id()
        );

        let mut recorder = RecordingController::new(camera, settings, FfmpegRecorder::new(settings));
        let wake = self.shutdown.wake_channel();

        let exit = loop {
            if self.shutdown.is_cancelled() {
                break ExitReason::Shutdown;
            }

            select! {
                recv(pump.frames()) -> msg => match msg {
                    Ok(Ok(frame)) => {
                        let signal = detector.feed(&frame);
                        pump.recycle(frame);
                        recorder.reap_if_exited();
                        recorder.on_signal(signal);
                    }
                    Ok(Err(e)) => {
                        log::warn!("[{}] Frame source error: {}", camera.name, e);
                        break ExitReason::StreamError(e.to_string());
                    }
                    Err(_) => {
                        log::info!("[{}] Frame source ended", camera.name);
                        break ExitReason::StreamEnded;
                    }
                },
                recv(wake) -> _ => break ExitReason::Shutdown,
            }
        };

        // Recording first, then the source, then the reader blocked on it
        recorder.shutdown();
        match source.stop(settings.stop_timeout()) {
            Ok(outcome) => log::debug!("[{}] Frame source stopped: {:?}", camera.name, outcome),
            Err(e) => log::error!("[{}] Failed to stop frame source: {}", camera.name, e),
        }
        pump.finish();

        let report = WorkerReport {
            camera: camera.name.clone(),
            frames: detector.frames_seen(),
            recordings: recorder.stats(),
            exit,
        };
        log::info!(
            "[{}] Worker finished: {} ({} frames, {} recordings)",
            camera.name,
            report.exit,
            report.frames,
            report.recordings.started
        );
        Ok(report)
    }
}
