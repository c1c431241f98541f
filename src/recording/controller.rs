// Recorder lifecycle for one camera
//
// At most one recorder subprocess runs per camera. MotionStarted spawns one if
// none is active, MotionStopped stops it; both are no-ops otherwise.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::{CameraProfile, Settings};
use crate::ffmpeg::{self, ManagedProcess, ProcessError, StopOutcome};
use crate::motion::Signal;

/// Starts the process that captures the high-quality stream
pub trait RecorderSpawner {
    fn spawn_recorder(
        &mut self,
        camera: &CameraProfile,
        output: &Path,
    ) -> Result<ManagedProcess, ProcessError>;
}

/// Spawns `ffmpeg -i <stream_hq> -c copy <output>`
pub struct FfmpegRecorder<'a> {
    settings: &'a Settings,
}

impl<'a> FfmpegRecorder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }
}

impl RecorderSpawner for FfmpegRecorder<'_> {
    fn spawn_recorder(
        &mut self,
        camera: &CameraProfile,
        output: &Path,
    ) -> Result<ManagedProcess, ProcessError> {
        let args = ffmpeg::recorder_args(self.settings, camera, output);
        Ok(ManagedProcess::spawn(
            format!("{}-recorder", camera.name),
            &self.settings.ffmpeg_path,
            &args,
            false,
        )?
        .with_stop_timeout(self.settings.stop_timeout()))
    }
}

/// Counters reported in the worker summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Recorders spawned successfully
    pub started: u32,
    /// Sessions that could not be started
    pub failed: u32,
    /// Recorders that exited without being asked to
    pub exited_early: u32,
}

/// The recording currently in progress
#[derive(Debug)]
struct ActiveRecording {
    process: ManagedProcess,
    path: PathBuf,
    started: Instant,
}

pub struct RecordingController<'a, S: RecorderSpawner> {
    camera: &'a CameraProfile,
    spawner: S,
    extension: String,
    stop_timeout: Duration,
    active: Option<ActiveRecording>,
    last_path: Option<PathBuf>,
    stats: RecordingStats,
}

impl<'a, S: RecorderSpawner> RecordingController<'a, S> {
    pub fn new(camera: &'a CameraProfile, settings: &Settings, spawner: S) -> Self {
        Self {
            camera,
            spawner,
            extension: settings.container_extension.clone(),
            stop_timeout: settings.stop_timeout(),
            active: None,
            last_path: None,
            stats: RecordingStats::default(),
        }
    }

    /// Route a detector signal
    pub fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::NoChange => {}
            Signal::MotionStarted => self.start(),
            Signal::MotionStopped => self.stop(),
        }
    }

    /// Start a recording unless one is already running
    pub fn start(&mut self) {
        if self.active.is_some() {
            log::debug!("[{}] Recorder already running", self.camera.name);
            return;
        }

        if let Err(e) = std::fs::create_dir_all(&self.camera.output_dir) {
            log::error!(
                "[{}] Failed to create {}: {}",
                self.camera.name,
                self.camera.output_dir.display(),
                e
            );
            self.stats.failed += 1;
            return;
        }

        let path = self.next_output_path(Utc::now());
        match self.spawner.spawn_recorder(self.camera, &path) {
            Ok(process) => {
                log::info!(
                    "[{}] Recording to {} (pid {})",
                    self.camera.name,
                    path.display(),
                    process.id()
                );
                self.stats.started += 1;
                self.last_path = Some(path.clone());
                self.active = Some(ActiveRecording {
                    process,
                    path,
                    started: Instant::now(),
                });
            }
            Err(e) => {
                // Retried on the next MotionStarted
                log::error!("[{}] Failed to start recorder: {}", self.camera.name, e);
                self.stats.failed += 1;
            }
        }
    }

    /// Stop the running recording, if any, and wait for the recorder to exit
    pub fn stop(&mut self) {
        let Some(mut recording) = self.active.take() else {
            return;
        };

        let elapsed = recording.started.elapsed().as_secs_f64();
        match recording.process.stop(self.stop_timeout) {
            Ok(StopOutcome::Killed(_)) => log::warn!(
                "[{}] Recorder killed after {:.1}s, {} may be incomplete",
                self.camera.name,
                elapsed,
                recording.path.display()
            ),
            Ok(outcome) => log::info!(
                "[{}] Recording finished after {:.1}s: {} ({})",
                self.camera.name,
                elapsed,
                recording.path.display(),
                outcome.status()
            ),
            Err(e) => log::error!("[{}] Failed to stop recorder: {}", self.camera.name, e),
        }
    }

    /// Release the handle of a recorder that exited on its own
    pub fn reap_if_exited(&mut self) {
        let exited = match self.active.as_mut() {
            Some(recording) => match recording.process.try_wait() {
                Ok(status) => status,
                Err(e) => {
                    log::warn!("[{}] {}", self.camera.name, e);
                    None
                }
            },
            None => None,
        };

        if let Some(status) = exited {
            if let Some(recording) = self.active.take() {
                log::warn!(
                    "[{}] Recorder exited on its own ({}), {} closed",
                    self.camera.name,
                    status,
                    recording.path.display()
                );
            }
            self.stats.exited_early += 1;
        }
    }

    /// Stop any recording before the worker exits
    pub fn shutdown(&mut self) {
        if self.active.is_some() {
            log::info!("[{}] Stopping recording for shutdown", self.camera.name);
            self.stop();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the recording in progress
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|r| r.path.as_path())
    }

    /// Pid of the running recorder
    pub fn recorder_pid(&self) -> Option<u32> {
        self.active.as_ref().map(|r| r.process.id())
    }

    pub fn stats(&self) -> RecordingStats {
        self.stats
    }

    /// Timestamped path that is not on disk and differs from the previous session
    fn next_output_path(&self, now: DateTime<Utc>) -> PathBuf {
        let base = output_path(&self.camera.output_dir, &self.camera.name, now, &self.extension);
        let taken = |p: &Path| p.exists() || self.last_path.as_deref() == Some(p);

        if !taken(base.as_path()) {
            return base;
        }
        let mut n = 1u32;
        loop {
            let candidate = with_suffix(&base, n);
            if !taken(candidate.as_path()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `<dir>/<camera>_<YYYY-MM-DD_HH-MM-SS>.<ext>` in UTC
pub fn output_path(dir: &Path, camera: &str, at: DateTime<Utc>, extension: &str) -> PathBuf {
    dir.join(format!(
        "{}_{}.{}",
        camera,
        at.format("%Y-%m-%d_%H-%M-%S"),
        extension
    ))
}

/// `name.mkv` -> `name_<n>.mkv`
fn with_suffix(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::camera_in;
    use chrono::TimeZone;

    #[test]
    fn output_path_uses_utc_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 3).unwrap();
        assert_eq!(
            output_path(Path::new("/srv/cam"), "porch", at, "mkv"),
            PathBuf::from("/srv/cam/porch_2024-03-09_07-05-03.mkv")
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(
            with_suffix(Path::new("/a/porch_2024.mkv"), 2),
            PathBuf::from("/a/porch_2024_2.mkv")
        );
    }

    /// Records every request; fails the first `fail` of them
    #[cfg(unix)]
    struct SleepSpawner {
        requests: Vec<PathBuf>,
        fail: u32,
    }

    #[cfg(unix)]
    impl SleepSpawner {
        fn new(fail: u32) -> Self {
            Self {
                requests: Vec::new(),
                fail,
            }
        }
    }

    #[cfg(unix)]
    impl RecorderSpawner for SleepSpawner {
        fn spawn_recorder(
            &mut self,
            camera: &CameraProfile,
            output: &Path,
        ) -> Result<ManagedProcess, ProcessError> {
            self.requests.push(output.to_path_buf());
            if self.fail > 0 {
                self.fail -= 1;
                return ManagedProcess::spawn(&camera.name, "/nonexistent/recorder", &[], false);
            }
            ManagedProcess::spawn(&camera.name, "sleep", &["30".to_string()], false)
        }
    }

    #[cfg(unix)]
    #[test]
    fn start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let camera = camera_in(dir.path().join("porch"));
        let settings = Settings::default();
        let mut ctl = RecordingController::new(&camera, &settings, SleepSpawner::new(0));

        ctl.on_signal(Signal::MotionStopped);
        assert!(!ctl.is_recording());

        ctl.on_signal(Signal::MotionStarted);
        ctl.on_signal(Signal::MotionStarted);
        assert!(ctl.is_recording());
        assert_eq!(ctl.spawner.requests.len(), 1);
        assert_eq!(ctl.current_path(), Some(ctl.spawner.requests[0].as_path()));
        assert!(ctl.recorder_pid().is_some());
        assert!(dir.path().join("porch").is_dir());

        ctl.on_signal(Signal::NoChange);
        ctl.on_signal(Signal::MotionStopped);
        ctl.on_signal(Signal::MotionStopped);
        assert!(!ctl.is_recording());
        assert_eq!(ctl.current_path(), None);
        assert_eq!(ctl.recorder_pid(), None);
        assert_eq!(ctl.stats().started, 1);
        assert_eq!(ctl.stats().failed, 0);
    }

    #[cfg(unix)]
    #[test]
    fn consecutive_sessions_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let camera = camera_in(dir.path().to_path_buf());
        let settings = Settings::default();
        let mut ctl = RecordingController::new(&camera, &settings, SleepSpawner::new(0));

        ctl.start();
        ctl.stop();
        ctl.start();
        ctl.stop();

        let requests = &ctl.spawner.requests;
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0], requests[1]);
        assert!(requests.iter().all(|p| p.starts_with(dir.path())));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_failure_is_retried_on_next_start() {
        let dir = tempfile::tempdir().unwrap();
        let camera = camera_in(dir.path().to_path_buf());
        let settings = Settings::default();
        let mut ctl = RecordingController::new(&camera, &settings, SleepSpawner::new(1));

        ctl.on_signal(Signal::MotionStarted);
        assert!(!ctl.is_recording());
        assert_eq!(ctl.stats().failed, 1);

        // No retry until the next start
        ctl.on_signal(Signal::NoChange);
        assert_eq!(ctl.spawner.requests.len(), 1);

        ctl.on_signal(Signal::MotionStarted);
        assert!(ctl.is_recording());
        assert_eq!(ctl.stats().started, 1);
        ctl.shutdown();
        assert!(!ctl.is_recording());
    }

    #[cfg(unix)]
    #[test]
    fn recorder_that_exits_is_reaped() {
        struct TrueSpawner;
        impl RecorderSpawner for TrueSpawner {
            fn spawn_recorder(
                &mut self,
                camera: &CameraProfile,
                _output: &Path,
            ) -> Result<ManagedProcess, ProcessError> {
                ManagedProcess::spawn(&camera.name, "true", &[], false)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let camera = camera_in(dir.path().to_path_buf());
        let settings = Settings::default();
        let mut ctl = RecordingController::new(&camera, &settings, TrueSpawner);

        ctl.start();
        assert!(ctl.is_recording());

        let deadline = Instant::now() + Duration::from_secs(5);
        while ctl.is_recording() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
            ctl.reap_if_exited();
        }
        assert!(!ctl.is_recording());
        assert_eq!(ctl.stats().exited_early, 1);

        // A new session can start afterwards
        ctl.start();
        assert!(ctl.is_recording());
        assert_eq!(ctl.stats().started, 2);
    }

    #[test]
    fn unwritable_output_dir_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        struct Unreachable;
        impl RecorderSpawner for Unreachable {
            fn spawn_recorder(
                &mut self,
                _camera: &CameraProfile,
                _output: &Path,
            ) -> Result<ManagedProcess, ProcessError> {
                panic!("spawn must not be attempted");
            }
        }

        let camera = camera_in(blocker.join("sub"));
        let settings = Settings::default();
        let mut ctl = RecordingController::new(&camera, &settings, Unreachable);
        ctl.start();
        assert!(!ctl.is_recording());
        assert_eq!(ctl.stats().failed, 1);
    }
}
