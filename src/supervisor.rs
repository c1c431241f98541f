// Runs one worker thread per camera and collects their outcomes

use std::fmt;
use std::thread;

use crate::config::Config;
use crate::recording::{CameraWorker, WorkerReport};
use crate::shutdown::ShutdownToken;

/// How a camera's worker ended
#[derive(Debug)]
pub enum WorkerOutcome {
    Finished(WorkerReport),
    /// The worker could not start its pipeline
    Failed(String),
    /// The worker thread panicked
    Panicked(String),
    /// The worker thread could not be created
    NotStarted(String),
}

impl WorkerOutcome {
    /// A worker is clean unless it panicked or never ran
    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerOutcome::Finished(_) | WorkerOutcome::Failed(_))
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerOutcome::Finished(r) => write!(
                f,
                "{} frames, {} recordings ({} failed), {}",
                r.frames, r.recordings.started, r.recordings.failed, r.exit
            ),
            WorkerOutcome::Failed(e) => write!(f, "failed: {}", e),
            WorkerOutcome::Panicked(e) => write!(f, "panicked: {}", e),
            WorkerOutcome::NotStarted(e) => write!(f, "not started: {}", e),
        }
    }
}

/// Per-camera outcomes in configuration order
#[derive(Debug, Default)]
pub struct SupervisorSummary {
    pub outcomes: Vec<(String, WorkerOutcome)>,
}

impl SupervisorSummary {
    pub fn all_clean(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_clean())
    }

    pub fn unclean_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_clean()).count()
    }

    pub fn print(&self) {
        println!("\n  Camera summary:");
        for (name, outcome) in &self.outcomes {
            let mark = if outcome.is_clean() { "ok" } else { "!!" };
            println!("    [{}] {}: {}", mark, name, outcome);
        }
        println!();
    }
}

pub struct Supervisor<'a> {
    config: &'a Config,
    shutdown: ShutdownToken,
}

impl<'a> Supervisor<'a> {
    pub fn new(config: &'a Config, shutdown: ShutdownToken) -> Self {
        Self { config, shutdown }
    }

    /// Start every camera and block until all of them have finished.
    ///
    /// A worker that fails or panics does not affect the others.
    pub fn run(&self) -> SupervisorSummary {
        let settings = &self.config.settings;

        let outcomes: Vec<(String, WorkerOutcome)> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.config.cameras.len());

            for camera in &self.config.cameras {
                let shutdown = self.shutdown.clone();
                let spawned = thread::Builder::new()
                    .name(format!("motioncam-{}", camera.name))
                    .spawn_scoped(scope, move || {
                        CameraWorker::new(camera, settings, shutdown).run()
                    });

                if let Err(e) = &spawned {
                    log::error!("[{}] Failed to spawn worker thread: {}", camera.name, e);
                }
                handles.push((camera.name.clone(), spawned.map_err(|e| e.to_string())));
            }

            handles
                .into_iter()
                .map(|(name, handle)| {
                    let outcome = match handle {
                        Err(e) => WorkerOutcome::NotStarted(e),
                        Ok(handle) => match handle.join() {
                            Ok(Ok(report)) => WorkerOutcome::Finished(report),
                            Ok(Err(e)) => {
                                log::error!("[{}] Worker failed: {}", name, e);
                                WorkerOutcome::Failed(e.to_string())
                            }
                            Err(panic) => {
                                let message = panic_message(panic.as_ref());
                                log::error!("[{}] Worker panicked: {}", name, message);
                                WorkerOutcome::Panicked(message)
                            }
                        },
                    };
                    (name, outcome)
                })
                .collect()
        });

        SupervisorSummary { outcomes }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{ExitReason, RecordingStats};

    fn report(exit: ExitReason) -> WorkerOutcome {
        WorkerOutcome::Finished(WorkerReport {
            camera: "a".into(),
            frames: 10,
            recordings: RecordingStats::default(),
            exit,
        })
    }

    #[test]
    fn failures_and_panics_are_unclean() {
        let summary = SupervisorSummary {
            outcomes: vec![
                ("a".into(), report(ExitReason::StreamEnded)),
                ("b".into(), WorkerOutcome::Failed("spawn".into())),
                ("c".into(), WorkerOutcome::Panicked("boom".into())),
            ],
        };
        assert!(!summary.all_clean());
        assert_eq!(summary.unclean_count(), 1);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("frame size");
        assert_eq!(panic_message(payload.as_ref()), "frame size");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn failing_worker_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = crate::test_harness::camera_in(dir.path().join("a"));
        a.name = "a".into();
        let mut b = a.clone();
        b.name = "b".into();

        let config = Config {
            settings: crate::config::Settings {
                ffmpeg_path: "/nonexistent/ffmpeg".into(),
                ..Default::default()
            },
            cameras: vec![a, b],
        };

        let summary = Supervisor::new(&config, ShutdownToken::new()).run();
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.outcomes[0].0, "a");
        assert!(summary
            .outcomes
            .iter()
            .all(|(_, o)| matches!(o, WorkerOutcome::Failed(_))));
        assert!(summary.all_clean());
    }
}
