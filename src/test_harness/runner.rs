use std::time::Instant;

use crate::motion::{MotionDetector, Signal};

use super::scenarios::Scenario;
use super::{camera_with, ManualClock, SyntheticStream};

/// Result of a single test run.
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

impl TestResult {
    fn finish(name: &str, start: Instant, errors: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: errors.is_empty(),
            duration_ms: start.elapsed().as_millis() as u64,
            errors,
        }
    }
}

// ── Detector scenarios ───────────────────────────────────────────────

pub fn run_scenario(scenario: &Scenario) -> TestResult {
    let start = Instant::now();
    let mut errors: Vec<String> = Vec::new();

    let camera = camera_with(scenario.hysteresis.clone());
    let clock = ManualClock::new();
    let mut stream = SyntheticStream::for_camera(&camera);
    let mut detector = match MotionDetector::new(&camera, clock.clone()) {
        Ok(d) => d,
        Err(e) => return TestResult::finish(&scenario.name, start, vec![e.to_string()]),
    };

    let mut signals: Vec<(usize, Signal)> = Vec::new();
    let mut last_signal = None;
    let mut index = 0;

    for step in &scenario.steps {
        for _ in 0..step.frames {
            clock.advance(step.advance);
            let signal = detector.feed(&stream.next_with_delta(step.delta));
            if signal != Signal::NoChange {
                signals.push((index, signal));
                last_signal = Some(signal);
            }

            let expect_active = last_signal == Some(Signal::MotionStarted);
            if detector.is_motion_active() != expect_active {
                errors.push(format!(
                    "frame {}: motion_active={} after last signal {:?}",
                    index,
                    detector.is_motion_active(),
                    last_signal
                ));
            }
            index += 1;
        }
    }

    if signals != scenario.expected {
        errors.push(format!(
            "signals {:?}, expected {:?}",
            signals, scenario.expected
        ));
    }
    if detector.phase() != scenario.final_phase {
        errors.push(format!(
            "final phase {:?}, expected {:?}",
            detector.phase(),
            scenario.final_phase
        ));
    }

    TestResult::finish(&scenario.name, start, errors)
}

// ── Pipeline checks (fake ffmpeg) ────────────────────────────────────

#[cfg(unix)]
pub use pipeline::{build_pipeline_cases, run_pipeline, PipelineCase};

#[cfg(unix)]
mod pipeline {
    use std::time::{Duration, Instant};

    use crate::config::{HysteresisParams, Settings};
    use crate::recording::{CameraWorker, ExitReason};
    use crate::shutdown::ShutdownToken;

    use super::super::camera_in;
    use super::super::fake_ffmpeg::{is_alive, recorder_pids, FakeFfmpeg};
    use super::TestResult;

    pub struct PipelineCase {
        pub name: String,
        pub busy_pairs: u32,
        pub quiet_frames: u32,
        pub hold_secs: f64,
        pub hysteresis: HysteresisParams,
        /// Cancel the shutdown token after this long
        pub cancel_after: Option<Duration>,
        pub expect_recordings: u32,
        pub expect_exit: ExitReason,
        /// Upper bound on the worker's run time
        pub max_duration: Duration,
    }

    fn quick_params() -> HysteresisParams {
        HysteresisParams {
            frame_history: 1,
            start_frames: 3,
            prestop_low_full: 3,
            cancel_prestop_frames: 3,
            full_stop_delay: 0.0,
            ..HysteresisParams::default()
        }
    }

    pub fn build_pipeline_cases() -> Vec<PipelineCase> {
        vec![
            PipelineCase {
                name: "pipeline_stream_ends_while_recording".into(),
                busy_pairs: 4,
                quiet_frames: 0,
                hold_secs: 0.0,
                hysteresis: quick_params(),
                cancel_after: None,
                expect_recordings: 1,
                expect_exit: ExitReason::StreamEnded,
                max_duration: Duration::from_secs(10),
            },
            PipelineCase {
                name: "pipeline_motion_then_quiet_stops_recorder".into(),
                busy_pairs: 4,
                quiet_frames: 10,
                hold_secs: 0.5,
                hysteresis: quick_params(),
                cancel_after: None,
                expect_recordings: 1,
                expect_exit: ExitReason::StreamEnded,
                max_duration: Duration::from_secs(10),
            },
            PipelineCase {
                name: "pipeline_shutdown_while_recording".into(),
                busy_pairs: 4,
                quiet_frames: 0,
                hold_secs: 60.0,
                hysteresis: quick_params(),
                cancel_after: Some(Duration::from_millis(500)),
                expect_recordings: 1,
                expect_exit: ExitReason::Shutdown,
                max_duration: Duration::from_secs(10),
            },
        ]
    }

    pub fn run_pipeline(case: &PipelineCase) -> TestResult {
        let start = Instant::now();
        let mut errors: Vec<String> = Vec::new();

        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => return TestResult::finish(&case.name, start, vec![e.to_string()]),
        };

        let mut camera = camera_in(dir.path().join("recordings"));
        camera.hysteresis = case.hysteresis.clone();

        let fake = FakeFfmpeg {
            frame_len: camera.pixels(),
            busy_pairs: case.busy_pairs,
            quiet_frames: case.quiet_frames,
            hold_secs: case.hold_secs,
        };
        let script = match fake.install(dir.path()) {
            Ok(p) => p,
            Err(e) => return TestResult::finish(&case.name, start, vec![e.to_string()]),
        };

        let settings = Settings {
            ffmpeg_path: script.to_string_lossy().into_owned(),
            hwaccel: None,
            shader_dir: dir.path().join("shaders"),
            stop_timeout_secs: 2,
            ..Settings::default()
        };

        let shutdown = ShutdownToken::new();
        let outcome = std::thread::scope(|scope| {
            if let Some(delay) = case.cancel_after {
                let token = shutdown.clone();
                scope.spawn(move || {
                    std::thread::sleep(delay);
                    token.cancel();
                });
            }
            CameraWorker::new(&camera, &settings, shutdown.clone()).run()
        });

        match outcome {
            Ok(report) => {
                if report.recordings.started != case.expect_recordings {
                    errors.push(format!(
                        "{} recordings, expected {}",
                        report.recordings.started, case.expect_recordings
                    ));
                }
                if report.exit != case.expect_exit {
                    errors.push(format!("exit '{}', expected '{}'", report.exit, case.expect_exit));
                }
            }
            Err(e) => errors.push(format!("worker failed: {}", e)),
        }

        for pid in recorder_pids(dir.path()) {
            if is_alive(pid) {
                errors.push(format!("recorder pid {} still running", pid));
            }
        }

        let elapsed = start.elapsed();
        if elapsed > case.max_duration {
            errors.push(format!("took {:.1}s", elapsed.as_secs_f64()));
        }

        TestResult::finish(&case.name, start, errors)
    }
}

// ── Reporting ────────────────────────────────────────────────────────

pub fn print_summary(results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    println!("\n  === Test Results ===\n");

    for (i, result) in results.iter().enumerate() {
        let status = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "  [{}/{}] {} {} {} ({}ms)",
            i + 1,
            results.len(),
            result.name,
            ".".repeat(50_usize.saturating_sub(result.name.len())),
            status,
            result.duration_ms
        );
        for err in &result.errors {
            println!("         -> {}", err);
        }
    }

    println!();
    if failed == 0 {
        println!("  Results: {} passed, 0 failed", passed);
    } else {
        println!("  Results: {} passed, {} FAILED", passed, failed);
    }
    println!();
}
