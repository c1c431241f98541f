use std::time::Duration;

use crate::config::HysteresisParams;
use crate::motion::{Phase, Signal};

const BUSY: f64 = 0.01;
const QUIET: f64 = 0.001;

/// A run of identical frames
#[derive(Debug, Clone)]
pub struct Step {
    pub delta: f64,
    pub frames: usize,
    /// Clock advance before each frame of the step
    pub advance: Duration,
}

impl Step {
    pub fn new(delta: f64, frames: usize) -> Self {
        Self {
            delta,
            frames,
            advance: Duration::ZERO,
        }
    }

    pub fn every(mut self, advance: Duration) -> Self {
        self.advance = advance;
        self
    }
}

/// Scripted detector input and the signals it must produce
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub hysteresis: HysteresisParams,
    pub steps: Vec<Step>,
    /// Non-trivial signals by zero-based frame index
    pub expected: Vec<(usize, Signal)>,
    pub final_phase: Phase,
}

fn params(start: u32, prestop: u32, cancel: u32, delay: f64) -> HysteresisParams {
    HysteresisParams {
        frame_history: 1,
        start_frames: start,
        prestop_low_full: prestop,
        cancel_prestop_frames: cancel,
        full_stop_delay: delay,
        ..HysteresisParams::default()
    }
}

/// Every detector scenario, in run order
pub fn build_scenarios() -> Vec<Scenario> {
    let second = Duration::from_secs(1);

    vec![
        Scenario {
            name: "start_after_interrupted_run".into(),
            hysteresis: params(3, 5, 3, 1.0),
            steps: vec![Step::new(BUSY, 2), Step::new(QUIET, 1), Step::new(BUSY, 3)],
            expected: vec![(5, Signal::MotionStarted)],
            final_phase: Phase::Recording,
        },
        Scenario {
            name: "prestop_cancelled_by_motion".into(),
            hysteresis: params(3, 5, 3, 1.0),
            steps: vec![
                Step::new(BUSY, 3),
                Step::new(QUIET, 5),
                Step::new(BUSY, 3).every(Duration::from_millis(150)),
                Step::new(QUIET, 4).every(second * 10),
            ],
            expected: vec![(2, Signal::MotionStarted)],
            final_phase: Phase::Recording,
        },
        Scenario {
            name: "stop_after_full_delay".into(),
            hysteresis: params(3, 5, 3, 2.0),
            steps: vec![
                Step::new(BUSY, 3),
                Step::new(QUIET, 5),
                Step::new(QUIET, 3).every(second),
            ],
            expected: vec![(2, Signal::MotionStarted), (9, Signal::MotionStopped)],
            final_phase: Phase::Idle,
        },
        Scenario {
            name: "quiet_stream_never_starts".into(),
            hysteresis: HysteresisParams::default(),
            steps: vec![Step::new(QUIET, 200).every(Duration::from_millis(40))],
            expected: vec![],
            final_phase: Phase::Idle,
        },
        Scenario {
            name: "two_motion_events".into(),
            hysteresis: params(2, 2, 2, 0.5),
            steps: vec![
                Step::new(BUSY, 2),
                Step::new(QUIET, 2),
                Step::new(QUIET, 1).every(second),
                Step::new(BUSY, 2),
                Step::new(QUIET, 2),
                Step::new(QUIET, 1).every(second),
            ],
            expected: vec![
                (1, Signal::MotionStarted),
                (4, Signal::MotionStopped),
                (6, Signal::MotionStarted),
                (9, Signal::MotionStopped),
            ],
            final_phase: Phase::Idle,
        },
        Scenario {
            name: "single_spike_is_averaged_out".into(),
            hysteresis: HysteresisParams {
                frame_history: 10,
                start_frames: 1,
                ..HysteresisParams::default()
            },
            steps: vec![Step::new(0.0, 10), Step::new(0.015, 1), Step::new(0.0, 5)],
            expected: vec![],
            final_phase: Phase::Idle,
        },
        Scenario {
            name: "prestop_cancel_needs_consecutive_motion".into(),
            hysteresis: params(2, 2, 3, 5.0),
            steps: vec![
                Step::new(BUSY, 2),
                Step::new(QUIET, 2),
                Step::new(BUSY, 2),
                Step::new(QUIET, 1),
                Step::new(BUSY, 2),
                Step::new(QUIET, 1),
                Step::new(BUSY, 3),
            ],
            expected: vec![(1, Signal::MotionStarted)],
            final_phase: Phase::Recording,
        },
        Scenario {
            name: "zero_stop_delay_stops_on_next_quiet_frame".into(),
            hysteresis: params(1, 3, 1, 0.0),
            steps: vec![Step::new(BUSY, 1), Step::new(QUIET, 4)],
            expected: vec![(0, Signal::MotionStarted), (4, Signal::MotionStopped)],
            final_phase: Phase::Idle,
        },
    ]
}
