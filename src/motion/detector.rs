// Per-camera motion detector
//
// Each frame is diffed against the previous one, the delta is pushed into a
// moving-average window, and the average drives a three-phase hysteresis:
//
//   Idle --(start_frames busy)--> Recording --(prestop_low_full quiet)--> PreStop
//   PreStop --(cancel_prestop_frames busy)--> Recording
//   PreStop --(quiet for full_stop_delay since entry)--> Idle
//
// Frame counts gate every transition except the final stop, which is timed on
// a monotonic clock so it does not depend on the stream's frame rate.

use std::collections::TryReserveError;
use std::time::Instant;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::config::CameraProfile;

use super::delta;
use super::{Phase, Signal};

/// Source of monotonic time for the pre-stop timer
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Motion state for one camera
pub struct MotionDetector<'a, C: Clock = MonotonicClock> {
    camera: &'a CameraProfile,
    clock: C,
    pixels: usize,
    /// Mask of the previous frame (all zero before the first frame)
    prev_mask: Vec<u8>,
    /// Mask of the frame being processed
    curr_mask: Vec<u8>,
    /// Most recent deltas, oldest evicted first
    history: HeapRb<f64>,
    motion_active: bool,
    hi_run: u32,
    lo_run: u32,
    /// When pre-stop was entered; Some only while in PreStop
    prestop_at: Option<Instant>,
    last_delta: f64,
    last_avg: f64,
    frames_seen: u64,
}

impl<'a, C: Clock> MotionDetector<'a, C> {
    /// Allocate the frame buffers and history for a camera.
    ///
    /// Allocation failure is returned instead of aborting so that only the
    /// affected camera's worker fails.
    pub fn new(camera: &'a CameraProfile, clock: C) -> Result<Self, TryReserveError> {
        let pixels = camera.pixels();

        Ok(Self {
            camera,
            clock,
            pixels,
            prev_mask: zeroed(pixels)?,
            curr_mask: zeroed(pixels)?,
            history: HeapRb::try_new(camera.hysteresis.frame_history)?,
            motion_active: false,
            hi_run: 0,
            lo_run: 0,
            prestop_at: None,
            last_delta: 0.0,
            last_avg: 0.0,
            frames_seen: 0,
        })
    }

    /// Feed one frame and advance the hysteresis.
    ///
    /// # Panics
    /// If `frame` is not exactly `width * height` bytes. A wrong-sized frame
    /// would silently corrupt every following delta.
    pub fn feed(&mut self, frame: &[u8]) -> Signal {
        assert_eq!(
            frame.len(),
            self.pixels,
            "camera {}: frame is {} bytes, expected {}x{}",
            self.camera.name,
            frame.len(),
            self.camera.width,
            self.camera.height,
        );

        self.curr_mask.copy_from_slice(frame);
        let delta = delta::mean_abs_delta(&self.curr_mask, &self.prev_mask);
        self.prev_mask.copy_from_slice(&self.curr_mask);

        self.history.push_overwrite(delta);
        let avg = self.history.iter().sum::<f64>() / self.history.occupied_len() as f64;

        self.last_delta = delta;
        self.last_avg = avg;
        self.frames_seen += 1;

        self.advance(avg)
    }

    fn advance(&mut self, avg: f64) -> Signal {
        let params = &self.camera.hysteresis;
        let busy = avg > params.active_threshold;

        if !self.motion_active {
            if busy {
                self.hi_run += 1;
            } else {
                self.hi_run = 0;
            }

            if self.hi_run >= params.start_frames {
                self.motion_active = true;
                self.hi_run = 0;
                self.lo_run = 0;
                self.prestop_at = None;
                log::info!("[{}] Motion started (avg {:.5})", self.camera.name, avg);
                return Signal::MotionStarted;
            }
            return Signal::NoChange;
        }

        let Some(prestop_at) = self.prestop_at else {
            if busy {
                self.lo_run = 0;
            } else {
                self.lo_run += 1;
                if self.lo_run >= params.prestop_low_full {
                    self.prestop_at = Some(self.clock.now());
                    log::debug!(
                        "[{}] Pre-stop after {} quiet frames",
                        self.camera.name,
                        self.lo_run
                    );
                }
            }
            return Signal::NoChange;
        };

        // Cancellation is checked before the stop delay
        if busy {
            self.hi_run += 1;
            if self.hi_run >= params.cancel_prestop_frames {
                self.prestop_at = None;
                self.hi_run = 0;
                self.lo_run = 0;
                log::debug!("[{}] Pre-stop cancelled, motion resumed", self.camera.name);
            }
            return Signal::NoChange;
        }

        // Busy frames must be consecutive to cancel
        self.hi_run = 0;

        if self.clock.now().saturating_duration_since(prestop_at) >= params.full_stop_delay() {
            self.motion_active = false;
            self.prestop_at = None;
            self.lo_run = 0;
            log::info!("[{}] Motion stopped", self.camera.name);
            return Signal::MotionStopped;
        }

        Signal::NoChange
    }

    pub fn phase(&self) -> Phase {
        match (self.motion_active, self.prestop_at) {
            (false, _) => Phase::Idle,
            (true, None) => Phase::Recording,
            (true, Some(_)) => Phase::PreStop,
        }
    }

    pub fn is_motion_active(&self) -> bool {
        self.motion_active
    }

    /// Delta of the most recent frame
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// Moving average after the most recent frame
    pub fn last_avg(&self) -> f64 {
        self.last_avg
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Bytes expected per frame
    pub fn frame_len(&self) -> usize {
        self.pixels
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::HysteresisParams;
    use crate::test_harness::{camera_with, ManualClock, SyntheticStream};

    const BUSY: f64 = 0.01;
    const QUIET: f64 = 0.001;

    /// Camera with a one-frame window so the average equals the frame delta
    fn camera(start: u32, prestop: u32, cancel: u32, delay: f64) -> CameraProfile {
        camera_with(HysteresisParams {
            frame_history: 1,
            active_threshold: 0.002,
            start_frames: start,
            prestop_low_full: prestop,
            cancel_prestop_frames: cancel,
            full_stop_delay: delay,
            ..HysteresisParams::default()
        })
    }

    fn feed_n(
        detector: &mut MotionDetector<'_, ManualClock>,
        stream: &mut SyntheticStream,
        delta: f64,
        n: usize,
    ) -> Vec<Signal> {
        (0..n).map(|_| detector.feed(&stream.next_with_delta(delta))).collect()
    }

    fn count(signals: &[Signal], wanted: Signal) -> usize {
        signals.iter().filter(|s| **s == wanted).count()
    }

    #[test]
    fn oversized_history_is_an_error() {
        let cam = camera_with(HysteresisParams {
            frame_history: usize::MAX / 4,
            ..HysteresisParams::default()
        });
        assert!(MotionDetector::new(&cam, ManualClock::new()).is_err());
    }

    #[test]
    fn scenario_a_interrupted_run_resets() {
        let cam = camera(3, 5, 3, 1.0);
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        assert_eq!(feed_n(&mut det, &mut stream, BUSY, 2), vec![Signal::NoChange; 2]);
        assert_eq!(feed_n(&mut det, &mut stream, QUIET, 1), vec![Signal::NoChange]);
        let signals = feed_n(&mut det, &mut stream, BUSY, 3);
        assert_eq!(
            signals,
            vec![Signal::NoChange, Signal::NoChange, Signal::MotionStarted]
        );
        assert!(det.is_motion_active());
        assert_eq!(det.phase(), Phase::Recording);
    }

    #[test]
    fn start_needs_consecutive_busy_frames() {
        let start = 4;
        let cam = camera(start, 5, 3, 1.0);
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        let mut signals = feed_n(&mut det, &mut stream, BUSY, start as usize - 1);
        signals.extend(feed_n(&mut det, &mut stream, QUIET, 1));
        signals.extend(feed_n(&mut det, &mut stream, BUSY, start as usize - 1));
        assert_eq!(count(&signals, Signal::MotionStarted), 0);
        assert_eq!(det.phase(), Phase::Idle);

        assert_eq!(feed_n(&mut det, &mut stream, BUSY, 1), vec![Signal::MotionStarted]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let cam = camera(1, 5, 3, 1.0);
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        // avg == active_threshold counts as quiet
        assert_eq!(feed_n(&mut det, &mut stream, 0.002, 3), vec![Signal::NoChange; 3]);
        assert_eq!(feed_n(&mut det, &mut stream, 0.003, 1), vec![Signal::MotionStarted]);
    }

    #[test]
    fn scenario_b_prestop_cancelled() {
        let cam = camera(3, 5, 3, 1.0);
        let clock = ManualClock::new();
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, clock.clone()).unwrap();

        feed_n(&mut det, &mut stream, BUSY, 3);
        assert_eq!(det.phase(), Phase::Recording);

        let quiet = feed_n(&mut det, &mut stream, QUIET, 4);
        assert_eq!(det.phase(), Phase::Recording);
        assert_eq!(count(&quiet, Signal::NoChange), 4);
        feed_n(&mut det, &mut stream, QUIET, 1);
        assert_eq!(det.phase(), Phase::PreStop);

        clock.advance(Duration::from_millis(400));
        let busy = feed_n(&mut det, &mut stream, BUSY, 3);
        assert_eq!(busy, vec![Signal::NoChange; 3]);
        assert_eq!(det.phase(), Phase::Recording);

        // The quiet run starts from zero again
        clock.advance(Duration::from_secs(10));
        let quiet = feed_n(&mut det, &mut stream, QUIET, 4);
        assert_eq!(count(&quiet, Signal::MotionStopped), 0);
        assert_eq!(det.phase(), Phase::Recording);
        feed_n(&mut det, &mut stream, QUIET, 1);
        assert_eq!(det.phase(), Phase::PreStop);
        assert!(det.is_motion_active());
    }

    #[test]
    fn scenario_c_stop_after_delay() {
        let cam = camera(3, 5, 3, 2.0);
        let clock = ManualClock::new();
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, clock.clone()).unwrap();

        feed_n(&mut det, &mut stream, BUSY, 3);
        feed_n(&mut det, &mut stream, QUIET, 5);
        assert_eq!(det.phase(), Phase::PreStop);

        clock.advance(Duration::from_millis(1999));
        assert_eq!(feed_n(&mut det, &mut stream, QUIET, 10), vec![Signal::NoChange; 10]);

        clock.advance(Duration::from_millis(1));
        let signals = feed_n(&mut det, &mut stream, QUIET, 5);
        assert_eq!(signals[0], Signal::MotionStopped);
        assert_eq!(count(&signals, Signal::MotionStopped), 1);
        assert!(!det.is_motion_active());
        assert_eq!(det.phase(), Phase::Idle);
    }

    #[test]
    fn prestop_cancel_needs_consecutive_busy_frames() {
        let cam = camera(2, 2, 3, 5.0);
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        feed_n(&mut det, &mut stream, BUSY, 2);
        feed_n(&mut det, &mut stream, QUIET, 2);
        assert_eq!(det.phase(), Phase::PreStop);

        feed_n(&mut det, &mut stream, BUSY, 2);
        feed_n(&mut det, &mut stream, QUIET, 1);
        feed_n(&mut det, &mut stream, BUSY, 2);
        assert_eq!(det.phase(), Phase::PreStop);

        feed_n(&mut det, &mut stream, BUSY, 1);
        assert_eq!(det.phase(), Phase::Recording);
    }

    #[test]
    fn cancel_wins_over_elapsed_delay() {
        let cam = camera(1, 1, 1, 1.0);
        let clock = ManualClock::new();
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, clock.clone()).unwrap();

        feed_n(&mut det, &mut stream, BUSY, 1);
        feed_n(&mut det, &mut stream, QUIET, 1);
        assert_eq!(det.phase(), Phase::PreStop);

        clock.advance(Duration::from_secs(5));
        assert_eq!(feed_n(&mut det, &mut stream, BUSY, 1), vec![Signal::NoChange]);
        assert_eq!(det.phase(), Phase::Recording);
    }

    #[test]
    fn busy_frame_in_recording_resets_quiet_run() {
        let cam = camera(1, 3, 1, 1.0);
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        feed_n(&mut det, &mut stream, BUSY, 1);
        feed_n(&mut det, &mut stream, QUIET, 2);
        feed_n(&mut det, &mut stream, BUSY, 1);
        feed_n(&mut det, &mut stream, QUIET, 2);
        assert_eq!(det.phase(), Phase::Recording);
        feed_n(&mut det, &mut stream, QUIET, 1);
        assert_eq!(det.phase(), Phase::PreStop);
    }

    #[test]
    fn motion_active_tracks_last_signal() {
        let cam = camera(2, 3, 2, 0.5);
        let clock = ManualClock::new();
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, clock.clone()).unwrap();

        // Mixed sequence that goes through several start/stop cycles
        let plan: &[(f64, usize, u64)] = &[
            (BUSY, 3, 0),
            (QUIET, 4, 100),
            (BUSY, 1, 0),
            (QUIET, 6, 200),
            (BUSY, 5, 0),
            (QUIET, 8, 300),
            (QUIET, 2, 0),
        ];

        let mut last = None;
        let mut starts = 0;
        for &(delta, n, step_ms) in plan {
            for _ in 0..n {
                clock.advance(Duration::from_millis(step_ms));
                let signal = det.feed(&stream.next_with_delta(delta));
                if signal != Signal::NoChange {
                    last = Some(signal);
                }
                if signal == Signal::MotionStarted {
                    starts += 1;
                }
                assert_eq!(det.is_motion_active(), last == Some(Signal::MotionStarted));
            }
        }
        assert!(starts >= 2);
    }

    #[test]
    fn moving_average_uses_partial_window_at_startup() {
        let cam = camera_with(HysteresisParams {
            frame_history: 4,
            ..HysteresisParams::default()
        });
        let mut stream = SyntheticStream::for_camera(&cam);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();

        det.feed(&stream.next_with_delta(0.1));
        assert!((det.last_avg() - 0.1).abs() < 1e-9);
        det.feed(&stream.next_with_delta(0.3));
        assert!((det.last_avg() - 0.2).abs() < 1e-9);
        det.feed(&stream.next_with_delta(0.0));
        det.feed(&stream.next_with_delta(0.0));
        assert!((det.last_avg() - 0.1).abs() < 1e-9);

        // Window full: 0.1 is evicted
        det.feed(&stream.next_with_delta(0.0));
        assert!((det.last_avg() - 0.075).abs() < 1e-9);
        assert_eq!(det.frames_seen(), 5);
        assert!((det.last_delta() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn first_frame_is_compared_against_black() {
        let cam = camera(1, 1, 1, 1.0);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();
        let white = vec![255u8; cam.pixels()];
        assert_eq!(det.feed(&white), Signal::MotionStarted);
        assert_eq!(det.last_delta(), 1.0);
    }

    #[test]
    #[should_panic(expected = "expected")]
    fn wrong_frame_size_panics() {
        let cam = camera(1, 1, 1, 1.0);
        let mut det = MotionDetector::new(&cam, ManualClock::new()).unwrap();
        det.feed(&[0u8; 3]);
    }
}
