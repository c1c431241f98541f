// Motion detection: frame deltas, moving average and start/stop hysteresis

pub mod delta;
pub mod detector;
pub mod shader;

pub use detector::{Clock, MonotonicClock, MotionDetector};

/// Outcome of feeding one frame to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing externally visible changed
    NoChange,
    /// Sustained motion; a recording should start
    MotionStarted,
    /// Sustained quiet past the stop delay; the recording should stop
    MotionStopped,
}

/// Hysteresis phase of a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No motion, counting busy frames
    Idle,
    /// Motion active, counting quiet frames
    Recording,
    /// Motion active, waiting out the stop delay
    PreStop,
}
