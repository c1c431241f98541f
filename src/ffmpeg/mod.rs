//! ffmpeg subprocesses
//!
//! * `commands`: argument builder for the motion source and the recorder
//! * `process`: owned child processes with SIGTERM/SIGKILL stop semantics

pub mod commands;
pub mod process;

pub use commands::{motion_source_args, recorder_args, FfmpegCommandBuilder, FfmpegOutput};
pub use process::{ManagedProcess, ProcessError, StopOutcome};
