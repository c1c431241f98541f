// Child process ownership
//
// Every ffmpeg instance is wrapped in a ManagedProcess. Stopping sends SIGTERM
// so ffmpeg can finalize its container, waits for the grace period, then kills.
// A process that is dropped while still running is stopped the same way, so an
// error path or a panic never leaves an orphan behind.

use std::io;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {label} ({program}): {source}")]
    Spawn {
        label: String,
        program: String,
        source: io::Error,
    },

    #[error("failed to signal {label}: {source}")]
    Signal { label: String, source: io::Error },

    #[error("failed to wait for {label}: {source}")]
    Wait { label: String, source: io::Error },

    #[error("{0} has no stdout pipe")]
    MissingStdout(String),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process had already exited
    Exited(ExitStatus),
    /// The process exited after SIGTERM
    Terminated(ExitStatus),
    /// The grace period ran out and the process was killed
    Killed(ExitStatus),
}

impl StopOutcome {
    pub fn status(&self) -> ExitStatus {
        match self {
            StopOutcome::Exited(s) | StopOutcome::Terminated(s) | StopOutcome::Killed(s) => *s,
        }
    }
}

/// A spawned child that is always reaped
#[derive(Debug)]
pub struct ManagedProcess {
    label: String,
    child: Child,
    exited: Option<ExitStatus>,
    stop_timeout: Duration,
}

impl ManagedProcess {
    /// Spawn `program` with `args`. Stdin and stderr are discarded; stdout is
    /// piped when `capture_stdout` is set.
    pub fn spawn(
        label: impl Into<String>,
        program: &str,
        args: &[String],
        capture_stdout: bool,
    ) -> Result<Self> {
        let label = label.into();
        let stdout = if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                label: label.clone(),
                program: program.to_string(),
                source,
            })?;

        log::debug!("[{}] spawned pid {}", label, child.id());

        Ok(Self {
            label,
            child,
            exited: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        })
    }

    /// Grace period used when the process is stopped on drop
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::MissingStdout(self.label.clone()))
    }

    /// Reap the child if it has exited, without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exited {
            return Ok(Some(status));
        }
        let status = self.child.try_wait().map_err(|source| ProcessError::Wait {
            label: self.label.clone(),
            source,
        })?;
        self.exited = status;
        Ok(status)
    }

    /// Ask the process to exit
    #[cfg(unix)]
    pub fn terminate(&mut self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if self.exited.is_some() {
            return Ok(());
        }
        match kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM) {
            // Already gone but not reaped yet
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ProcessError::Signal {
                label: self.label.clone(),
                source: io::Error::from(errno),
            }),
        }
    }

    /// Ask the process to exit
    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> Result<()> {
        self.kill()
    }

    pub fn kill(&mut self) -> Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(source) => Err(ProcessError::Signal {
                label: self.label.clone(),
                source,
            }),
        }
    }

    /// Block until the process exits
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exited {
            return Ok(status);
        }
        let status = self.child.wait().map_err(|source| ProcessError::Wait {
            label: self.label.clone(),
            source,
        })?;
        self.exited = Some(status);
        Ok(status)
    }

    /// Poll for exit until `timeout` elapses
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
    pub fn stop(&mut self, grace: Duration) -> Result<StopOutcome> {
        if let Some(status) = self.try_wait()? {
            return Ok(StopOutcome::Exited(status));
        }

        self.terminate()?;
        if let Some(status) = self.wait_timeout(grace)? {
            log::debug!("[{}] exited after SIGTERM ({})", self.label, status);
            return Ok(StopOutcome::Terminated(status));
        }

        log::warn!(
            "[{}] did not exit within {:.1}s, killing",
            self.label,
            grace.as_secs_f64()
        );
        self.kill()?;
        Ok(StopOutcome::Killed(self.wait()?))
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if self.exited.is_some() {
            return;
        }
        let grace = self.stop_timeout;
        if let Err(e) = self.stop(grace) {
            log::error!("[{}] failed to stop on drop: {}", self.label, e);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_stdout() {
        let mut proc = ManagedProcess::spawn("echo", "sh", &sh("printf hello"), true).unwrap();
        let mut out = String::new();
        proc.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
        assert!(proc.wait().unwrap().success());
        assert!(matches!(proc.take_stdout(), Err(ProcessError::MissingStdout(_))));
    }

    #[test]
    fn spawn_failure_names_program() {
        let err = ManagedProcess::spawn("rec", "/nonexistent/ffmpeg", &[], false).unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/ffmpeg"));
    }

    #[test]
    fn stop_terminates_cooperative_process() {
        let mut proc = ManagedProcess::spawn("sleeper", "sleep", &["30".to_string()], false).unwrap();
        let outcome = proc.stop(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, StopOutcome::Terminated(_)));
        assert!(!outcome.status().success());
    }

    #[test]
    fn stop_kills_process_ignoring_sigterm() {
        let mut proc = ManagedProcess::spawn(
            "stubborn",
            "sh",
            &sh("trap '' TERM; while true; do sleep 0.05; done"),
            false,
        )
        .unwrap();
        // Give the shell time to install the trap
        thread::sleep(Duration::from_millis(200));
        let outcome = proc.stop(Duration::from_millis(300)).unwrap();
        assert!(matches!(outcome, StopOutcome::Killed(_)));
    }

    #[test]
    fn stop_after_exit_reports_exit() {
        let mut proc = ManagedProcess::spawn("true", "true", &[], false).unwrap();
        proc.wait().unwrap();
        let outcome = proc.stop(Duration::from_secs(1)).unwrap();
        assert!(matches!(outcome, StopOutcome::Exited(_)));
        // Terminating a reaped process is a no-op
        proc.terminate().unwrap();
    }

    #[test]
    fn drop_stops_running_child() {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let proc = ManagedProcess::spawn("sleeper", "sleep", &["30".to_string()], false)
            .unwrap()
            .with_stop_timeout(Duration::from_secs(2));
        let pid = Pid::from_raw(proc.id() as i32);
        drop(proc);
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }
}
