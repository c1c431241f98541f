// Shell script standing in for ffmpeg
//
// Invoked with frame-source arguments (they contain "rawvideo") it writes
// alternating white and black frames, then repeats black frames, then sleeps.
// Invoked with anything else it behaves like a recorder: it appends its pid to
// a file and runs until SIGTERM.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

const SCRIPT_NAME: &str = "fake-ffmpeg.sh";
const PID_FILE: &str = "recorders.pid";

#[derive(Debug, Clone)]
pub struct FakeFfmpeg {
    /// Bytes per frame
    pub frame_len: usize,
    /// White/black frame pairs; every one of these frames has delta 1.0
    pub busy_pairs: u32,
    /// Black frames after the busy part; delta 0.0
    pub quiet_frames: u32,
    /// Seconds the source stays open after the last frame
    pub hold_secs: f64,
}

impl FakeFfmpeg {
    /// Write the script into `dir` and return its path
    pub fn install(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(SCRIPT_NAME);
        let pid_file = dir.join(PID_FILE);
        std::fs::write(&path, self.script(&pid_file))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    fn script(&self, pid_file: &Path) -> String {
        format!(
            r#"#!/bin/sh
case "$*" in
  *rawvideo*)
    n=0
    while [ "$n" -lt {busy} ]; do
      head -c {len} /dev/zero | tr '\000' '\377'
      head -c {len} /dev/zero
      n=$((n + 1))
    done
    n=0
    while [ "$n" -lt {quiet} ]; do
      head -c {len} /dev/zero
      n=$((n + 1))
    done
    exec sleep {hold}
    ;;
  *)
    echo $$ >> '{pid_file}'
    trap 'exit 0' TERM
    while :; do sleep 0.05; done
    ;;
esac
"#,
            busy = self.busy_pairs,
            quiet = self.quiet_frames,
            len = self.frame_len,
            hold = self.hold_secs,
            pid_file = pid_file.display(),
        )
    }
}

/// Pids of every recorder the script has started in `dir`
pub fn recorder_pids(dir: &Path) -> Vec<i32> {
    std::fs::read_to_string(dir.join(PID_FILE))
        .map(|s| s.lines().filter_map(|l| l.trim().parse().ok()).collect())
        .unwrap_or_default()
}

pub fn is_alive(pid: i32) -> bool {
    !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}
