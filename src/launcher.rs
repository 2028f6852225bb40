//! Launching and stopping external tools
//!
//! Command lines are run through `sh -c` so the templates in
//! [`crate::commands`] can use quoting and globs. The encoder is started
//! detached and stopped through its tracked pid. Matching command lines by
//! name, the way `pkill -f` would, is only the fallback when that pid is gone.

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

use crate::constants::{encoder, paths};

pub trait Launcher {
    /// Start `command` in `working_dir` and return its pid without waiting
    fn spawn_detached(&mut self, command: &str, working_dir: &Path, env: &[(&str, &str)]) -> Result<u32>;

    /// Run `command` in `working_dir` and fail unless it exits successfully
    fn run_to_completion(&mut self, command: &str, working_dir: &Path) -> Result<()>;

    /// Send SIGTERM to a child started by [`Launcher::spawn_detached`] and wait
    /// for it. Returns false when `pid` is not a running child.
    fn terminate(&mut self, pid: u32) -> Result<bool>;

    /// Terminate every process whose command line mentions `name`.
    /// Returns how many were signalled.
    fn kill_by_name(&mut self, name: &str) -> Result<usize>;
}

/// Launcher backed by real processes
#[derive(Debug, Default)]
pub struct SystemLauncher {
    /// Detached children, reaped after a kill
    children: Vec<Child>,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    fn shell(command: &str, working_dir: &Path) -> Command {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(format!("exec {command}")).current_dir(working_dir);
        shell
    }

    fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = child.id(), status = %status, "Reaped child process");
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(pid = child.id(), error = %e, "Failed to poll child process");
                false
            }
        });
    }
}

impl Launcher for SystemLauncher {
    fn spawn_detached(&mut self, command: &str, working_dir: &Path, env: &[(&str, &str)]) -> Result<u32> {
        let child = Self::shell(command, working_dir)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .spawn()
            .context(format!("Failed to spawn '{}'", command))?;
        let pid = child.id();
        info!(pid, command = %command, dir = %working_dir.display(), "Spawned detached process");
        self.children.push(child);
        Ok(pid)
    }

    fn run_to_completion(&mut self, command: &str, working_dir: &Path) -> Result<()> {
        info!(command = %command, dir = %working_dir.display(), "Running command");
        let status = Self::shell(command, working_dir)
            .stdin(Stdio::null())
            .status()
            .context(format!("Failed to run '{}'", command))?;
        if !status.success() {
            bail!("'{}' exited with {}", command, status);
        }
        Ok(())
    }

    fn terminate(&mut self, pid: u32) -> Result<bool> {
        self.reap();
        let Some(index) = self.children.iter().position(|child| child.id() == pid) else {
            return Ok(false);
        };
        let raw_pid = i32::try_from(pid).context(format!("pid {} out of range", pid))?;
        kill(Pid::from_raw(raw_pid), Signal::SIGTERM).context(format!("Failed to signal pid {}", pid))?;
        let mut child = self.children.remove(index);
        let status = child.wait().context(format!("Failed to wait for pid {}", pid))?;
        info!(pid, status = %status, "Terminated child process");
        Ok(true)
    }

    fn kill_by_name(&mut self, name: &str) -> Result<usize> {
        let own_pid = std::process::id();
        let mut signalled = 0;
        for entry in fs::read_dir(paths::PROC)
            .context(format!("Failed to read {}", paths::PROC))?
        {
            let Ok(entry) = entry else { continue };
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if pid == own_pid {
                continue;
            }
            // processes can exit between listing and reading
            let Ok(cmdline) = fs::read(entry.path().join("cmdline")) else { continue };
            if !cmdline_matches(&cmdline, name) {
                continue;
            }
            let Ok(raw_pid) = i32::try_from(pid) else { continue };
            match kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
                Ok(()) => {
                    info!(pid, name = %name, "Sent SIGTERM");
                    signalled += 1;
                }
                Err(e) => warn!(pid, name = %name, error = %e, "Failed to signal process"),
            }
        }
        self.reap();
        Ok(signalled)
    }
}

/// Program name of an encoder setting: `/usr/bin/ffmpeg -v 0` gives `ffmpeg`
pub fn program_name(encoder: &str) -> &str {
    let program = encoder.split_whitespace().next().unwrap_or_default();
    program.rsplit('/').next().unwrap_or(program)
}

/// The one encoder process of a session
#[derive(Debug)]
pub struct Recorder {
    program: String,
    pid: Option<u32>,
}

impl Recorder {
    pub fn new(encoder: &str) -> Self {
        Self {
            program: program_name(encoder).to_string(),
            pid: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.pid.is_some()
    }

    /// Create `dir` (mode 0700) and launch `command` in it with encoder logging on
    pub fn start(&mut self, launcher: &mut dyn Launcher, command: &str, dir: &Path) -> Result<u32> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .context(format!("Failed to create recording directory {}", dir.display()))?;
        let pid = launcher.spawn_detached(command, dir, &[(encoder::REPORT_ENV, encoder::REPORT_VALUE)])?;
        self.pid = Some(pid);
        Ok(pid)
    }

    /// Stop the encoder started by [`Recorder::start`]. When it is no longer a
    /// child, processes mentioning the encoder program are signalled instead.
    pub fn stop(&mut self, launcher: &mut dyn Launcher) -> Result<usize> {
        let Some(pid) = self.pid.take() else {
            return Ok(0);
        };
        if launcher.terminate(pid)? {
            return Ok(1);
        }
        warn!(pid, program = %self.program, "Encoder is not a tracked child, matching by name");
        launcher.kill_by_name(&self.program)
    }
}

/// Whether a NUL-separated `/proc/<pid>/cmdline` mentions `name`
pub fn cmdline_matches(cmdline: &[u8], name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let joined: Vec<u8> = cmdline
        .iter()
        .map(|&b| if b == 0 { b' ' } else { b })
        .collect();
    String::from_utf8_lossy(&joined).contains(name)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Launcher that only records what it was asked to do
    #[derive(Debug, Default)]
    pub struct RecordingLauncher {
        pub spawned: Vec<(String, PathBuf)>,
        pub env: Vec<(String, String)>,
        pub ran: Vec<String>,
        pub terminated: Vec<u32>,
        pub killed: Vec<String>,
        pub fail_runs: bool,
        /// The spawned child exited on its own before being stopped
        pub child_exited: bool,
    }

    impl Launcher for RecordingLauncher {
        fn spawn_detached(&mut self, command: &str, working_dir: &Path, env: &[(&str, &str)]) -> Result<u32> {
            self.spawned.push((command.to_string(), working_dir.to_path_buf()));
            self.env.extend(env.iter().map(|(k, v)| (k.to_string(), v.to_string())));
            Ok(4242)
        }

        fn run_to_completion(&mut self, command: &str, _working_dir: &Path) -> Result<()> {
            self.ran.push(command.to_string());
            if self.fail_runs {
                bail!("forced failure");
            }
            Ok(())
        }

        fn terminate(&mut self, pid: u32) -> Result<bool> {
            self.terminated.push(pid);
            Ok(!self.child_exited)
        }

        fn kill_by_name(&mut self, name: &str) -> Result<usize> {
            self.killed.push(name.to_string());
            Ok(1)
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("regioncast-launcher-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name("/usr/bin/ffmpeg"), "ffmpeg");
        assert_eq!(program_name("/opt/enc/my-encoder -hide_banner"), "my-encoder");
        assert_eq!(program_name("ffmpeg"), "ffmpeg");
        assert_eq!(program_name(""), "");
    }

    #[test]
    fn test_recorder_starts_in_private_dir_with_report_env() {
        use std::os::unix::fs::PermissionsExt;
        let dir = scratch_dir("start").join("regioncast");
        let mut launcher = RecordingLauncher::default();
        let mut recorder = Recorder::new("/usr/bin/ffmpeg");

        let pid = recorder.start(&mut launcher, "ffmpeg -f x11grab", &dir).unwrap();
        assert_eq!(pid, 4242);
        assert!(recorder.is_running());
        assert_eq!(launcher.spawned, vec![("ffmpeg -f x11grab".to_string(), dir.clone())]);
        assert_eq!(
            launcher.env,
            vec![("FFREPORT".to_string(), "file=ffcom.log:level=32".to_string())]
        );
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        let _ = fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn test_recorder_stops_tracked_pid_only() {
        let dir = scratch_dir("stop");
        let mut launcher = RecordingLauncher::default();
        let mut recorder = Recorder::new("/usr/bin/ffmpeg");
        recorder.start(&mut launcher, "ffmpeg", &dir).unwrap();

        assert_eq!(recorder.stop(&mut launcher).unwrap(), 1);
        assert_eq!(launcher.terminated, vec![4242]);
        assert!(launcher.killed.is_empty());
        assert!(!recorder.is_running());

        // nothing left to stop
        assert_eq!(recorder.stop(&mut launcher).unwrap(), 0);
        assert_eq!(launcher.terminated.len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_recorder_falls_back_to_encoder_program_name() {
        let dir = scratch_dir("fallback");
        let mut launcher = RecordingLauncher { child_exited: true, ..Default::default() };
        let mut recorder = Recorder::new("/opt/enc/my-encoder -hide_banner");
        recorder.start(&mut launcher, "my-encoder", &dir).unwrap();

        recorder.stop(&mut launcher).unwrap();
        assert_eq!(launcher.killed, vec!["my-encoder".to_string()]);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_terminate_tracked_child() {
        let mut launcher = SystemLauncher::new();
        let dir = std::env::temp_dir();
        let pid = launcher.spawn_detached("sleep 30", &dir, &[]).unwrap();
        assert!(launcher.terminate(pid).unwrap());
        assert!(!launcher.terminate(pid).unwrap());
        assert!(!launcher.terminate(1).unwrap());
    }

    #[test]
    fn test_cmdline_matches_any_argument() {
        let cmdline = b"/usr/bin/ffmpeg\0-f\0x11grab\0-s\0640x360\0";
        assert!(cmdline_matches(cmdline, "ffmpeg"));
        assert!(cmdline_matches(cmdline, "x11grab -s"));
        assert!(!cmdline_matches(cmdline, "convert"));
    }

    #[test]
    fn test_cmdline_matches_ignores_empty_pattern() {
        assert!(!cmdline_matches(b"sh\0-c\0", ""));
        assert!(!cmdline_matches(b"", "ffmpeg"));
    }

    #[test]
    fn test_run_to_completion_reports_failure() {
        let mut launcher = SystemLauncher::new();
        let dir = std::env::temp_dir();
        assert!(launcher.run_to_completion("true", &dir).is_ok());
        assert!(launcher.run_to_completion("false", &dir).is_err());
    }
}
