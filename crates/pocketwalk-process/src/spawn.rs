//! Subprocess spawn, combined-stream capture, and process-group teardown.
//!
//! The original implementation allocates a PTY so a tool's colored output
//! survives being piped. Pocketwalk's core scope explicitly leaves terminal
//! coloring out, so this spawns with plain piped stdout/stderr instead and
//! combines both streams into one buffer in arrival order, mirroring
//! `csa_process::wait_and_capture`'s byte-level read loop. An optional idle
//! timeout, modeled on `csa_process::wait_and_capture_with_idle_timeout`,
//! kills a process that has produced no output on either stream for too
//! long; it is off by default (`idle_timeout` is `None`) so a tool that
//! doesn't opt in behaves exactly as before.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Exit code recorded when a tool is killed for producing no output within
/// its configured idle timeout, distinct from the 130 used for a
/// cancellation-driven kill.
pub const IDLE_TIMEOUT_EXIT_CODE: i32 = 137;

pub struct RunningProcess {
    child: tokio::process::Child,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Spawn `argv[0]` with `argv[1..]` as arguments, isolated in its own process
/// group via `setsid`, with stdout and stderr piped.
pub fn spawn(argv: &[String]) -> Result<RunningProcess> {
    let (program, args) = argv
        .split_first()
        .context("tool argv must have at least the executable name")?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let child = cmd.spawn().context("failed to spawn tool process")?;
    Ok(RunningProcess { child })
}

/// Read a spawned process's stdout and stderr to completion, combining both
/// streams into one buffer in arrival order, then wait for exit.
///
/// When `idle_timeout` is `Some`, the process group is killed if neither
/// stream produces a byte within that window; the returned exit code is
/// then [`IDLE_TIMEOUT_EXIT_CODE`] rather than whatever the kill signal
/// would otherwise report.
pub async fn capture(
    process: RunningProcess,
    idle_timeout: Option<Duration>,
) -> Result<(i32, Vec<u8>)> {
    let mut child = process.child;
    let pid = child.id();
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;

    let mut stdout_reader = stdout;
    let mut stderr_reader = stderr;
    let mut output = Vec::new();
    let mut stdout_buf = [0u8; 4096];
    let mut stderr_buf = [0u8; 4096];
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut last_activity = tokio::time::Instant::now();

    while !stdout_done || !stderr_done {
        let idle_sleep = async {
            match idle_timeout {
                Some(timeout) => tokio::time::sleep_until(last_activity + timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = stdout_reader.read(&mut stdout_buf), if !stdout_done => {
                match result {
                    Ok(0) => stdout_done = true,
                    Ok(n) => {
                        output.extend_from_slice(&stdout_buf[..n]);
                        let mut out = std::io::stdout();
                        let _ = out.write_all(&stdout_buf[..n]);
                        let _ = out.flush();
                        last_activity = tokio::time::Instant::now();
                    }
                    Err(_) => stdout_done = true,
                }
            }
            result = stderr_reader.read(&mut stderr_buf), if !stderr_done => {
                match result {
                    Ok(0) => stderr_done = true,
                    Ok(n) => {
                        output.extend_from_slice(&stderr_buf[..n]);
                        let mut out = std::io::stdout();
                        let _ = out.write_all(&stderr_buf[..n]);
                        let _ = out.flush();
                        last_activity = tokio::time::Instant::now();
                    }
                    Err(_) => stderr_done = true,
                }
            }
            _ = idle_sleep => {
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                let _ = child.wait().await;
                return Ok((IDLE_TIMEOUT_EXIT_CODE, output));
            }
        }
    }

    let status = child.wait().await.context("failed to wait for tool process")?;
    let exit_code = status.code().unwrap_or(1);
    Ok((exit_code, output))
}

/// Terminate a process group: SIGTERM, wait up to 3s, escalate to SIGKILL,
/// wait up to 3s more. Returns `false` if the group is still alive after
/// both signals.
pub async fn kill_process_group(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: kill() is async-signal-safe; negative PID targets the group.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
        if wait_for_group_exit(pid, Duration::from_secs(3)).await {
            return true;
        }
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
        wait_for_group_exit(pid, Duration::from_secs(3)).await
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
async fn wait_for_group_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        // kill(pid, 0) probes for existence without sending a signal.
        let alive = unsafe { libc::kill(pid as i32, 0) == 0 };
        if !alive {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Check whether `executable` resolves on `PATH`.
pub fn is_executable_available(executable: &str) -> bool {
    which::which(executable).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_without_idle_timeout_returns_combined_output_and_exit_code() {
        let process = spawn(&[
            "sh".to_string(),
            "-c".to_string(),
            "echo out; echo err 1>&2; exit 3".to_string(),
        ])
        .unwrap();
        let (exit_code, output) = capture(process, None).await.unwrap();
        assert_eq!(exit_code, 3);
        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn capture_kills_silent_process_after_idle_timeout() {
        let process = spawn(&["sleep".to_string(), "5".to_string()]).unwrap();
        let (exit_code, _) = capture(process, Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(exit_code, IDLE_TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn capture_with_idle_timeout_does_not_kill_an_active_process() {
        let process = spawn(&[
            "sh".to_string(),
            "-c".to_string(),
            "echo hi; exit 0".to_string(),
        ])
        .unwrap();
        let (exit_code, output) = capture(process, Some(Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(exit_code, 0);
        assert!(String::from_utf8_lossy(&output).contains("hi"));
    }

    #[test]
    fn unknown_executable_is_not_available() {
        assert!(!is_executable_available("pocketwalk-definitely-not-a-real-binary"));
    }
}
