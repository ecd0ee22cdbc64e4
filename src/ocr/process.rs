use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::AdapterError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured output of a finished engine process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// `Err(Failed)` unless the process exited successfully.
    pub fn check(self, engine: &str) -> Result<Self, AdapterError> {
        if self.status.success() {
            return Ok(self);
        }
        Err(AdapterError::Failed {
            engine: engine.to_string(),
            status: self.status.to_string(),
            stderr: self.stderr_lossy(),
        })
    }
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
///
/// A program that cannot be found maps to `AdapterError::Unavailable`.
pub fn run_with_timeout(
    engine: &str,
    mut cmd: Command,
    timeout: Duration,
) -> Result<ProcessOutput, AdapterError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AdapterError::Unavailable {
            engine: engine.to_string(),
            reason: format!("{program} not found"),
        },
        _ => AdapterError::Io {
            engine: engine.to_string(),
            source: e,
        },
    })?;
    debug!(engine, program = %program, pid = child.id(), "spawned engine process");

    // Both pipes are drained while the wait loop polls.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || drain(stdout));
    let err_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!(engine, program = %program, "killing engine after {timeout:?}");
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::Timeout {
                    engine: engine.to_string(),
                    after: timeout,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(AdapterError::Io {
                    engine: engine.to_string(),
                    source: e,
                });
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: out_reader.join().unwrap_or_default(),
        stderr: err_reader.join().unwrap_or_default(),
    })
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_successful_process() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'hello'; printf 'warn' >&2");
        let out = run_with_timeout("sh", cmd, Duration::from_secs(5)).unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout_lossy(), "hello");
        assert_eq!(out.stderr_lossy(), "warn");
    }

    #[test]
    fn missing_program_is_unavailable() {
        let cmd = Command::new("labelcode-definitely-not-installed");
        let err = run_with_timeout("ghost", cmd, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AdapterError::Unavailable { .. }), "{err:?}");
        assert_eq!(err.engine(), "ghost");
    }

    #[test]
    fn slow_process_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_with_timeout("sleepy", cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn non_zero_exit_fails_check() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken >&2; exit 3");
        let out = run_with_timeout("sh", cmd, Duration::from_secs(5)).unwrap();
        let err = out.check("sh").unwrap_err();
        match err {
            AdapterError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
