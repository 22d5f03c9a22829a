//! Child processes with a hard deadline.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{GuardError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished child.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` in `cwd`, killing it once `timeout` elapses.
///
/// Stdin is closed; stdout and stderr are drained on background threads so
/// a chatty child cannot wedge on a full pipe. A non-zero exit is not an
/// error here; callers inspect [`Captured::status`].
pub fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<Captured> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GuardError::Process {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GuardError::Timeout {
                program: program.to_string(),
                millis: timeout.as_millis() as u64,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Captured {
        status,
        stdout: join_output(stdout),
        stderr: join_output(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run_with_timeout("echo", &["hello"], Path::new("/"), Duration::from_secs(5))
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn missing_program_is_process_error() {
        let err = run_with_timeout(
            "cc-guardrail-definitely-missing",
            &[],
            Path::new("/"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, GuardError::Process { .. }));
    }

    #[test]
    fn slow_program_times_out() {
        let start = Instant::now();
        let err = run_with_timeout("sleep", &["5"], Path::new("/"), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, GuardError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn non_zero_exit_is_not_error() {
        let out = run_with_timeout("false", &[], Path::new("/"), Duration::from_secs(5)).unwrap();
        assert!(!out.status.success());
    }
}
