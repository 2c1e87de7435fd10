//! Blocking invocation of external command-line tools with a deadline.
//!
//! Used from worker threads only. The child is polled with a short sleep;
//! past the deadline it is killed and the call reports a timeout.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::ProbeError;

/// Interval between exit checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
    timeout: Duration,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion and return stdout.
    pub fn run<I, S>(&self, args: I) -> Result<Vec<u8>, ProbeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = self.name();
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        // Drain stdout concurrently so a full pipe cannot stall the child.
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stdout.read_to_end(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(%tool, timeout = ?self.timeout, "External tool timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    // The reader thread is left to finish on its own.
                    return Err(ProbeError::Timeout {
                        tool,
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ProbeError::Spawn { tool, source: e });
                }
            }
        };

        let stdout = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(ProbeError::Failed {
                tool,
                status: status.code().unwrap_or(-1),
            });
        }

        trace!(%tool, bytes = stdout.len(), "External tool finished");
        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script into `dir`.
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_collects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "echoer", r#"echo "$1-$2""#);
        let out = ExternalTool::new(exe, Duration::from_secs(5))
            .run(["a", "b"])
            .unwrap();
        assert_eq!(out, b"a-b\n");
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "bad", "exit 3");
        let err = ExternalTool::new(exe, Duration::from_secs(5))
            .run::<_, &str>([])
            .unwrap_err();
        assert!(matches!(err, ProbeError::Failed { status: 3, .. }));
    }

    #[test]
    fn test_hung_tool_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "hang", "exec sleep 10");
        let started = Instant::now();
        let err = ExternalTool::new(exe, Duration::from_millis(200))
            .run::<_, &str>([])
            .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = ExternalTool::new("/nonexistent/tool", Duration::from_secs(1))
            .run::<_, &str>([])
            .unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }
}
