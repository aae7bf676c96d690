//! Blocking invocation of the external model process.
//!
//! The model is a black box: it reads the feature files, writes the result
//! file, and exits. This module only launches it, bounds how long it may run,
//! and classifies how it ended. Nothing here returns an error; every failure
//! becomes a [`ModelOutcome`] the predictor logs and moves past.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Bytes of stderr kept for logs.
const STDERR_TAIL_BYTES: usize = 4096;

/// How long to wait for stderr to drain after the process exits. A
/// background grandchild can hold the pipe open indefinitely.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// How one model run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    /// The process exited before the deadline.
    Completed {
        /// Exit code (`None` if killed by a signal).
        exit_code: Option<i32>,
        success: bool,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// The deadline passed; the process was killed and reaped.
    TimedOut { after: Duration },
    /// The process could not be started or waited on.
    LaunchFailed { message: String },
}

impl ModelOutcome {
    /// Whether the model exited successfully in time.
    pub fn is_success(&self) -> bool {
        matches!(self, ModelOutcome::Completed { success: true, .. })
    }
}

/// Run `command` in `cwd`, waiting at most `timeout`.
///
/// stdin is closed and stdout discarded; stderr is captured so failures can
/// be explained in the log.
pub fn run_model(command: &[String], cwd: &Path, timeout: Duration) -> ModelOutcome {
    let Some((program, args)) = command.split_first() else {
        warn!("Predict command is empty; skipping model run");
        return ModelOutcome::LaunchFailed {
            message: "empty command".to_string(),
        };
    };

    info!(
        "Running model {} (timeout {:?}, cwd {})",
        program,
        timeout,
        cwd.display()
    );
    let start = Instant::now();

    let mut child = match Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to launch model {}: {}", program, e);
            return ModelOutcome::LaunchFailed {
                message: format!("failed to launch '{}': {}", program, e),
            };
        }
    };

    // Drain stderr on a separate thread so a chatty model cannot fill the
    // pipe and block before exiting.
    let (tx, rx) = mpsc::channel();
    if let Some(mut stderr) = child.stderr.take() {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    }

    // Wait with timeout using OS-level waiting (no polling)
    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            let elapsed = start.elapsed();
            let stderr = rx
                .recv_timeout(STDERR_GRACE)
                .map(|buf| tail_lossy(&buf, STDERR_TAIL_BYTES))
                .unwrap_or_default();

            if status.success() {
                debug!("Model finished in {:?}", elapsed);
            } else {
                warn!(
                    "Model exited with {:?} after {:?}: {}",
                    status.code(),
                    elapsed,
                    stderr.trim()
                );
            }
            ModelOutcome::Completed {
                exit_code: status.code(),
                success: status.success(),
                stderr,
            }
        }
        Ok(None) => {
            // Timeout - kill the process
            let _ = child.kill();
            let _ = child.wait(); // Reap the zombie

            let after = start.elapsed();
            warn!(
                "Model timed out after {:?} (limit: {:?}): {:?}",
                after, timeout, command
            );
            ModelOutcome::TimedOut { after }
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();

            warn!("Failed waiting for model {}: {}", program, e);
            ModelOutcome::LaunchFailed {
                message: format!("failed waiting for '{}': {}", program, e),
            }
        }
    }
}

/// Last `max` bytes of `buf` as text, cut on a character boundary.
fn tail_lossy(buf: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(buf);
    if text.len() <= max {
        return text.into_owned();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_launch_failure() {
        let outcome = run_model(&[], Path::new("."), Duration::from_secs(1));
        assert!(matches!(outcome, ModelOutcome::LaunchFailed { .. }));
        assert!(!outcome.is_success());
    }

    #[test]
    fn missing_program_is_launch_failure() {
        let command = vec!["faultline-no-such-model-binary".to_string()];
        let outcome = run_model(&command, Path::new("."), Duration::from_secs(1));
        match outcome {
            ModelOutcome::LaunchFailed { message } => {
                assert!(message.contains("faultline-no-such-model-binary"))
            }
            other => panic!("Expected LaunchFailed, got {other:?}"),
        }
    }

    #[test]
    fn tail_lossy_keeps_the_end() {
        assert_eq!(tail_lossy(b"hello", 10), "hello");
        assert_eq!(tail_lossy(b"hello world", 5), "world");
        // "é" is two bytes; a cut inside it moves forward.
        assert_eq!(tail_lossy("aé".as_bytes(), 1), "");
        assert_eq!(tail_lossy("aé".as_bytes(), 2), "é");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&ModelOutcome::LaunchFailed {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"launch_failed","message":"boom"}"#);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> Vec<String> {
            vec!["sh".to_string(), "-c".to_string(), script.to_string()]
        }

        #[test]
        fn successful_run_is_completed() {
            let outcome = run_model(&sh("exit 0"), Path::new("."), Duration::from_secs(10));
            assert!(outcome.is_success());
        }

        #[test]
        fn nonzero_exit_captures_stderr() {
            let outcome = run_model(
                &sh("echo model exploded >&2; exit 3"),
                Path::new("."),
                Duration::from_secs(10),
            );
            match outcome {
                ModelOutcome::Completed {
                    exit_code,
                    success,
                    stderr,
                } => {
                    assert_eq!(exit_code, Some(3));
                    assert!(!success);
                    assert!(stderr.contains("model exploded"));
                }
                other => panic!("Expected Completed, got {other:?}"),
            }
        }

        #[test]
        fn slow_model_times_out() {
            let start = Instant::now();
            let outcome = run_model(&sh("sleep 30"), Path::new("."), Duration::from_millis(200));
            assert!(matches!(outcome, ModelOutcome::TimedOut { .. }));
            assert!(start.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn missing_working_directory_is_launch_failure() {
            let outcome = run_model(
                &sh("exit 0"),
                Path::new("/nonexistent/faultline/home"),
                Duration::from_secs(1),
            );
            assert!(matches!(outcome, ModelOutcome::LaunchFailed { .. }));
        }
    }
}
