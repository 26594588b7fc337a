//! External reasoner run as a child process (OWLTools, ROBOT, ...).

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::Reasoner;
use crate::config::ClosureConfig;
use crate::error::{ClosureError, ClosureFailure, ClosureTimeoutError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Trailing bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 4096;

#[derive(Debug, Clone)]
pub struct ProcessReasoner {
    program: String,
    args: Vec<String>,
    reasoner: String,
}

impl ProcessReasoner {
    /// `args` may contain `{input}`, `{output}` and `{reasoner}` placeholders.
    pub fn new(program: impl Into<String>, args: Vec<String>, reasoner: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            reasoner: reasoner.into(),
        }
    }

    pub fn from_config(config: &ClosureConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.reasoner.clone())
    }

    fn command_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|a| {
                a.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{reasoner}", &self.reasoner)
            })
            .collect()
    }

    fn label(&self) -> String {
        format!("{}:{}", self.program, self.reasoner)
    }
}

impl Reasoner for ProcessReasoner {
    fn name(&self) -> &str {
        &self.reasoner
    }

    fn infer(&self, input: &Path, output: &Path, timeout: Duration) -> Result<(), ClosureFailure> {
        let work_dir = input.parent().unwrap_or_else(|| Path::new("."));
        let stdout_path = work_dir.join("reasoner.stdout.log");
        let stderr_path = work_dir.join("reasoner.stderr.log");
        let stdout = File::create(&stdout_path).map_err(|source| ClosureError::Io {
            path: stdout_path.clone(),
            source,
        })?;
        let stderr = File::create(&stderr_path).map_err(|source| ClosureError::Io {
            path: stderr_path.clone(),
            source,
        })?;

        let args = self.command_args(input, output);
        tracing::info!(program = %self.program, args = ?args, timeout_secs = timeout.as_secs(), "starting reasoner");
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ClosureError::Launch {
                reasoner: self.label(),
                source,
            })?;

        let status = wait_with_timeout(child, timeout).map_err(|failure| match failure {
            WaitFailure::TimedOut => ClosureFailure::from(ClosureTimeoutError {
                reasoner: self.label(),
                timeout,
            }),
            WaitFailure::Io(source) => ClosureFailure::from(ClosureError::Io {
                path: work_dir.to_path_buf(),
                source,
            }),
        })?;

        if !status.success() {
            let stderr = std::fs::read(&stderr_path)
                .map(|bytes| tail(&bytes))
                .unwrap_or_default();
            return Err(ClosureError::ReasonerFailed {
                reasoner: self.label(),
                code: status.code(),
                stderr,
            }
            .into());
        }
        Ok(())
    }
}

enum WaitFailure {
    TimedOut,
    Io(std::io::Error),
}

/// Poll the child until it exits; kill it once `timeout` has elapsed.
fn wait_with_timeout(
    mut child: Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, WaitFailure> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(WaitFailure::Io)? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitFailure::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
