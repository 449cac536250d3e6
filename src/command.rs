//! Subprocess invocation for the external Steam tools
//!
//! Both the manifest poller and the depot downloader drive the same
//! command-line tool. They consume it through the [`CommandRunner`] trait so
//! the monitor pipeline can be exercised in tests with a fake runner that
//! returns captured output.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("command exited with {status}: {output}")]
    Failed { status: String, output: String },
}

/// Capability for running an external tool and capturing its combined output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<String, CommandError>;
}

/// Runs a fixed program as a child process with a deadline.
///
/// stdout and stderr are interleaved into one string, matching what the
/// parser expects from the tool's "print manifest" output.
pub struct ProcessRunner {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> Result<String, CommandError> {
        debug!(program = %self.program.display(), ?args, "spawning tool");

        let child = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout(self.timeout))?
            .map_err(|source| CommandError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(CommandError::Failed {
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(combined)
    }
}
