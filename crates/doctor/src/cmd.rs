//! External command execution with a fixed timeout.
//!
//! Every shell-out the doctor performs (abctl, kubectl) goes through
//! [`run_command`], which bounds the invocation at 30 seconds and never
//! panics: timeouts and spawn failures come back as a failed
//! [`CommandOutput`] so individual checks can degrade instead of aborting
//! the run.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Upper bound for any external invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            code: -1,
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

/// Run a command and capture its output.
pub async fn run_command(program: &str, args: &[&str]) -> CommandOutput {
    debug!(program, ?args, "running external command");

    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());

    match timeout(COMMAND_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Ok(Err(e)) => CommandOutput::failed(format!("failed to run {program}: {e}")),
        Err(_) => CommandOutput::failed(format!(
            "{program} timed out after {}s",
            COMMAND_TIMEOUT.as_secs()
        )),
    }
}
