use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::command::CliCommand;
use crate::execution::{BackendError, CommandOutput, ExecutionBackend, ExecutionContext};

/// Runs commands as local child processes. On timeout the child is killed.
#[derive(Clone, Debug, Default)]
pub struct LocalCliBackend;

impl LocalCliBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for LocalCliBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(
        &self,
        command: &CliCommand,
        context: &ExecutionContext,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| BackendError::Spawn {
                program: command.program.clone(),
                message: error.to_string(),
            })?;

        info!(
            event_name = "execution.local_spawned",
            request_id = %context.request_id,
            program = %command.program,
            timeout_secs = timeout.as_secs(),
            "spawned cli process"
        );

        // Dropping the wait future drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(error)) => Err(BackendError::Io(error.to_string())),
            Err(_) => {
                warn!(
                    event_name = "execution.local_timeout",
                    request_id = %context.request_id,
                    timeout_secs = timeout.as_secs(),
                    "cli process exceeded timeout and was killed"
                );
                Ok(CommandOutput::timed_out(
                    String::new(),
                    format!("command exceeded the {}s execution timeout", timeout.as_secs()),
                ))
            }
        }
    }
}
