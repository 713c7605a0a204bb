//! Running generated CLI commands and verifying what they created.

pub mod local;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CliCommand;
use crate::domain::request::RequestId;
use crate::domain::resource::ResourceRef;

pub use local::LocalCliBackend;
pub use verify::{CliVerifier, ResourceVerifier};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn timed_out(stdout: String, stderr: String) -> Self {
        Self { exit_code: None, stdout, stderr, timed_out: true }
    }

    pub fn exited_successfully(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, as surfaced to the requester.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// What the backend is running the command for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub request_id: RequestId,
    pub resource: ResourceRef,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("could not start `{program}`: {message}")]
    Spawn { program: String, message: String },
    #[error("i/o failure while running command: {0}")]
    Io(String),
    #[error("remote execution failed: {0}")]
    Remote(String),
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        command: &CliCommand,
        context: &ExecutionContext,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;
}

#[async_trait]
impl<T> ExecutionBackend for Arc<T>
where
    T: ExecutionBackend + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn run(
        &self,
        command: &CliCommand,
        context: &ExecutionContext,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        (**self).run(command, context, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::CommandOutput;

    #[test]
    fn combined_output_skips_empty_streams() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: "\n".into(),
            stderr: "ERROR: quota exceeded\n".into(),
            timed_out: false,
        };
        assert_eq!(output.combined(), "ERROR: quota exceeded");
        assert!(!output.exited_successfully());
    }

    #[test]
    fn timed_out_output_never_counts_as_success() {
        let output = CommandOutput::timed_out(String::new(), String::new());
        assert!(!output.exited_successfully());
        assert_eq!(output.exit_code, None);
    }
}
