use std::time::Duration;

use async_trait::async_trait;
use azops_core::command::CliCommand;
use azops_core::execution::{BackendError, CommandOutput, ExecutionBackend, ExecutionContext};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const FUNCTION_KEY_HEADER: &str = "x-functions-key";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteExecutionRequest {
    command: String,
    resource_name: String,
    resource_group: String,
    resource_type: String,
    request_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteExecutionResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Maps the function's `{status, message}` onto process-style output so the
/// orchestrator treats both backends alike.
pub fn output_from_response(
    response: RemoteExecutionResponse,
) -> Result<CommandOutput, BackendError> {
    match response.status.trim().to_ascii_lowercase().as_str() {
        "success" | "succeeded" => Ok(CommandOutput {
            exit_code: Some(0),
            stdout: response.message,
            stderr: String::new(),
            timed_out: false,
        }),
        "failed" | "failure" | "error" => Ok(CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: response.message,
            timed_out: false,
        }),
        "timeout" | "timedout" | "timed_out" => {
            Ok(CommandOutput::timed_out(String::new(), response.message))
        }
        other => Err(BackendError::Remote(format!("unknown remote status `{other}`"))),
    }
}

/// Runs commands through an HTTP function that owns the Azure credentials.
#[derive(Clone)]
pub struct RemoteFunctionBackend {
    client: Client,
    url: String,
    key: Option<SecretString>,
}

impl RemoteFunctionBackend {
    pub fn new(client: Client, url: impl Into<String>, key: Option<SecretString>) -> Self {
        Self { client, url: url.into(), key }
    }
}

#[async_trait]
impl ExecutionBackend for RemoteFunctionBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn run(
        &self,
        command: &CliCommand,
        context: &ExecutionContext,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        let body = RemoteExecutionRequest {
            command: command.render(),
            resource_name: context.resource.name.clone(),
            resource_group: context.resource.resource_group.clone(),
            resource_type: context.resource.kind.as_str().to_string(),
            request_id: context.request_id.to_string(),
        };

        let mut request = self.client.post(&self.url).json(&body).timeout(timeout);
        if let Some(key) = &self.key {
            request = request.header(FUNCTION_KEY_HEADER, key.expose_secret());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                warn!(
                    event_name = "execution.remote_timeout",
                    request_id = %context.request_id,
                    timeout_secs = timeout.as_secs(),
                    "remote execution did not answer before the deadline"
                );
                return Ok(CommandOutput::timed_out(
                    String::new(),
                    format!("remote execution did not answer within {}s", timeout.as_secs()),
                ));
            }
            Err(error) => return Err(BackendError::Remote(error.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Remote(format!("function answered {status}: {text}")));
        }
        let parsed: RemoteExecutionResponse =
            response.json().await.map_err(|error| BackendError::Remote(error.to_string()))?;
        info!(
            event_name = "execution.remote_completed",
            request_id = %context.request_id,
            status = %parsed.status,
            "remote execution answered"
        );
        output_from_response(parsed)
    }
}
