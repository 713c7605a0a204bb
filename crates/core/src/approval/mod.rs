//! Approval channel submission and decision observation.

pub mod callback;
pub mod observer;
pub mod polling;
pub mod queue;
pub mod signature;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::request::DeploymentRequest;

pub use callback::{CallbackObserver, CallbackRegistry, Delivery, CALLBACK_RETENTION};
pub use observer::{DecisionObserver, DecisionOutcome, ObserverError};
pub use polling::{DecisionSource, PollingObserver};
pub use queue::{DecisionQueue, QueueObserver};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDetails {
    pub command: String,
}

/// Body POSTed to the workflow engine's HTTP trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSubmission {
    pub request_id: String,
    pub resource_type: String,
    pub resource_name: String,
    pub resource_group: String,
    pub details: SubmissionDetails,
    pub user_email: String,
    pub user_name: String,
    pub estimated_cost: Decimal,
    pub justification: String,
    pub location: String,
}

impl ApprovalSubmission {
    pub fn from_request(request: &DeploymentRequest) -> Self {
        Self {
            request_id: request.request_id.to_string(),
            resource_type: request.resource_type.as_str().to_string(),
            resource_name: request.resource_name.clone(),
            resource_group: request.resource_group.clone(),
            details: SubmissionDetails { command: request.command.clone() },
            user_email: request.requester_email.clone(),
            user_name: request.requester_name.clone(),
            estimated_cost: request.estimated_cost,
            justification: request.justification.clone(),
            location: request.location.clone(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("approval channel transport error: {0}")]
    Transport(String),
    #[error("approval channel answered {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl ChannelError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Where approval requests are sent. A 2xx answer confirms receipt only; the
/// decision arrives later through a [`DecisionObserver`].
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn submit(&self, submission: &ApprovalSubmission) -> Result<(), ChannelError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitRetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for SubmitRetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(2) }
    }
}

/// Submits with fixed backoff between transport failures. A non-2xx answer
/// is final. Returns the number of attempts used.
pub async fn submit_with_retry(
    channel: &dyn ApprovalChannel,
    submission: &ApprovalSubmission,
    policy: SubmitRetryPolicy,
) -> Result<u32, ChannelError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match channel.submit(submission).await {
            Ok(()) => return Ok(attempt),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                warn!(
                    event_name = "approval.submit_retry",
                    request_id = %submission.request_id,
                    attempt,
                    max_attempts,
                    error = %error,
                    "approval channel submission failed; retrying"
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        submit_with_retry, ApprovalChannel, ApprovalSubmission, ChannelError, SubmitRetryPolicy,
    };
    use crate::domain::request::{DeploymentRequest, RequestId};
    use crate::domain::resource::ResourceKind;

    struct ScriptedChannel {
        answers: Mutex<Vec<Result<(), ChannelError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedChannel {
        fn new(mut answers: Vec<Result<(), ChannelError>>) -> Self {
            answers.reverse();
            Self { answers: Mutex::new(answers), calls: Mutex::new(0) }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl ApprovalChannel for ScriptedChannel {
        async fn submit(&self, _submission: &ApprovalSubmission) -> Result<(), ChannelError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.answers.lock().expect("answers lock").pop().unwrap_or(Ok(()))
        }
    }

    fn submission() -> ApprovalSubmission {
        ApprovalSubmission::from_request(&DeploymentRequest {
            request_id: RequestId::new(),
            resource_type: ResourceKind::Disk,
            resource_name: "disk01".into(),
            resource_group: "rg1".into(),
            location: "eastus".into(),
            command: "az disk create --name disk01 --resource-group rg1 --size-gb 128 --sku Standard_LRS".into(),
            requester_email: "dev@example.com".into(),
            requester_name: "Dev".into(),
            estimated_cost: Decimal::new(640, 2),
            justification: "capacity for the build cache".into(),
            session_id: None,
            created_at: Utc::now(),
        })
    }

    fn policy() -> SubmitRetryPolicy {
        SubmitRetryPolicy { max_attempts: 3, backoff: Duration::from_secs(2) }
    }

    #[test]
    fn payload_uses_workflow_field_names() {
        let value = serde_json::to_value(submission()).expect("serialize");

        for key in [
            "requestId",
            "resourceType",
            "resourceName",
            "resourceGroup",
            "userEmail",
            "userName",
            "estimatedCost",
            "justification",
            "location",
        ] {
            assert!(value.get(key).is_some(), "missing `{key}`");
        }
        assert_eq!(value["resourceType"], "disk");
        assert!(value["details"]["command"]
            .as_str()
            .expect("command string")
            .starts_with("az disk create"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_until_success() {
        let channel = ScriptedChannel::new(vec![
            Err(ChannelError::Transport("connection reset".into())),
            Err(ChannelError::Transport("connection reset".into())),
            Ok(()),
        ]);

        let attempts =
            submit_with_retry(&channel, &submission(), policy()).await.expect("third attempt");
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_last_error() {
        let channel = ScriptedChannel::new(vec![
            Err(ChannelError::Transport("dns".into())),
            Err(ChannelError::Transport("dns".into())),
            Err(ChannelError::Transport("dns".into())),
            Ok(()),
        ]);

        let error =
            submit_with_retry(&channel, &submission(), policy()).await.expect_err("exhausted");
        assert_eq!(error, ChannelError::Transport("dns".into()));
        assert_eq!(channel.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_status_is_not_retried() {
        let channel = ScriptedChannel::new(vec![Err(ChannelError::Rejected {
            status: 400,
            body: "bad payload".into(),
        })]);

        let error = submit_with_retry(&channel, &submission(), policy()).await.expect_err("400");
        assert!(matches!(error, ChannelError::Rejected { status: 400, .. }));
        assert_eq!(channel.calls(), 1);
    }
}
