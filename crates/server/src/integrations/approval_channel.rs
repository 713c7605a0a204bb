use async_trait::async_trait;
use azops_core::approval::{ApprovalChannel, ApprovalSubmission, ChannelError};
use reqwest::Client;
use tracing::{debug, warn};

/// POSTs submissions to the workflow engine's HTTP trigger.
#[derive(Clone)]
pub struct HttpApprovalChannel {
    client: Client,
    url: String,
}

impl HttpApprovalChannel {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl ApprovalChannel for HttpApprovalChannel {
    async fn submit(&self, submission: &ApprovalSubmission) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.url)
            .json(submission)
            .send()
            .await
            .map_err(|error| ChannelError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(
                event_name = "approval.channel_accepted",
                request_id = %submission.request_id,
                status = status.as_u16(),
                "workflow trigger accepted submission"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            event_name = "approval.channel_rejected",
            request_id = %submission.request_id,
            status = status.as_u16(),
            "workflow trigger refused submission"
        );
        Err(ChannelError::Rejected { status: status.as_u16(), body })
    }
}

/// Stands in when `approval.enabled = false` and no trigger URL is set. The
/// orchestrator never submits in that mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledChannel;

#[async_trait]
impl ApprovalChannel for DisabledChannel {
    async fn submit(&self, _submission: &ApprovalSubmission) -> Result<(), ChannelError> {
        Err(ChannelError::Rejected {
            status: 503,
            body: "approval channel is not configured".to_string(),
        })
    }
}
