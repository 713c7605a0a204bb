//! Requester notifications for terminal deployment outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::warn;

use crate::domain::execution::ExecutionResult;
use crate::domain::request::{DeploymentRequest, RequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Succeeded,
    Failed,
    Rejected,
    TimedOut,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    fn template_names(&self) -> (&'static str, &'static str) {
        match self {
            Self::Succeeded => ("succeeded.subject", "succeeded.body"),
            Self::Failed => ("failed.subject", "failed.body"),
            Self::Rejected => ("rejected.subject", "rejected.body"),
            Self::TimedOut => ("timed_out.subject", "timed_out.body"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub request_id: RequestId,
    pub session_id: Option<String>,
    pub kind: NotificationKind,
    pub requester_email: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification template failed: {0}")]
    Template(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

const TEMPLATES: &[(&str, &str)] = &[
    ("succeeded.subject", "Deployed {{ resource_type }} {{ resource_name }}"),
    (
        "succeeded.body",
        "Your {{ resource_type }} `{{ resource_name }}` in resource group `{{ resource_group }}` was created and verified.\n\nCommand: {{ command }}",
    ),
    ("failed.subject", "Deployment of {{ resource_name }} failed"),
    (
        "failed.body",
        "Creating {{ resource_type }} `{{ resource_name }}` failed ({{ status }}).\n\nCommand: {{ command }}\n\n{{ output }}",
    ),
    ("rejected.subject", "Deployment of {{ resource_name }} was rejected"),
    (
        "rejected.body",
        "Your request to create {{ resource_type }} `{{ resource_name }}` was rejected{% if decided_by %} by {{ decided_by }}{% endif %}. Nothing was deployed.",
    ),
    ("timed_out.subject", "Deployment of {{ resource_name }} expired"),
    (
        "timed_out.body",
        "No approval decision arrived for {{ resource_type }} `{{ resource_name }}` in time. Nothing was deployed; submit a new request to try again.",
    ),
];

/// Renders notification subject and body from built-in tera templates.
#[derive(Clone, Debug)]
pub struct NotificationRenderer {
    tera: Arc<Tera>,
}

impl NotificationRenderer {
    pub fn new() -> Result<Self, NotifyError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|error| NotifyError::Template(error.to_string()))?;
        Ok(Self { tera: Arc::new(tera) })
    }

    pub fn render(
        &self,
        kind: NotificationKind,
        request: &DeploymentRequest,
        result: Option<&ExecutionResult>,
        decided_by: Option<&str>,
    ) -> Result<Notification, NotifyError> {
        let mut context = Context::new();
        context.insert("resource_type", request.resource_type.display_name());
        context.insert("resource_name", &request.resource_name);
        context.insert("resource_group", &request.resource_group);
        context.insert("command", &request.command);
        context.insert("decided_by", &decided_by);
        context.insert("status", &result.map(|result| result.status.as_str()).unwrap_or(""));
        context.insert("output", &result.map(|result| result.output.as_str()).unwrap_or(""));

        let (subject_template, body_template) = kind.template_names();
        let render = |name: &str| {
            self.tera
                .render(name, &context)
                .map_err(|error| NotifyError::Template(format!("{name}: {error}")))
        };

        Ok(Notification {
            request_id: request.request_id,
            session_id: request.session_id.clone(),
            kind,
            requester_email: request.requester_email.clone(),
            subject: render(subject_template)?,
            body: render(body_template)?,
            created_at: Utc::now(),
        })
    }
}

/// Outbox that the chat surface drains per session. Notifications without a
/// session are filed under the requester's email.
#[derive(Default)]
pub struct InMemoryNotifier {
    outbox: Mutex<HashMap<String, Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(notification: &Notification) -> String {
        notification.session_id.clone().unwrap_or_else(|| notification.requester_email.clone())
    }

    pub fn drain(&self, session_id: &str) -> Vec<Notification> {
        let mut outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbox.remove(session_id).unwrap_or_default()
    }

    pub fn pending(&self, session_id: &str) -> usize {
        let outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbox.get(session_id).map(Vec::len).unwrap_or(0)
    }

    pub fn all(&self) -> Vec<Notification> {
        let outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut all: Vec<_> = outbox.values().flatten().cloned().collect();
        all.sort_by_key(|notification| notification.created_at);
        all
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut outbox = match self.outbox.lock() {
            Ok(outbox) => outbox,
            Err(poisoned) => poisoned.into_inner(),
        };
        outbox.entry(Self::key(notification)).or_default().push(notification.clone());
        Ok(())
    }
}

/// Delivers to every inner notifier. Fails only when none succeeded.
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut last_error = None;
        let mut delivered = 0usize;

        for notifier in &self.notifiers {
            match notifier.deliver(notification).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(
                        event_name = "notification.delivery_failed",
                        request_id = %notification.request_id,
                        error = %error,
                        "notifier failed; continuing with remaining notifiers"
                    );
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if delivered == 0 => Err(error),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        FanoutNotifier, InMemoryNotifier, Notification, NotificationKind, NotificationRenderer,
        Notifier, NotifyError,
    };
    use crate::domain::execution::{ExecutionResult, ExecutionStatus};
    use crate::domain::request::{DeploymentRequest, RequestId};
    use crate::domain::resource::ResourceKind;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            request_id: RequestId::new(),
            resource_type: ResourceKind::Disk,
            resource_name: "disk01".into(),
            resource_group: "rg1".into(),
            location: "eastus".into(),
            command: "az disk create --name disk01".into(),
            requester_email: "dev@example.com".into(),
            requester_name: "Dev".into(),
            estimated_cost: Decimal::ZERO,
            justification: "testing".into(),
            session_id: Some("session-1".into()),
            created_at: Utc::now(),
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("webhook unreachable".into()))
        }
    }

    #[test]
    fn failure_body_carries_cli_output_verbatim() {
        let request = request();
        let result = ExecutionResult {
            request_id: request.request_id,
            status: ExecutionStatus::Failed,
            exit_code: Some(1),
            output: "ERROR: (InvalidResourceGroup) rg1 not found".into(),
            verified_exists: false,
            command_fingerprint: String::new(),
            completed_at: Utc::now(),
        };

        let notification = NotificationRenderer::new()
            .expect("templates compile")
            .render(NotificationKind::Failed, &request, Some(&result), None)
            .expect("render");

        assert!(notification.subject.contains("disk01"));
        assert!(notification.body.contains("(InvalidResourceGroup) rg1 not found"));
        assert!(notification.body.contains("failed"));
    }

    #[test]
    fn rejection_names_the_approver_when_known() {
        let notification = NotificationRenderer::new()
            .expect("templates compile")
            .render(NotificationKind::Rejected, &request(), None, Some("lead@example.com"))
            .expect("render");

        assert!(notification.body.contains("rejected by lead@example.com"));
    }

    #[tokio::test]
    async fn outbox_is_drained_per_session() {
        let outbox = InMemoryNotifier::new();
        let notification = NotificationRenderer::new()
            .expect("templates compile")
            .render(NotificationKind::TimedOut, &request(), None, None)
            .expect("render");

        outbox.deliver(&notification).await.expect("deliver");
        assert_eq!(outbox.pending("session-1"), 1);
        assert_eq!(outbox.drain("session-1").len(), 1);
        assert!(outbox.drain("session-1").is_empty());
    }

    #[tokio::test]
    async fn fanout_succeeds_when_any_notifier_succeeds() {
        let outbox = Arc::new(InMemoryNotifier::new());
        let fanout = FanoutNotifier::new(vec![Arc::new(FailingNotifier), outbox.clone()]);
        let notification = NotificationRenderer::new()
            .expect("templates compile")
            .render(NotificationKind::Succeeded, &request(), None, None)
            .expect("render");

        fanout.deliver(&notification).await.expect("one notifier succeeded");
        assert_eq!(outbox.all().len(), 1);

        let failing_only = FanoutNotifier::new(vec![Arc::new(FailingNotifier)]);
        assert!(failing_only.deliver(&notification).await.is_err());
    }
}
