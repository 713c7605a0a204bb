use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Submitted,
    AwaitingDecision,
    Approved,
    Executing,
    Verified,
    ExecutionFailed,
    Rejected,
    TimedOut,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::AwaitingDecision => "awaiting_decision",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Verified => "verified",
            Self::ExecutionFailed => "execution_failed",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "awaiting_decision" => Some(Self::AwaitingDecision),
            "approved" => Some(Self::Approved),
            "executing" => Some(Self::Executing),
            "verified" => Some(Self::Verified),
            "execution_failed" => Some(Self::ExecutionFailed),
            "rejected" => Some(Self::Rejected),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::ExecutionFailed | Self::Rejected | Self::TimedOut)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    RequestRecorded,
    ChannelAccepted,
    ApprovalBypassed,
    DecisionApproved,
    DecisionRejected,
    DecisionTimedOut,
    ExecutionStarted,
    VerificationSucceeded,
    CommandFailed,
    VerificationFailed,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestRecorded => "request_recorded",
            Self::ChannelAccepted => "channel_accepted",
            Self::ApprovalBypassed => "approval_bypassed",
            Self::DecisionApproved => "decision_approved",
            Self::DecisionRejected => "decision_rejected",
            Self::DecisionTimedOut => "decision_timed_out",
            Self::ExecutionStarted => "execution_started",
            Self::VerificationSucceeded => "verification_succeeded",
            Self::CommandFailed => "command_failed",
            Self::VerificationFailed => "verification_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "request_recorded" => Some(Self::RequestRecorded),
            "channel_accepted" => Some(Self::ChannelAccepted),
            "approval_bypassed" => Some(Self::ApprovalBypassed),
            "decision_approved" => Some(Self::DecisionApproved),
            "decision_rejected" => Some(Self::DecisionRejected),
            "decision_timed_out" => Some(Self::DecisionTimedOut),
            "execution_started" => Some(Self::ExecutionStarted),
            "verification_succeeded" => Some(Self::VerificationSucceeded),
            "command_failed" => Some(Self::CommandFailed),
            "verification_failed" => Some(Self::VerificationFailed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    AwaitDecision,
    ClaimExecution,
    RunCommand,
    VerifyResource,
    NotifyRequester,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DeploymentState,
    pub to: DeploymentState,
    pub event: LifecycleEvent,
    pub actions: Vec<LifecycleAction>,
}

/// One appended row of a request's audit trail. `from` is `None` only for the
/// row that records the request itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTransition {
    pub request_id: RequestId,
    pub from: Option<DeploymentState>,
    pub to: DeploymentState,
    pub event: LifecycleEvent,
    pub occurred_at: DateTime<Utc>,
}

impl DeploymentTransition {
    pub fn initial(request_id: RequestId) -> Self {
        Self {
            request_id,
            from: None,
            to: DeploymentState::Submitted,
            event: LifecycleEvent::RequestRecorded,
            occurred_at: Utc::now(),
        }
    }

    pub fn from_outcome(request_id: RequestId, outcome: &TransitionOutcome) -> Self {
        Self {
            request_id,
            from: Some(outcome.from),
            to: outcome.to,
            event: outcome.event,
            occurred_at: Utc::now(),
        }
    }
}
