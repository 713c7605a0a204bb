use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A human (or auto-approval) verdict on one deployment request. Recorded
/// once; later signals for the same request are duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub request_id: RequestId,
    pub decision: Decision,
    pub decided_by: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn new(request_id: RequestId, decision: Decision, decided_by: Option<String>) -> Self {
        Self { request_id, decision, decided_by, decided_at: Utc::now() }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}

/// Decision as exposed by the approval workflow, whether it arrives by
/// callback, run-history polling or queue message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub request_id: String,
    pub selected_option: String,
    #[serde(default)]
    pub approver: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionRecordError {
    #[error("decision record has an invalid request id `{0}`")]
    InvalidRequestId(String),
    #[error("decision record has an unknown selected option `{0}` (expected Approve|Reject)")]
    UnknownOption(String),
}

impl DecisionRecord {
    pub fn into_decision(self) -> Result<ApprovalDecision, DecisionRecordError> {
        let request_id = RequestId::parse(&self.request_id)
            .ok_or_else(|| DecisionRecordError::InvalidRequestId(self.request_id.clone()))?;
        let decision = Decision::parse(&self.selected_option)
            .ok_or_else(|| DecisionRecordError::UnknownOption(self.selected_option.clone()))?;

        Ok(ApprovalDecision::new(request_id, decision, self.approver))
    }
}
