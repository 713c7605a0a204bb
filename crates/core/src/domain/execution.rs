use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Timeout,
    VerificationFailed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::VerificationFailed => "verification_failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            "verification_failed" => Some(Self::VerificationFailed),
            _ => None,
        }
    }
}

/// Terminal outcome of running an approved request's command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub request_id: RequestId,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub output: String,
    pub verified_exists: bool,
    pub command_fingerprint: String,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success && self.verified_exists
    }
}

/// Proof that one worker won the right to execute a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionClaim {
    pub request_id: RequestId,
    pub claimed_by: String,
    pub claimed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ExecutionStatus;

    #[test]
    fn execution_status_round_trips_from_storage_encoding() {
        let cases = [
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
            ExecutionStatus::Timeout,
            ExecutionStatus::VerificationFailed,
        ];

        for status in cases {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
    }
}
