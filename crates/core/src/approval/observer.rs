use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::DecisionTransport;
use crate::domain::approval::ApprovalDecision;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecisionOutcome {
    Decided(ApprovalDecision),
    TimedOut,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("decision transport failed: {0}")]
    Transport(String),
    #[error("decision record was malformed: {0}")]
    Malformed(String),
    #[error("decision observer was shut down")]
    Closed,
}

/// Waits for the human decision on one request until `deadline`.
#[async_trait]
pub trait DecisionObserver: Send + Sync {
    fn transport(&self) -> DecisionTransport;

    async fn await_decision(
        &self,
        request_id: &RequestId,
        deadline: Instant,
    ) -> Result<DecisionOutcome, ObserverError>;
}
