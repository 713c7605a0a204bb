//! Append-only record of every deployment request and what happened to it.
//!
//! Each write is insert-once: a second decision, claim, result or
//! notification for the same request is refused rather than overwritten.
//! State transitions are compare-and-append against the latest recorded state,
//! which makes the ledger the single arbiter when several observers race.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::approval::ApprovalDecision;
use crate::domain::execution::{ExecutionClaim, ExecutionResult};
use crate::domain::request::{DeploymentRequest, RequestId};
use crate::lifecycle::{DeploymentState, DeploymentTransition};
use crate::notify::NotificationKind;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown deployment request {0}")]
    UnknownRequest(RequestId),
    #[error("ledger storage failure: {0}")]
    Storage(String),
    #[error("ledger decode failure: {0}")]
    Decode(String),
}

/// Result of an insert-once write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded<T> {
    New(T),
    Existing(T),
}

impl<T> Recorded<T> {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::New(value) | Self::Existing(value) => value,
        }
    }
}

#[async_trait]
pub trait DeploymentLedger: Send + Sync {
    /// Stores the request and its initial `Submitted` transition.
    async fn record_request(&self, request: &DeploymentRequest) -> Result<bool, LedgerError>;

    async fn find_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<DeploymentRequest>, LedgerError>;

    async fn record_decision(
        &self,
        decision: &ApprovalDecision,
    ) -> Result<Recorded<ApprovalDecision>, LedgerError>;

    async fn find_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, LedgerError>;

    /// True only for the first claimant of a request.
    async fn claim_execution(&self, claim: &ExecutionClaim) -> Result<bool, LedgerError>;

    async fn record_result(&self, result: &ExecutionResult) -> Result<bool, LedgerError>;

    async fn find_result(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ExecutionResult>, LedgerError>;

    /// True only the first time a notification is recorded for a request.
    async fn record_notification(
        &self,
        request_id: &RequestId,
        kind: NotificationKind,
    ) -> Result<bool, LedgerError>;

    /// Appends `transition` only if the request's latest state equals
    /// `transition.from`. Returns false when another writer got there first.
    async fn advance(&self, transition: &DeploymentTransition) -> Result<bool, LedgerError>;

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DeploymentTransition>, LedgerError>;

    async fn current_state(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<DeploymentState>, LedgerError> {
        Ok(self.list_transitions(request_id).await?.last().map(|transition| transition.to))
    }
}

#[derive(Default)]
struct LedgerState {
    requests: HashMap<RequestId, DeploymentRequest>,
    decisions: HashMap<RequestId, ApprovalDecision>,
    claims: HashMap<RequestId, ExecutionClaim>,
    results: HashMap<RequestId, ExecutionResult>,
    notifications: HashSet<RequestId>,
    transitions: HashMap<RequestId, Vec<DeploymentTransition>>,
}

#[derive(Default)]
pub struct InMemoryDeploymentLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryDeploymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    pub fn claim_count(&self) -> usize {
        self.with_state(|state| state.claims.len())
    }
}

#[async_trait]
impl DeploymentLedger for InMemoryDeploymentLedger {
    async fn record_request(&self, request: &DeploymentRequest) -> Result<bool, LedgerError> {
        Ok(self.with_state(|state| {
            if state.requests.contains_key(&request.request_id) {
                return false;
            }
            state.requests.insert(request.request_id, request.clone());
            state
                .transitions
                .insert(request.request_id, vec![DeploymentTransition::initial(request.request_id)]);
            true
        }))
    }

    async fn find_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<DeploymentRequest>, LedgerError> {
        Ok(self.with_state(|state| state.requests.get(request_id).cloned()))
    }

    async fn record_decision(
        &self,
        decision: &ApprovalDecision,
    ) -> Result<Recorded<ApprovalDecision>, LedgerError> {
        self.with_state(|state| {
            if !state.requests.contains_key(&decision.request_id) {
                return Err(LedgerError::UnknownRequest(decision.request_id));
            }
            if let Some(existing) = state.decisions.get(&decision.request_id) {
                return Ok(Recorded::Existing(existing.clone()));
            }
            state.decisions.insert(decision.request_id, decision.clone());
            Ok(Recorded::New(decision.clone()))
        })
    }

    async fn find_decision(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalDecision>, LedgerError> {
        Ok(self.with_state(|state| state.decisions.get(request_id).cloned()))
    }

    async fn claim_execution(&self, claim: &ExecutionClaim) -> Result<bool, LedgerError> {
        Ok(self.with_state(|state| {
            if state.claims.contains_key(&claim.request_id) {
                return false;
            }
            state.claims.insert(claim.request_id, claim.clone());
            true
        }))
    }

    async fn record_result(&self, result: &ExecutionResult) -> Result<bool, LedgerError> {
        Ok(self.with_state(|state| {
            if state.results.contains_key(&result.request_id) {
                return false;
            }
            state.results.insert(result.request_id, result.clone());
            true
        }))
    }

    async fn find_result(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ExecutionResult>, LedgerError> {
        Ok(self.with_state(|state| state.results.get(request_id).cloned()))
    }

    async fn record_notification(
        &self,
        request_id: &RequestId,
        _kind: NotificationKind,
    ) -> Result<bool, LedgerError> {
        Ok(self.with_state(|state| state.notifications.insert(*request_id)))
    }

    async fn advance(&self, transition: &DeploymentTransition) -> Result<bool, LedgerError> {
        self.with_state(|state| {
            let Some(history) = state.transitions.get_mut(&transition.request_id) else {
                return Err(LedgerError::UnknownRequest(transition.request_id));
            };
            let latest = history.last().map(|last| last.to);
            if latest != transition.from {
                return Ok(false);
            }
            history.push(transition.clone());
            Ok(true)
        })
    }

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DeploymentTransition>, LedgerError> {
        Ok(self.with_state(|state| state.transitions.get(request_id).cloned().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{DeploymentLedger, InMemoryDeploymentLedger, Recorded};
    use crate::domain::approval::{ApprovalDecision, Decision};
    use crate::domain::execution::ExecutionClaim;
    use crate::domain::request::{DeploymentRequest, RequestId};
    use crate::domain::resource::ResourceKind;
    use crate::lifecycle::{
        DeploymentLifecycle, DeploymentState, DeploymentTransition, LifecycleEvent,
    };
    use crate::notify::NotificationKind;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            request_id: RequestId::new(),
            resource_type: ResourceKind::ResourceGroup,
            resource_name: "rg1".into(),
            resource_group: "rg1".into(),
            location: "eastus".into(),
            command: "az group create --name rg1 --location eastus".into(),
            requester_email: "dev@example.com".into(),
            requester_name: "Dev".into(),
            estimated_cost: Decimal::ZERO,
            justification: "testing".into(),
            session_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn request_is_recorded_once_with_initial_transition() {
        let ledger = InMemoryDeploymentLedger::new();
        let request = request();

        assert!(ledger.record_request(&request).await.expect("record"));
        assert!(!ledger.record_request(&request).await.expect("duplicate"));
        assert_eq!(
            ledger.current_state(&request.request_id).await.expect("state"),
            Some(DeploymentState::Submitted)
        );
    }

    #[tokio::test]
    async fn second_decision_returns_the_first() {
        let ledger = InMemoryDeploymentLedger::new();
        let request = request();
        ledger.record_request(&request).await.expect("record");

        let approve = ApprovalDecision::new(request.request_id, Decision::Approved, None);
        let reject = ApprovalDecision::new(request.request_id, Decision::Rejected, None);

        assert!(ledger.record_decision(&approve).await.expect("first").is_new());
        let second = ledger.record_decision(&reject).await.expect("second");
        assert!(matches!(second, Recorded::Existing(ref d) if d.decision == Decision::Approved));
    }

    #[tokio::test]
    async fn concurrent_claims_have_a_single_winner() {
        let ledger = Arc::new(InMemoryDeploymentLedger::new());
        let request_id = RequestId::new();

        let mut handles = Vec::new();
        for worker in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let claim = ExecutionClaim {
                    request_id,
                    claimed_by: format!("worker-{worker}"),
                    claimed_at: Utc::now(),
                };
                ledger.claim_execution(&claim).await.expect("claim")
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.claim_count(), 1);
    }

    #[tokio::test]
    async fn advance_refuses_stale_from_state() {
        let ledger = InMemoryDeploymentLedger::new();
        let lifecycle = DeploymentLifecycle::new();
        let request = request();
        ledger.record_request(&request).await.expect("record");

        let accepted = lifecycle
            .apply(DeploymentState::Submitted, LifecycleEvent::ChannelAccepted)
            .expect("accepted");
        assert!(ledger
            .advance(&DeploymentTransition::from_outcome(request.request_id, &accepted))
            .await
            .expect("advance"));

        let approved = lifecycle
            .apply(DeploymentState::AwaitingDecision, LifecycleEvent::DecisionApproved)
            .expect("approved");
        let timed_out = lifecycle
            .apply(DeploymentState::AwaitingDecision, LifecycleEvent::DecisionTimedOut)
            .expect("timed out");

        assert!(ledger
            .advance(&DeploymentTransition::from_outcome(request.request_id, &approved))
            .await
            .expect("first wins"));
        assert!(!ledger
            .advance(&DeploymentTransition::from_outcome(request.request_id, &timed_out))
            .await
            .expect("loser refused"));

        let history = ledger.list_transitions(&request.request_id).await.expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().map(|t| t.to), Some(DeploymentState::Approved));
    }

    #[tokio::test]
    async fn notification_is_recorded_once() {
        let ledger = InMemoryDeploymentLedger::new();
        let request_id = RequestId::new();

        assert!(ledger
            .record_notification(&request_id, NotificationKind::Succeeded)
            .await
            .expect("first"));
        assert!(!ledger
            .record_notification(&request_id, NotificationKind::Failed)
            .await
            .expect("second"));
    }
}
