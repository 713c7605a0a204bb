use thiserror::Error;

use crate::lifecycle::states::{
    DeploymentState, LifecycleAction, LifecycleEvent, TransitionOutcome,
};

/// Transition table for a deployment request.
#[derive(Clone, Debug, Default)]
pub struct DeploymentLifecycle;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleTransitionError {
    #[error("request is already terminal in {state:?}; {event:?} ignored")]
    AlreadyTerminal { state: DeploymentState, event: LifecycleEvent },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DeploymentState, event: LifecycleEvent },
}

impl DeploymentLifecycle {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> DeploymentState {
        DeploymentState::Submitted
    }

    pub fn apply(
        &self,
        current: DeploymentState,
        event: LifecycleEvent,
    ) -> Result<TransitionOutcome, LifecycleTransitionError> {
        use DeploymentState::{
            Approved, AwaitingDecision, Executing, ExecutionFailed, Rejected, Submitted, TimedOut,
            Verified,
        };
        use LifecycleAction::{
            AwaitDecision, ClaimExecution, NotifyRequester, RunCommand, VerifyResource,
        };
        use LifecycleEvent::{
            ApprovalBypassed, ChannelAccepted, CommandFailed, DecisionApproved, DecisionRejected,
            DecisionTimedOut, ExecutionStarted, VerificationFailed, VerificationSucceeded,
        };

        if current.is_terminal() {
            return Err(LifecycleTransitionError::AlreadyTerminal { state: current, event });
        }

        let (to, actions) = match (current, event) {
            (Submitted, ChannelAccepted) => (AwaitingDecision, vec![AwaitDecision]),
            (Submitted, ApprovalBypassed) => (Approved, vec![ClaimExecution]),
            (AwaitingDecision, DecisionApproved) => (Approved, vec![ClaimExecution]),
            (AwaitingDecision, DecisionRejected) => (Rejected, vec![NotifyRequester]),
            (AwaitingDecision, DecisionTimedOut) => (TimedOut, vec![NotifyRequester]),
            (Approved, ExecutionStarted) => (Executing, vec![RunCommand, VerifyResource]),
            (Executing, VerificationSucceeded) => (Verified, vec![NotifyRequester]),
            (Executing, CommandFailed) | (Executing, VerificationFailed) => {
                (ExecutionFailed, vec![NotifyRequester])
            }
            _ => return Err(LifecycleTransitionError::InvalidTransition { state: current, event }),
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }
}
