//! Drives a deployment request from submission to a terminal state.
//!
//! Every state change goes through [`DeploymentLedger::advance`], so when
//! several observers or callbacks race for the same request only one of them
//! moves it forward and the rest see [`DeploymentOutcome::Ignored`]. Execution
//! additionally takes an insert-once claim before the backend is invoked.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::approval::{
    submit_with_retry, ApprovalChannel, ApprovalSubmission, DecisionObserver, DecisionOutcome,
    SubmitRetryPolicy,
};
use crate::command::CliCommand;
use crate::config::AppConfig;
use crate::domain::approval::{ApprovalDecision, Decision};
use crate::domain::execution::{ExecutionClaim, ExecutionResult, ExecutionStatus};
use crate::domain::request::{DeploymentRequest, RequestId};
use crate::errors::{ApplicationError, DeploymentFailure, DomainError};
use crate::execution::{ExecutionBackend, ExecutionContext, ResourceVerifier};
use crate::ledger::{DeploymentLedger, LedgerError};
use crate::lifecycle::{DeploymentLifecycle, DeploymentState, DeploymentTransition, LifecycleEvent};
use crate::notify::{NotificationKind, NotificationRenderer, Notifier, NotifyError};

pub const AUTO_APPROVER: &str = "auto-approval";

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub approval_enabled: bool,
    pub decision_timeout: Duration,
    pub submit_retry: SubmitRetryPolicy,
    pub execution_timeout: Duration,
    pub propagation_delay: Duration,
    pub worker_id: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            approval_enabled: config.approval.enabled,
            decision_timeout: config.approval.decision_timeout(),
            submit_retry: SubmitRetryPolicy {
                max_attempts: config.approval.submit_max_retries,
                backoff: config.approval.submit_backoff(),
            },
            execution_timeout: config.execution.timeout(),
            propagation_delay: config.execution.propagation_delay(),
            worker_id: format!("azops-{}", std::process::id()),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The collaborators an orchestrator talks to.
#[derive(Clone)]
pub struct OrchestratorPorts {
    pub ledger: Arc<dyn DeploymentLedger>,
    pub channel: Arc<dyn ApprovalChannel>,
    pub observer: Arc<dyn DecisionObserver>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub verifier: Arc<dyn ResourceVerifier>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown deployment request {0}")]
    UnknownRequest(RequestId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Failure(#[from] DeploymentFailure),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl From<OrchestratorError> for ApplicationError {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::UnknownRequest(id) => {
                Self::NotFound(format!("deployment request {id}"))
            }
            OrchestratorError::Ledger(error) => Self::Persistence(error.to_string()),
            OrchestratorError::Domain(error) => Self::Domain(error),
            OrchestratorError::Failure(failure) => Self::Deployment(failure),
            OrchestratorError::Notify(error) => Self::Configuration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub request_id: RequestId,
    pub state: DeploymentState,
    /// Channel attempts used; zero when approval is disabled.
    pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Verified { result: ExecutionResult },
    ExecutionFailed { result: ExecutionResult },
    Rejected { decision: ApprovalDecision },
    TimedOut,
    /// Another writer already moved the request; nothing was done.
    Ignored { state: Option<DeploymentState> },
}

impl DeploymentOutcome {
    pub fn state(&self) -> Option<DeploymentState> {
        match self {
            Self::Verified { .. } => Some(DeploymentState::Verified),
            Self::ExecutionFailed { .. } => Some(DeploymentState::ExecutionFailed),
            Self::Rejected { .. } => Some(DeploymentState::Rejected),
            Self::TimedOut => Some(DeploymentState::TimedOut),
            Self::Ignored { state } => *state,
        }
    }

    pub fn failure(&self) -> Option<DeploymentFailure> {
        match self {
            Self::ExecutionFailed { result }
                if result.status == ExecutionStatus::VerificationFailed =>
            {
                Some(DeploymentFailure::Verification)
            }
            Self::ExecutionFailed { result } => {
                Some(DeploymentFailure::Execution { output: result.output.clone() })
            }
            Self::TimedOut => Some(DeploymentFailure::DecisionTimeout),
            _ => None,
        }
    }
}

/// Everything the ledger knows about one request.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentStatus {
    pub request: DeploymentRequest,
    pub state: Option<DeploymentState>,
    pub decision: Option<ApprovalDecision>,
    pub result: Option<ExecutionResult>,
    pub transitions: Vec<DeploymentTransition>,
}

pub struct ApprovalOrchestrator {
    ports: OrchestratorPorts,
    renderer: NotificationRenderer,
    lifecycle: DeploymentLifecycle,
    settings: OrchestratorSettings,
}

impl ApprovalOrchestrator {
    pub fn new(
        ports: OrchestratorPorts,
        settings: OrchestratorSettings,
    ) -> Result<Self, OrchestratorError> {
        Ok(Self {
            ports,
            renderer: NotificationRenderer::new()?,
            lifecycle: DeploymentLifecycle::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn DeploymentLedger> {
        &self.ports.ledger
    }

    /// Records the request and hands it to the approval channel, or approves
    /// it directly when approval is disabled.
    pub async fn submit(
        &self,
        request: &DeploymentRequest,
    ) -> Result<SubmissionReceipt, OrchestratorError> {
        let request_id = request.request_id;
        if !self.ports.ledger.record_request(request).await? {
            return Err(DomainError::InvariantViolation(format!(
                "deployment request {request_id} was already submitted"
            ))
            .into());
        }

        info!(
            event_name = "deployment.submitted",
            request_id = %request_id,
            resource_type = request.resource_type.as_str(),
            resource_name = %request.resource_name,
            approval_enabled = self.settings.approval_enabled,
            "deployment request recorded"
        );

        if !self.settings.approval_enabled {
            let decision =
                ApprovalDecision::new(request_id, Decision::Approved, Some(AUTO_APPROVER.into()));
            self.ports.ledger.record_decision(&decision).await?;
            self.transition(request_id, DeploymentState::Submitted, LifecycleEvent::ApprovalBypassed)
                .await?;
            return Ok(SubmissionReceipt {
                request_id,
                state: DeploymentState::Approved,
                attempts: 0,
            });
        }

        let submission = ApprovalSubmission::from_request(request);
        let attempts = match submit_with_retry(
            self.ports.channel.as_ref(),
            &submission,
            self.settings.submit_retry,
        )
        .await
        {
            Ok(attempts) => attempts,
            Err(error) => {
                warn!(
                    event_name = "deployment.submission_failed",
                    request_id = %request_id,
                    error = %error,
                    "approval channel did not accept the request"
                );
                return Err(DeploymentFailure::Submission(error.to_string()).into());
            }
        };

        self.transition(request_id, DeploymentState::Submitted, LifecycleEvent::ChannelAccepted)
            .await?;
        Ok(SubmissionReceipt { request_id, state: DeploymentState::AwaitingDecision, attempts })
    }

    /// Waits for whatever the request needs next and carries it to a terminal
    /// state.
    pub async fn await_outcome(
        &self,
        request_id: &RequestId,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let request = self.load_request(request_id).await?;

        match self.ports.ledger.current_state(request_id).await? {
            Some(DeploymentState::AwaitingDecision) => {
                let deadline = Instant::now() + self.settings.decision_timeout;
                match self.ports.observer.await_decision(request_id, deadline).await {
                    Ok(DecisionOutcome::Decided(decision)) => self.apply_decision(decision).await,
                    Ok(DecisionOutcome::TimedOut) => self.expire(&request).await,
                    Err(error) => {
                        warn!(
                            event_name = "deployment.observer_failed",
                            request_id = %request_id,
                            transport = self.ports.observer.transport().as_str(),
                            error = %error,
                            "decision observer gave up; treating request as timed out"
                        );
                        self.expire(&request).await
                    }
                }
            }
            Some(DeploymentState::Approved) => self.execute_approved(&request).await,
            state => self.settled_outcome(request_id, state).await,
        }
    }

    /// Applies a human decision. Only the first decision for a request that is
    /// still awaiting one has any effect.
    ///
    /// The decision row is written before the state moves, so a request is
    /// never Approved without a stored approval. When a decision is already
    /// stored, that one is applied instead of `decision`.
    pub async fn apply_decision(
        &self,
        decision: ApprovalDecision,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let request = self.load_request(&decision.request_id).await?;
        let state = self.ports.ledger.current_state(&request.request_id).await?;
        if state != Some(DeploymentState::AwaitingDecision) {
            return Ok(self.ignore_decision(&decision, state));
        }

        let decision = self.ports.ledger.record_decision(&decision).await?.into_inner();
        let event = match decision.decision {
            Decision::Approved => LifecycleEvent::DecisionApproved,
            Decision::Rejected => LifecycleEvent::DecisionRejected,
        };

        if !self.transition(request.request_id, DeploymentState::AwaitingDecision, event).await? {
            let state = self.ports.ledger.current_state(&request.request_id).await?;
            return Ok(self.ignore_decision(&decision, state));
        }

        info!(
            event_name = "deployment.decided",
            request_id = %request.request_id,
            decision = decision.decision.as_str(),
            decided_by = decision.decided_by.as_deref().unwrap_or(""),
            "approval decision recorded"
        );

        if decision.is_approved() {
            return self.execute_approved(&request).await;
        }

        self.notify_once(&request, NotificationKind::Rejected, None, decision.decided_by.as_deref())
            .await?;
        Ok(DeploymentOutcome::Rejected { decision })
    }

    /// Runs the command of an approved request. A second caller loses the
    /// execution claim and gets [`DeploymentOutcome::Ignored`].
    pub async fn execute_approved(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let request_id = request.request_id;
        let state = self.ports.ledger.current_state(&request_id).await?;
        if state != Some(DeploymentState::Approved) {
            return Ok(DeploymentOutcome::Ignored { state });
        }
        let approved = self
            .ports
            .ledger
            .find_decision(&request_id)
            .await?
            .is_some_and(|decision| decision.is_approved());
        if !approved {
            return Err(DomainError::InvariantViolation(format!(
                "request {request_id} is Approved but has no recorded approval"
            ))
            .into());
        }

        let claim = ExecutionClaim {
            request_id,
            claimed_by: self.settings.worker_id.clone(),
            claimed_at: Utc::now(),
        };
        if !self.ports.ledger.claim_execution(&claim).await? {
            debug!(
                event_name = "deployment.claim_lost",
                request_id = %request_id,
                "execution already claimed"
            );
            let state = self.ports.ledger.current_state(&request_id).await?;
            return Ok(DeploymentOutcome::Ignored { state });
        }

        if !self.transition(request_id, DeploymentState::Approved, LifecycleEvent::ExecutionStarted).await? {
            return Err(DomainError::InvariantViolation(format!(
                "request {request_id} left Approved while its execution claim was held"
            ))
            .into());
        }

        let result = self.run_and_verify(request).await;
        let Some(result) = self.settle_execution(result).await? else {
            let state = self.ports.ledger.current_state(&request_id).await?;
            return Ok(DeploymentOutcome::Ignored { state });
        };

        info!(
            event_name = "deployment.executed",
            request_id = %request_id,
            status = result.status.as_str(),
            exit_code = result.exit_code,
            verified_exists = result.verified_exists,
            backend = self.ports.backend.name(),
            "execution finished"
        );

        if result.is_success() {
            self.notify_once(request, NotificationKind::Succeeded, Some(&result), None).await?;
            Ok(DeploymentOutcome::Verified { result })
        } else {
            self.notify_once(request, NotificationKind::Failed, Some(&result), None).await?;
            Ok(DeploymentOutcome::ExecutionFailed { result })
        }
    }

    /// Sends the terminal notification unless one was already recorded.
    /// Delivery failures are logged; the ledger row still counts.
    pub async fn notify_once(
        &self,
        request: &DeploymentRequest,
        kind: NotificationKind,
        result: Option<&ExecutionResult>,
        decided_by: Option<&str>,
    ) -> Result<bool, OrchestratorError> {
        if !self.ports.ledger.record_notification(&request.request_id, kind).await? {
            debug!(
                event_name = "deployment.notification_duplicate",
                request_id = %request.request_id,
                kind = kind.as_str(),
                "notification already sent"
            );
            return Ok(false);
        }

        let delivered = match self.renderer.render(kind, request, result, decided_by) {
            Ok(notification) => self.ports.notifier.deliver(&notification).await,
            Err(error) => Err(error),
        };
        if let Err(error) = delivered {
            warn!(
                event_name = "deployment.notification_failed",
                request_id = %request.request_id,
                kind = kind.as_str(),
                error = %error,
                "requester notification was not delivered"
            );
        }
        Ok(true)
    }

    /// Submits and then waits for the terminal outcome.
    pub async fn run(
        &self,
        request: &DeploymentRequest,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let receipt = self.submit(request).await?;
        self.await_outcome(&receipt.request_id).await
    }

    /// Continues the request's lifecycle on its own task.
    pub fn spawn_lifecycle(
        self: &Arc<Self>,
        request_id: RequestId,
    ) -> JoinHandle<Result<DeploymentOutcome, OrchestratorError>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = orchestrator.await_outcome(&request_id).await;
            if let Err(error) = &outcome {
                warn!(
                    event_name = "deployment.lifecycle_failed",
                    request_id = %request_id,
                    error = %error,
                    "deployment lifecycle task ended with an error"
                );
            }
            outcome
        })
    }

    pub async fn status(&self, request_id: &RequestId) -> Result<DeploymentStatus, OrchestratorError> {
        let request = self.load_request(request_id).await?;
        let transitions = self.ports.ledger.list_transitions(request_id).await?;
        Ok(DeploymentStatus {
            state: transitions.last().map(|transition| transition.to),
            decision: self.ports.ledger.find_decision(request_id).await?,
            result: self.ports.ledger.find_result(request_id).await?,
            request,
            transitions,
        })
    }

    /// Stores the result and moves the request out of Executing. A result
    /// that cannot be stored fails the request; a failed transition is retried
    /// once. None means another writer moved the request.
    async fn settle_execution(
        &self,
        result: ExecutionResult,
    ) -> Result<Option<ExecutionResult>, OrchestratorError> {
        let request_id = result.request_id;
        let result = match self.ports.ledger.record_result(&result).await {
            Ok(_) => result,
            Err(error) => {
                warn!(
                    event_name = "deployment.result_unrecorded",
                    request_id = %request_id,
                    status = result.status.as_str(),
                    error = %error,
                    "execution result could not be stored; failing the request"
                );
                ExecutionResult {
                    status: ExecutionStatus::Failed,
                    output: format!("{}\nexecution result could not be recorded: {error}", result.output),
                    ..result
                }
            }
        };
        let event = match result.status {
            ExecutionStatus::Success => LifecycleEvent::VerificationSucceeded,
            ExecutionStatus::VerificationFailed => LifecycleEvent::VerificationFailed,
            ExecutionStatus::Failed | ExecutionStatus::Timeout => LifecycleEvent::CommandFailed,
        };

        let advanced = match self.transition(request_id, DeploymentState::Executing, event).await {
            Ok(advanced) => advanced,
            Err(error) => {
                warn!(
                    event_name = "deployment.terminal_transition_retry",
                    request_id = %request_id,
                    lifecycle_event = event.as_str(),
                    error = %error,
                    "terminal transition failed; retrying"
                );
                self.transition(request_id, DeploymentState::Executing, event).await?
            }
        };
        Ok(advanced.then_some(result))
    }

    fn ignore_decision(
        &self,
        decision: &ApprovalDecision,
        state: Option<DeploymentState>,
    ) -> DeploymentOutcome {
        info!(
            event_name = "deployment.decision_ignored",
            request_id = %decision.request_id,
            decision = decision.decision.as_str(),
            state = state.map(|state| state.as_str()).unwrap_or("unknown"),
            "decision arrived for a request no longer awaiting one"
        );
        DeploymentOutcome::Ignored { state }
    }

    async fn expire(&self, request: &DeploymentRequest) -> Result<DeploymentOutcome, OrchestratorError> {
        let request_id = request.request_id;
        if !self
            .transition(request_id, DeploymentState::AwaitingDecision, LifecycleEvent::DecisionTimedOut)
            .await?
        {
            let state = self.ports.ledger.current_state(&request_id).await?;
            return Ok(DeploymentOutcome::Ignored { state });
        }

        info!(
            event_name = "deployment.timed_out",
            request_id = %request_id,
            timeout_secs = self.settings.decision_timeout.as_secs(),
            "no approval decision before the deadline"
        );
        self.notify_once(request, NotificationKind::TimedOut, None, None).await?;
        Ok(DeploymentOutcome::TimedOut)
    }

    async fn run_and_verify(&self, request: &DeploymentRequest) -> ExecutionResult {
        let request_id = request.request_id;
        let finish = |status, exit_code, output: String, verified_exists, fingerprint: String| {
            ExecutionResult {
                request_id,
                status,
                exit_code,
                output,
                verified_exists,
                command_fingerprint: fingerprint,
                completed_at: Utc::now(),
            }
        };

        let command = match CliCommand::parse(&request.command) {
            Ok(command) => command,
            Err(error) => {
                return finish(
                    ExecutionStatus::Failed,
                    None,
                    format!("stored command could not be parsed: {error}"),
                    false,
                    String::new(),
                );
            }
        };
        let fingerprint = command.fingerprint();
        let context = ExecutionContext { request_id, resource: request.resource_ref() };

        let output =
            match self.ports.backend.run(&command, &context, self.settings.execution_timeout).await {
                Ok(output) => output,
                Err(error) => {
                    return finish(ExecutionStatus::Failed, None, error.to_string(), false, fingerprint);
                }
            };

        if output.timed_out {
            return finish(ExecutionStatus::Timeout, None, output.combined(), false, fingerprint);
        }
        if !output.exited_successfully() {
            return finish(
                ExecutionStatus::Failed,
                output.exit_code,
                output.combined(),
                false,
                fingerprint,
            );
        }

        tokio::time::sleep(self.settings.propagation_delay).await;

        match self.ports.verifier.exists(&request_id, &context.resource).await {
            Ok(true) => {
                finish(ExecutionStatus::Success, output.exit_code, output.combined(), true, fingerprint)
            }
            Ok(false) => finish(
                ExecutionStatus::VerificationFailed,
                output.exit_code,
                output.combined(),
                false,
                fingerprint,
            ),
            Err(error) => finish(
                ExecutionStatus::VerificationFailed,
                output.exit_code,
                format!("{}\nexistence check failed: {error}", output.combined()),
                false,
                fingerprint,
            ),
        }
    }

    /// Applies `event` to `from` and appends the transition if the request is
    /// still in `from`.
    async fn transition(
        &self,
        request_id: RequestId,
        from: DeploymentState,
        event: LifecycleEvent,
    ) -> Result<bool, OrchestratorError> {
        let outcome = self.lifecycle.apply(from, event).map_err(DomainError::from)?;
        let advanced = self
            .ports
            .ledger
            .advance(&DeploymentTransition::from_outcome(request_id, &outcome))
            .await?;
        if advanced {
            debug!(
                event_name = "deployment.transition",
                request_id = %request_id,
                from = outcome.from.as_str(),
                to = outcome.to.as_str(),
                lifecycle_event = event.as_str(),
                "lifecycle advanced"
            );
        }
        Ok(advanced)
    }

    async fn load_request(&self, request_id: &RequestId) -> Result<DeploymentRequest, OrchestratorError> {
        self.ports
            .ledger
            .find_request(request_id)
            .await?
            .ok_or(OrchestratorError::UnknownRequest(*request_id))
    }

    async fn settled_outcome(
        &self,
        request_id: &RequestId,
        state: Option<DeploymentState>,
    ) -> Result<DeploymentOutcome, OrchestratorError> {
        let outcome = match state {
            Some(DeploymentState::Verified) => match self.ports.ledger.find_result(request_id).await? {
                Some(result) => DeploymentOutcome::Verified { result },
                None => DeploymentOutcome::Ignored { state },
            },
            Some(DeploymentState::ExecutionFailed) => {
                match self.ports.ledger.find_result(request_id).await? {
                    Some(result) => DeploymentOutcome::ExecutionFailed { result },
                    None => DeploymentOutcome::Ignored { state },
                }
            }
            Some(DeploymentState::Rejected) => {
                match self.ports.ledger.find_decision(request_id).await? {
                    Some(decision) => DeploymentOutcome::Rejected { decision },
                    None => DeploymentOutcome::Ignored { state },
                }
            }
            Some(DeploymentState::TimedOut) => DeploymentOutcome::TimedOut,
            other => DeploymentOutcome::Ignored { state: other },
        };
        Ok(outcome)
    }
}
