pub mod approval;
pub mod collector;
pub mod command;
pub mod config;
pub mod cost;
pub mod domain;
pub mod errors;
pub mod execution;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod orchestrator;

pub use approval::{
    ApprovalChannel, ApprovalSubmission, CallbackObserver, CallbackRegistry, ChannelError,
    DecisionObserver, DecisionOutcome, DecisionQueue, DecisionSource, ObserverError,
    PollingObserver, QueueObserver,
};
pub use collector::{ClarifyingQuestion, CollectionStep, ParameterCollector};
pub use command::{CliCommand, CommandGenerator, ExistenceProbe};
pub use config::AppConfig;
pub use cost::CostEstimator;
pub use domain::approval::{ApprovalDecision, Decision, DecisionRecord};
pub use domain::execution::{ExecutionResult, ExecutionStatus};
pub use domain::request::{DeploymentRequest, DeploymentRequestBuilder, RequestId, Requester};
pub use domain::resource::{
    ParameterField, ResourceDefaults, ResourceDraft, ResourceKind, ResourceRef, ResourceSpec,
};
pub use errors::{ApplicationError, DeploymentFailure, DomainError, InterfaceError};
pub use execution::{
    BackendError, CliVerifier, CommandOutput, ExecutionBackend, ExecutionContext, LocalCliBackend,
    ResourceVerifier,
};
pub use ledger::{DeploymentLedger, InMemoryDeploymentLedger, LedgerError};
pub use lifecycle::{DeploymentLifecycle, DeploymentState, DeploymentTransition};
pub use notify::{InMemoryNotifier, Notification, NotificationKind, Notifier};
pub use orchestrator::{
    ApprovalOrchestrator, DeploymentOutcome, DeploymentStatus, OrchestratorError,
    OrchestratorPorts, OrchestratorSettings, SubmissionReceipt,
};
