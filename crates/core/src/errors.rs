use thiserror::Error;

use crate::domain::resource::{MissingParameters, ParameterField};
use crate::lifecycle::LifecycleTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    LifecycleTransition(#[from] LifecycleTransitionError),
    #[error(transparent)]
    MissingParameters(#[from] MissingParameters),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Why a deployment request did not reach `Verified`.
///
/// `Validation` is resolved inside the conversation by asking for the missing
/// fields; every other kind is terminal for the request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeploymentFailure {
    #[error("approval submission failed: {0}")]
    Submission(String),
    #[error("request is missing required fields: {missing_fields:?}")]
    Validation { missing_fields: Vec<ParameterField> },
    #[error("no approval decision arrived before the deadline")]
    DecisionTimeout,
    #[error("command execution failed: {output}")]
    Execution { output: String },
    #[error("command reported success but the resource does not exist")]
    Verification,
}

impl DeploymentFailure {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Submission(_) => "submission",
            Self::Validation { .. } => "validation",
            Self::DecisionTimeout => "decision_timeout",
            Self::Execution { .. } => "execution",
            Self::Verification => "verification",
        }
    }
}

impl From<MissingParameters> for DeploymentFailure {
    fn from(value: MissingParameters) -> Self {
        Self::Validation { missing_fields: value.missing }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Deployment(#[from] DeploymentFailure),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "No deployment request with that id exists.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: unassigned(),
            },
            ApplicationError::Deployment(failure @ DeploymentFailure::Validation { .. }) => {
                Self::BadRequest { message: failure.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Deployment(failure) => Self::ServiceUnavailable {
                message: failure.to_string(),
                correlation_id: unassigned(),
            },
            ApplicationError::NotFound(message) => {
                Self::NotFound { message, correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
