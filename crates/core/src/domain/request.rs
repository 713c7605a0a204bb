use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::resource::{ResourceKind, ResourceRef, ResourceSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub email: String,
    pub name: String,
}

/// Immutable record of a user's request to create a cloud resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub request_id: RequestId,
    pub resource_type: ResourceKind,
    pub resource_name: String,
    pub resource_group: String,
    pub location: String,
    pub command: String,
    pub requester_email: String,
    pub requester_name: String,
    pub estimated_cost: Decimal,
    pub justification: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeploymentRequest {
    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            kind: self.resource_type,
            name: self.resource_name.clone(),
            resource_group: self.resource_group.clone(),
        }
    }
}

/// Assembles a [`DeploymentRequest`] from a completed spec and its generated
/// command.
#[derive(Clone, Debug)]
pub struct DeploymentRequestBuilder {
    spec: ResourceSpec,
    command: String,
    requester: Requester,
    default_location: String,
    estimated_cost: Decimal,
    justification: Option<String>,
    session_id: Option<String>,
}

impl DeploymentRequestBuilder {
    pub fn new(spec: ResourceSpec, command: impl Into<String>, requester: Requester) -> Self {
        Self {
            spec,
            command: command.into(),
            requester,
            default_location: String::new(),
            estimated_cost: Decimal::ZERO,
            justification: None,
            session_id: None,
        }
    }

    pub fn default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }

    pub fn estimated_cost(mut self, cost: Decimal) -> Self {
        self.estimated_cost = cost;
        self
    }

    pub fn justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn build(self) -> DeploymentRequest {
        let kind = self.spec.kind();
        let location =
            self.spec.location().map(str::to_string).unwrap_or_else(|| self.default_location.clone());
        let justification = self.justification.unwrap_or_else(|| {
            format!("Requested via chat: create {} `{}`", kind.display_name(), self.spec.name())
        });

        DeploymentRequest {
            request_id: RequestId::new(),
            resource_type: kind,
            resource_name: self.spec.name().to_string(),
            resource_group: self.spec.resource_group().to_string(),
            location,
            command: self.command,
            requester_email: self.requester.email,
            requester_name: self.requester.name,
            estimated_cost: self.estimated_cost,
            justification,
            session_id: self.session_id,
            created_at: Utc::now(),
        }
    }
}
