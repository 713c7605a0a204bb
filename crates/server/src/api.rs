//! JSON API: chat, notifications outbox, approval callback and deployment
//! status.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use azops_agent::{AgentReply, AgentRuntime};
use azops_core::approval::signature::{self, SIGNATURE_HEADER};
use azops_core::approval::{CallbackRegistry, Delivery};
use azops_core::config::DecisionTransport;
use azops_core::domain::approval::DecisionRecord;
use azops_core::domain::request::{RequestId, Requester};
use azops_core::errors::{ApplicationError, InterfaceError};
use azops_core::lifecycle::DeploymentState;
use azops_core::notify::{InMemoryNotifier, Notification};
use azops_core::orchestrator::{
    ApprovalOrchestrator, DeploymentOutcome, DeploymentStatus, SubmissionReceipt,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<AgentRuntime>,
    pub orchestrator: Arc<ApprovalOrchestrator>,
    pub registry: Arc<CallbackRegistry>,
    pub outbox: Arc<InMemoryNotifier>,
    pub transport: DecisionTransport,
    pub callback_secret: Option<SecretString>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/{session_id}/notifications", get(notifications))
        .route("/api/v1/approvals/callback", post(approval_callback))
        .route("/api/v1/deployments/{request_id}", get(deployment_status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, detail: Option<String>, correlation_id: &str) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                detail,
                correlation_id: correlation_id.to_string(),
            },
        }
    }

    fn bad_request(detail: impl Into<String>, correlation_id: &str) -> Self {
        Self::from(InterfaceError::BadRequest {
            message: detail.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    fn application(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self::from(error.into().into_interface(correlation_id))
    }
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        let (status, detail) = match &error {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Some(message.clone()))
            }
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, Some(message.clone())),
            InterfaceError::ServiceUnavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(message.clone()))
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        warn!(
            event_name = "api.request_failed",
            correlation_id = %error.correlation_id(),
            status = status.as_u16(),
            error = %error,
            "request failed"
        );
        Self::new(status, error.user_message(), detail, error.correlation_id())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    pub user_email: String,
    #[serde(default)]
    pub user_name: String,
    /// Block until the request reaches a terminal state.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: AgentReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DeploymentOutcome>,
}

async fn chat(
    State(state): State<ApiState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = correlation_id();
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty", &correlation_id));
    }
    if !body.user_email.contains('@') {
        return Err(ApiError::bad_request("user_email must be an email address", &correlation_id));
    }

    let session_id = body
        .session_id
        .filter(|session_id| !session_id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let requester = Requester {
        name: if body.user_name.trim().is_empty() {
            body.user_email.clone()
        } else {
            body.user_name.clone()
        },
        email: body.user_email,
    };

    let reply = state
        .agent
        .handle_message(&session_id, &requester, &body.message)
        .await
        .map_err(|error| {
            ApiError::application(ApplicationError::Integration(error.to_string()), &correlation_id)
        })?;

    let (submission, outcome) = match &reply {
        AgentReply::Ready { request } => {
            let receipt = state
                .orchestrator
                .submit(request)
                .await
                .map_err(|error| ApiError::application(error, &correlation_id))?;
            info!(
                event_name = "api.request_submitted",
                correlation_id = %correlation_id,
                request_id = %receipt.request_id,
                state = receipt.state.as_str(),
                "deployment request submitted from chat"
            );

            // The lifecycle owns its own task, so a client that disconnects
            // while waiting only drops the join handle.
            let lifecycle = state.orchestrator.spawn_lifecycle(receipt.request_id);
            if body.wait {
                let outcome = lifecycle
                    .await
                    .map_err(|error| {
                        ApiError::from(InterfaceError::Internal {
                            message: format!("deployment lifecycle task failed: {error}"),
                            correlation_id: correlation_id.clone(),
                        })
                    })?
                    .map_err(|error| ApiError::application(error, &correlation_id))?;
                (Some(receipt), Some(outcome))
            } else {
                (Some(receipt), None)
            }
        }
        _ => (None, None),
    };

    Ok(Json(ChatResponse { session_id, reply, submission, outcome }))
}

async fn notifications(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Json<Vec<Notification>> {
    Json(state.outbox.drain(&session_id))
}

// ---------------------------------------------------------------------------
// Approval callback
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackResponse {
    pub request_id: String,
    pub status: String,
}

fn delivery_label(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Handed => "handed",
        Delivery::Buffered => "buffered",
        Delivery::Duplicate => "duplicate",
    }
}

async fn approval_callback(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CallbackResponse>), ApiError> {
    let correlation_id = correlation_id();

    if let Some(secret) = &state.callback_secret {
        let provided = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        let valid = provided
            .map(|header| signature::verify(secret.expose_secret().as_bytes(), &body, header))
            .unwrap_or(false);
        if !valid {
            warn!(
                event_name = "api.callback_signature_rejected",
                correlation_id = %correlation_id,
                signature_present = provided.is_some(),
                "approval callback failed signature check"
            );
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "The callback signature is missing or invalid.",
                None,
                &correlation_id,
            ));
        }
    }

    let record: DecisionRecord = serde_json::from_slice(&body)
        .map_err(|error| ApiError::bad_request(error.to_string(), &correlation_id))?;
    let decision = record
        .into_decision()
        .map_err(|error| ApiError::bad_request(error.to_string(), &correlation_id))?;
    let request_id = decision.request_id;

    let current = state
        .orchestrator
        .ledger()
        .current_state(&request_id)
        .await
        .map_err(|error| {
            ApiError::application(ApplicationError::Persistence(error.to_string()), &correlation_id)
        })?;

    match current {
        None => Err(ApiError::application(
            ApplicationError::NotFound(format!("deployment request {request_id}")),
            &correlation_id,
        )),
        // A callback can beat the Submitted -> AwaitingDecision write; the
        // callback observer picks the buffered decision up when it registers.
        Some(DeploymentState::Submitted) if state.transport == DecisionTransport::Callback => {
            let status = delivery_label(state.registry.deliver(decision));
            Ok(accepted(&correlation_id, request_id, status))
        }
        Some(DeploymentState::AwaitingDecision) => {
            let status = if state.transport == DecisionTransport::Callback {
                delivery_label(state.registry.deliver(decision))
            } else {
                let orchestrator = Arc::clone(&state.orchestrator);
                tokio::spawn(async move {
                    if let Err(error) = orchestrator.apply_decision(decision).await {
                        warn!(
                            event_name = "api.callback_apply_failed",
                            request_id = %request_id,
                            error = %error,
                            "applying callback decision failed"
                        );
                    }
                });
                "applied"
            };
            Ok(accepted(&correlation_id, request_id, status))
        }
        Some(other) => {
            if other.is_terminal() {
                state.registry.forget(&request_id);
            }
            Err(ApiError::new(
                StatusCode::CONFLICT,
                "The request is no longer waiting for a decision.",
                Some(format!("deployment request {request_id} is {}", other.as_str())),
                &correlation_id,
            ))
        }
    }
}

fn accepted(
    correlation_id: &str,
    request_id: RequestId,
    status: &'static str,
) -> (StatusCode, Json<CallbackResponse>) {
    info!(
        event_name = "api.callback_received",
        correlation_id = %correlation_id,
        request_id = %request_id,
        status,
        "approval decision received by callback"
    );
    let code = if status == "duplicate" { StatusCode::OK } else { StatusCode::ACCEPTED };
    (code, Json(CallbackResponse { request_id: request_id.to_string(), status: status.to_string() }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn deployment_status(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
) -> Result<Json<DeploymentStatus>, ApiError> {
    let correlation_id = correlation_id();
    let request_id = RequestId::parse(&request_id).ok_or_else(|| {
        ApiError::bad_request(format!("`{request_id}` is not a request id"), &correlation_id)
    })?;

    state
        .orchestrator
        .status(&request_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::application(error, &correlation_id))
}
