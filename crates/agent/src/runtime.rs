use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use azops_core::collector::{CollectionStep, ParameterCollector};
use azops_core::command::CommandGenerator;
use azops_core::config::AppConfig;
use azops_core::cost::CostEstimator;
use azops_core::domain::request::{DeploymentRequest, DeploymentRequestBuilder, Requester};
use azops_core::domain::resource::{
    ParameterError, ParameterField, ResourceDefaults, ResourceDraft, ResourceKind,
};

use crate::conversation::{is_cancel, ConversationStore, PendingDraft};
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::llm::{ChatMessage, LlmClient, LlmError, LlmReply};
use crate::router::IntentRouter;
use crate::tools::{definitions, kind_for_tool, ToolDefinition};

const SYSTEM_PROMPT: &str = "You translate requests to create Azure resources into exactly one \
function call. Only fill arguments the user actually stated; never invent names, resource \
groups or sizes. If the request is not about creating one of the supported resources, answer \
briefly in plain text instead of calling a function.";

/// What the chat endpoint should show the user after one message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentReply {
    Question { prompt: String, field: ParameterField },
    Ready { request: Box<DeploymentRequest> },
    Refused { message: String, reason_code: &'static str },
    Cancelled { had_draft: bool },
    Message { text: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    guardrails: GuardrailPolicy,
    router: IntentRouter,
    collector: ParameterCollector,
    generator: CommandGenerator,
    cost: CostEstimator,
    conversations: ConversationStore,
    tools: Vec<ToolDefinition>,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, defaults: ResourceDefaults, cli_program: &str) -> Self {
        Self {
            llm,
            guardrails: GuardrailPolicy::default(),
            router: IntentRouter::default(),
            collector: ParameterCollector::new(defaults),
            generator: CommandGenerator::new(cli_program),
            cost: CostEstimator::new(),
            conversations: ConversationStore::new(),
            tools: definitions(),
        }
    }

    pub fn from_config(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, config.defaults.clone(), &config.execution.cli_path)
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_router(mut self, router: IntentRouter) -> Self {
        self.router = router;
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub async fn handle_message(
        &self,
        session_id: &str,
        requester: &Requester,
        text: &str,
    ) -> Result<AgentReply, AgentError> {
        let text = text.trim();

        if is_cancel(text) {
            let had_draft = self.conversations.clear(session_id).is_some();
            info!(event_name = "agent.draft_cancelled", session_id, had_draft, "conversation reset");
            return Ok(AgentReply::Cancelled { had_draft });
        }

        if let Some(PendingDraft { mut draft, asked }) = self.conversations.get(session_id) {
            return Ok(match self.collector.answer(&mut draft, asked, text) {
                Ok(step) => self.advance(session_id, requester, draft, step),
                Err(error) => invalid_answer(&error, draft.kind()),
            });
        }

        if let Some(refusal) =
            refusal(self.guardrails.evaluate(&GuardrailIntent::UserMessage { text: text.to_string() }))
        {
            return Ok(refusal);
        }

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(text)];
        let (name, arguments) = match self.llm.complete(&messages, &self.tools).await? {
            LlmReply::Text(text) => return Ok(AgentReply::Message { text }),
            LlmReply::ToolCall { name, arguments } => (name, arguments),
        };

        if let Some(refusal) =
            refusal(self.guardrails.evaluate(&GuardrailIntent::ToolCall { name: name.clone() }))
        {
            return Ok(refusal);
        }
        let Some(chosen) = kind_for_tool(&name) else {
            return Ok(AgentReply::Refused {
                message: format!("`{name}` is not a supported operation."),
                reason_code: "unknown_tool",
            });
        };

        let routed = self.router.route(chosen, arguments);
        let mut draft = ResourceDraft::new(routed.kind);
        match draft.apply_arguments(&routed.arguments) {
            Ok(ignored) if !ignored.is_empty() => debug!(
                event_name = "agent.arguments_ignored",
                kind = routed.kind.as_str(),
                ignored = ?ignored,
                "llm supplied arguments the resource does not take"
            ),
            Ok(_) => {}
            Err(error) => {
                let field = error_field(&error);
                self.conversations.put(session_id, PendingDraft { draft, asked: field });
                return Ok(invalid_answer(&error, routed.kind));
            }
        }

        let step = self.collector.next_step(&draft);
        Ok(self.advance(session_id, requester, draft, step))
    }

    fn advance(
        &self,
        session_id: &str,
        requester: &Requester,
        draft: ResourceDraft,
        step: CollectionStep,
    ) -> AgentReply {
        match step {
            CollectionStep::NeedsInput(question) => {
                self.conversations.put(session_id, PendingDraft { draft, asked: question.field });
                AgentReply::Question { prompt: question.prompt, field: question.field }
            }
            CollectionStep::Complete(spec) => {
                self.conversations.clear(session_id);
                let command = self.generator.create_command(&spec).render();
                let request = DeploymentRequestBuilder::new(spec.clone(), command, requester.clone())
                    .default_location(self.collector.defaults().location.clone())
                    .estimated_cost(self.cost.monthly_estimate(&spec))
                    .session_id(session_id)
                    .build();
                info!(
                    event_name = "agent.request_ready",
                    request_id = %request.request_id,
                    kind = request.resource_type.as_str(),
                    session_id,
                    "deployment request assembled"
                );
                AgentReply::Ready { request: Box::new(request) }
            }
        }
    }
}

fn refusal(decision: GuardrailDecision) -> Option<AgentReply> {
    match decision {
        GuardrailDecision::Allow => None,
        GuardrailDecision::Deny { reason_code, user_message, .. }
        | GuardrailDecision::Degrade { reason_code, user_message, .. } => {
            Some(AgentReply::Refused { message: user_message, reason_code })
        }
    }
}

fn error_field(error: &ParameterError) -> ParameterField {
    match error {
        ParameterError::Empty { field }
        | ParameterError::InvalidType { field, .. }
        | ParameterError::NotApplicable { field, .. } => *field,
    }
}

fn invalid_answer(error: &ParameterError, kind: ResourceKind) -> AgentReply {
    let field = error_field(error);
    AgentReply::Question { prompt: format!("{error}. {}", field.question(kind)), field }
}
