use azops_core::domain::resource::ResourceKind;

use crate::tools::kind_for_tool;

const DESTRUCTIVE_VERBS: &[&str] =
    &["delete", "remove", "destroy", "deallocate", "purge", "wipe", "drop"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    /// Raw user text before it reaches the LLM.
    UserMessage { text: String },
    /// Function the LLM chose.
    ToolCall { name: String },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> String {
        match self {
            Self::UserMessage { .. } => "chat.user_message".to_string(),
            Self::ToolCall { name } => format!("tool.{name}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub allow_destructive_requests: bool,
    pub enabled_kinds: Vec<ResourceKind>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { allow_destructive_requests: false, enabled_kinds: ResourceKind::ALL.to_vec() }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::UserMessage { text } => match destructive_verb(text) {
                Some(_) if self.allow_destructive_requests => GuardrailDecision::Allow,
                Some(verb) => GuardrailDecision::Deny {
                    reason_code: "destructive_request_disallowed",
                    user_message: format!(
                        "I can only create resources. Requests to {verb} resources must go through the Azure portal or your operations team."
                    ),
                    fallback_path: "manual_operations",
                },
                None => GuardrailDecision::Allow,
            },
            GuardrailIntent::ToolCall { name } => match kind_for_tool(name) {
                Some(kind) if self.enabled_kinds.contains(&kind) => GuardrailDecision::Allow,
                Some(kind) => GuardrailDecision::Deny {
                    reason_code: "resource_kind_disabled",
                    user_message: format!(
                        "Creating a {} from chat is currently disabled.",
                        kind.display_name()
                    ),
                    fallback_path: "manual_operations",
                },
                None => GuardrailDecision::Degrade {
                    reason_code: "unknown_tool",
                    user_message: "I could not map that request to a supported resource. I can create resource groups, virtual machines, disks, storage accounts and virtual networks."
                        .to_string(),
                    fallback_path: "request_explicit_resource_kind",
                },
            },
        }
    }
}

fn destructive_verb(text: &str) -> Option<&'static str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            let word = word.to_ascii_lowercase();
            DESTRUCTIVE_VERBS.iter().copied().find(|verb| *verb == word)
        })
}
