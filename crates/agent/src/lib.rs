//! Chat agent: turns one user message at a time into either a clarifying
//! question or a complete `DeploymentRequest`.
//!
//! Each message goes through these steps in order:
//! 1. **Guardrails** (`guardrails`) refuse destructive or unsupported requests.
//! 2. **Tool choice** (`llm`, `tools`): the LLM picks one `create_*` function.
//! 3. **Routing** (`router`) corrects mis-routed calls with an ordered rule table.
//! 4. **Collection** (`conversation`, `runtime`) asks for missing required
//!    fields one at a time and keeps the draft per session.
//!
//! The LLM is only a translator. Commands, defaults and cost estimates come
//! from `azops-core`.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod router;
pub mod runtime;
pub mod tools;

pub use llm::{LlmClient, LlmError, LlmReply, OpenAiCompatibleClient};
pub use router::{IntentRouter, RoutedIntent, RoutingRule};
pub use runtime::{AgentError, AgentReply, AgentRuntime};
