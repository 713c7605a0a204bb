//! OpenAI-compatible chat completions with function calling.
//!
//! Only the first choice is read. A `tool_calls` entry wins over text content;
//! arguments arrive as a JSON-encoded string and are decoded into an object.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use azops_core::config::{LlmConfig, LlmProvider};

use crate::tools::ToolDefinition;

const AZURE_API_VERSION: &str = "2024-06-01";
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: Some(content.into()) }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: Some(content.into()) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LlmReply {
    ToolCall { name: String, arguments: Map<String, Value> },
    Text(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response was malformed: {0}")]
    Malformed(String),
    #[error("llm is not configured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmReply, LlmError>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub fn parse_completion(body: &str) -> Result<LlmReply, LlmError> {
    let response: CompletionResponse =
        serde_json::from_str(body).map_err(|error| LlmError::Malformed(error.to_string()))?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::Malformed("response has no choices".to_string()))?;

    if let Some(call) = message.tool_calls.into_iter().next() {
        let arguments = match call.function.arguments {
            Value::String(raw) if raw.trim().is_empty() => Map::new(),
            Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    return Err(LlmError::Malformed(format!(
                        "arguments of `{}` are not a JSON object",
                        call.function.name
                    )))
                }
            },
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(LlmError::Malformed(format!(
                    "arguments of `{}` are not a JSON object",
                    call.function.name
                )))
            }
        };
        return Ok(LlmReply::ToolCall { name: call.function.name, arguments });
    }

    Ok(LlmReply::Text(message.content.unwrap_or_default()))
}

/// Client for OpenAI, Azure OpenAI and Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    provider: LlmProvider,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let endpoint = completions_endpoint(config)?;
        if config.provider != LlmProvider::Ollama && config.api_key.is_none() {
            return Err(LlmError::Configuration(format!(
                "llm.api_key is required for provider {:?}",
                config.provider
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &Value) -> Result<String, LlmError> {
        let mut request = self.http.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = match self.provider {
                LlmProvider::AzureOpenAi => request.header("api-key", key.expose_secret()),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    request.bearer_auth(key.expose_secret())
                }
            };
        }

        let response =
            request.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body: text });
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmReply, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "tools": tools,
            "tool_choice": "auto",
            "temperature": 0,
        });

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(text) => {
                    debug!(event_name = "agent.llm_completed", attempt, "llm completion received");
                    return parse_completion(&text);
                }
                Err(error) if is_retryable(&error) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "agent.llm_retry",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "llm call failed; retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Transport(_) => true,
        LlmError::Status { status, .. } => *status == 429 || *status >= 500,
        LlmError::Malformed(_) | LlmError::Configuration(_) => false,
    }
}

fn completions_endpoint(config: &LlmConfig) -> Result<String, LlmError> {
    let base = config.base_url.as_deref().map(|url| url.trim_end_matches('/').to_string());
    match config.provider {
        LlmProvider::OpenAi => Ok(format!(
            "{}/chat/completions",
            base.unwrap_or_else(|| "https://api.openai.com/v1".to_string())
        )),
        LlmProvider::Ollama => {
            let base = base.unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(format!("{}/v1/chat/completions", base.trim_end_matches("/v1")))
        }
        LlmProvider::AzureOpenAi => {
            let base = base.ok_or_else(|| {
                LlmError::Configuration("llm.base_url is required for azure_openai".to_string())
            })?;
            Ok(format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
                config.model
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use azops_core::config::{AppConfig, LlmProvider};

    use super::{completions_endpoint, parse_completion, LlmError, LlmReply, OpenAiCompatibleClient};

    #[test]
    fn tool_call_arguments_are_decoded_from_string() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "create_disk",
                            "arguments": "{\"name\":\"disk01\",\"resource_group\":\"rg1\",\"size_gb\":128}"
                        }
                    }]
                }
            }]
        }"#;

        let LlmReply::ToolCall { name, arguments } = parse_completion(body).expect("parse") else {
            panic!("expected tool call");
        };
        assert_eq!(name, "create_disk");
        assert_eq!(arguments["size_gb"], 128);
        assert_eq!(arguments["name"], "disk01");
    }

    #[test]
    fn plain_content_becomes_text_reply() {
        let body = r#"{"choices":[{"message":{"content":"Which resource would you like?"}}]}"#;
        assert_eq!(
            parse_completion(body).expect("parse"),
            LlmReply::Text("Which resource would you like?".to_string())
        );
    }

    #[test]
    fn non_object_arguments_and_empty_choices_are_malformed() {
        let bad_args = r#"{"choices":[{"message":{"tool_calls":[{"function":{"name":"create_disk","arguments":"[1,2]"}}]}}]}"#;
        assert!(matches!(parse_completion(bad_args), Err(LlmError::Malformed(_))));
        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn endpoint_depends_on_provider() {
        let mut config = AppConfig::default().llm;

        config.provider = LlmProvider::OpenAi;
        config.base_url = None;
        assert_eq!(
            completions_endpoint(&config).expect("openai"),
            "https://api.openai.com/v1/chat/completions"
        );

        config.provider = LlmProvider::Ollama;
        config.base_url = Some("http://gpu-box:11434/v1/".to_string());
        assert_eq!(
            completions_endpoint(&config).expect("ollama"),
            "http://gpu-box:11434/v1/chat/completions"
        );
        config.base_url = Some("http://localhost:11434".to_string());
        assert_eq!(
            completions_endpoint(&config).expect("ollama default"),
            "http://localhost:11434/v1/chat/completions"
        );

        config.provider = LlmProvider::AzureOpenAi;
        config.base_url = None;
        assert!(matches!(completions_endpoint(&config), Err(LlmError::Configuration(_))));
        config.base_url = Some("https://contoso.openai.azure.com".to_string());
        config.model = "gpt-4o".to_string();
        assert_eq!(
            completions_endpoint(&config).expect("azure"),
            "https://contoso.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn hosted_providers_require_an_api_key() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::OpenAi;
        config.api_key = None;
        assert!(matches!(
            OpenAiCompatibleClient::from_config(&config),
            Err(LlmError::Configuration(_))
        ));
    }
}
