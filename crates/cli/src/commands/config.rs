use std::env;
use std::fs;
use std::path::Path;

use azops_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl ConfigField {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    vec![
        ConfigField::new("database.url", "AZOPS_DATABASE_URL", &config.database.url),
        ConfigField::new(
            "database.max_connections",
            "AZOPS_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        ConfigField::new(
            "database.timeout_secs",
            "AZOPS_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ConfigField::new("llm.provider", "AZOPS_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        ConfigField::new("llm.model", "AZOPS_LLM_MODEL", &config.llm.model),
        ConfigField::new(
            "llm.base_url",
            "AZOPS_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        ConfigField::new("llm.api_key", "AZOPS_LLM_API_KEY", redact_secret(config.llm.api_key.as_ref())),
        ConfigField::new("server.bind_address", "AZOPS_SERVER_BIND_ADDRESS", &config.server.bind_address),
        ConfigField::new("server.port", "AZOPS_SERVER_PORT", config.server.port.to_string()),
        ConfigField::new(
            "approval.enabled",
            "AZOPS_APPROVAL_ENABLED",
            config.approval.enabled.to_string(),
        ),
        ConfigField::new(
            "approval.channel_url",
            "AZOPS_APPROVAL_CHANNEL_URL",
            redact_url(config.approval.channel_url.as_deref()),
        ),
        ConfigField::new(
            "approval.transport",
            "AZOPS_APPROVAL_TRANSPORT",
            config.approval.transport.as_str(),
        ),
        ConfigField::new(
            "approval.decision_timeout_secs",
            "AZOPS_APPROVAL_DECISION_TIMEOUT_SECS",
            config.approval.decision_timeout_secs.to_string(),
        ),
        ConfigField::new(
            "approval.run_history_url",
            "AZOPS_APPROVAL_RUN_HISTORY_URL",
            redact_url(config.approval.run_history_url.as_deref()),
        ),
        ConfigField::new(
            "approval.queue_url",
            "AZOPS_APPROVAL_QUEUE_URL",
            redact_url(config.approval.queue_url.as_deref()),
        ),
        ConfigField::new(
            "approval.callback_secret",
            "AZOPS_APPROVAL_CALLBACK_SECRET",
            redact_secret(config.approval.callback_secret.as_ref()),
        ),
        ConfigField::new(
            "execution.backend",
            "AZOPS_EXECUTION_BACKEND",
            config.execution.backend.as_str(),
        ),
        ConfigField::new("execution.cli_path", "AZOPS_EXECUTION_CLI_PATH", &config.execution.cli_path),
        ConfigField::new(
            "execution.timeout_secs",
            "AZOPS_EXECUTION_TIMEOUT_SECS",
            config.execution.timeout_secs.to_string(),
        ),
        ConfigField::new(
            "execution.remote_url",
            "AZOPS_EXECUTION_REMOTE_URL",
            redact_url(config.execution.remote_url.as_deref()),
        ),
        ConfigField::new(
            "execution.remote_key",
            "AZOPS_EXECUTION_REMOTE_KEY",
            redact_secret(config.execution.remote_key.as_ref()),
        ),
        ConfigField::new(
            "notifications.webhook_url",
            "AZOPS_NOTIFICATIONS_WEBHOOK_URL",
            redact_url(config.notifications.webhook_url.as_deref()),
        ),
        ConfigField::new("defaults.location", "AZOPS_DEFAULTS_LOCATION", &config.defaults.location),
        ConfigField::new("logging.level", "AZOPS_LOGGING_LEVEL", &config.logging.level),
        ConfigField::new(
            "logging.format",
            "AZOPS_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

/// Workflow trigger URLs carry their SAS signature in the query string.
fn redact_url(url: Option<&str>) -> String {
    match url {
        None => "<unset>".to_string(),
        Some(url) => match url.split_once('?') {
            Some((base, _)) => format!("{base}?<redacted>"),
            None => url.to_string(),
        },
    }
}
