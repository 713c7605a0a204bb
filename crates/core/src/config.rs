use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::resource::ResourceDefaults;

pub const DEFAULT_CONFIG_FILE: &str = "azops.toml";
pub const NESTED_CONFIG_FILE: &str = "config/azops.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub approval: ApprovalConfig,
    pub execution: ExecutionConfig,
    pub notifications: NotificationConfig,
    pub defaults: ResourceDefaults,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    /// When false, requests are approved by the system without contacting the
    /// approval channel.
    pub enabled: bool,
    pub channel_url: Option<String>,
    pub transport: DecisionTransport,
    pub poll_interval_secs: u64,
    pub decision_timeout_secs: u64,
    /// Run-history endpoint; `{request_id}` is substituted per request.
    pub run_history_url: Option<String>,
    pub queue_url: Option<String>,
    pub queue_receive_timeout_secs: u64,
    pub callback_secret: Option<SecretString>,
    pub submit_max_retries: u32,
    pub submit_backoff_ms: u64,
    pub observer_max_transport_errors: u32,
}

#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub backend: ExecutionBackendKind,
    pub cli_path: String,
    pub timeout_secs: u64,
    pub propagation_delay_secs: u64,
    pub verify_timeout_secs: u64,
    pub remote_url: Option<String>,
    pub remote_key: Option<SecretString>,
}

#[derive(Clone, Debug, Default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTransport {
    Callback,
    Polling,
    Queue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackendKind {
    Local,
    Remote,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub approval_enabled: Option<bool>,
    pub approval_channel_url: Option<String>,
    pub approval_transport: Option<DecisionTransport>,
    pub execution_backend: Option<ExecutionBackendKind>,
    pub cli_path: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://azops.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            approval: ApprovalConfig {
                enabled: true,
                channel_url: None,
                transport: DecisionTransport::Callback,
                poll_interval_secs: 10,
                decision_timeout_secs: 600,
                run_history_url: None,
                queue_url: None,
                queue_receive_timeout_secs: 30,
                callback_secret: None,
                submit_max_retries: 3,
                submit_backoff_ms: 2_000,
                observer_max_transport_errors: 5,
            },
            execution: ExecutionConfig {
                backend: ExecutionBackendKind::Local,
                cli_path: "az".to_string(),
                timeout_secs: 300,
                propagation_delay_secs: 10,
                verify_timeout_secs: 60,
                remote_url: None,
                remote_key: None,
            },
            notifications: NotificationConfig::default(),
            defaults: ResourceDefaults::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ApprovalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_secs)
    }

    pub fn queue_receive_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_receive_timeout_secs)
    }

    pub fn submit_backoff(&self) -> Duration {
        Duration::from_millis(self.submit_backoff_ms)
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "azure_openai" | "azure_open_ai" | "azure" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for DecisionTransport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "callback" => Ok(Self::Callback),
            "polling" | "poll" => Ok(Self::Polling),
            "queue" => Ok(Self::Queue),
            other => Err(ConfigError::Validation(format!(
                "unsupported approval transport `{other}` (expected callback|polling|queue)"
            ))),
        }
    }
}

impl std::str::FromStr for ExecutionBackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(ConfigError::Validation(format!(
                "unsupported execution backend `{other}` (expected local|remote)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl DecisionTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::Polling => "polling",
            Self::Queue => "queue",
        }
    }
}

impl ExecutionBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(approval) = patch.approval {
            if let Some(enabled) = approval.enabled {
                self.approval.enabled = enabled;
            }
            if let Some(channel_url) = approval.channel_url {
                self.approval.channel_url = Some(channel_url);
            }
            if let Some(transport) = approval.transport {
                self.approval.transport = transport;
            }
            if let Some(poll_interval_secs) = approval.poll_interval_secs {
                self.approval.poll_interval_secs = poll_interval_secs;
            }
            if let Some(decision_timeout_secs) = approval.decision_timeout_secs {
                self.approval.decision_timeout_secs = decision_timeout_secs;
            }
            if let Some(run_history_url) = approval.run_history_url {
                self.approval.run_history_url = Some(run_history_url);
            }
            if let Some(queue_url) = approval.queue_url {
                self.approval.queue_url = Some(queue_url);
            }
            if let Some(queue_receive_timeout_secs) = approval.queue_receive_timeout_secs {
                self.approval.queue_receive_timeout_secs = queue_receive_timeout_secs;
            }
            if let Some(callback_secret_value) = approval.callback_secret {
                self.approval.callback_secret = Some(secret_value(callback_secret_value));
            }
            if let Some(submit_max_retries) = approval.submit_max_retries {
                self.approval.submit_max_retries = submit_max_retries;
            }
            if let Some(submit_backoff_ms) = approval.submit_backoff_ms {
                self.approval.submit_backoff_ms = submit_backoff_ms;
            }
            if let Some(observer_max_transport_errors) = approval.observer_max_transport_errors {
                self.approval.observer_max_transport_errors = observer_max_transport_errors;
            }
        }

        if let Some(execution) = patch.execution {
            if let Some(backend) = execution.backend {
                self.execution.backend = backend;
            }
            if let Some(cli_path) = execution.cli_path {
                self.execution.cli_path = cli_path;
            }
            if let Some(timeout_secs) = execution.timeout_secs {
                self.execution.timeout_secs = timeout_secs;
            }
            if let Some(propagation_delay_secs) = execution.propagation_delay_secs {
                self.execution.propagation_delay_secs = propagation_delay_secs;
            }
            if let Some(verify_timeout_secs) = execution.verify_timeout_secs {
                self.execution.verify_timeout_secs = verify_timeout_secs;
            }
            if let Some(remote_url) = execution.remote_url {
                self.execution.remote_url = Some(remote_url);
            }
            if let Some(remote_key_value) = execution.remote_key {
                self.execution.remote_key = Some(secret_value(remote_key_value));
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(webhook_url) = notifications.webhook_url {
                self.notifications.webhook_url = Some(webhook_url);
            }
        }

        if let Some(defaults) = patch.defaults {
            let target = &mut self.defaults;
            let fields = [
                (defaults.location, &mut target.location),
                (defaults.disk_sku, &mut target.disk_sku),
                (defaults.vm_size, &mut target.vm_size),
                (defaults.vm_image, &mut target.vm_image),
                (defaults.admin_username, &mut target.admin_username),
                (defaults.storage_sku, &mut target.storage_sku),
                (defaults.storage_kind, &mut target.storage_kind),
                (defaults.vnet_address_prefix, &mut target.vnet_address_prefix),
            ];
            for (value, slot) in fields {
                if let Some(value) = value {
                    *slot = value;
                }
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AZOPS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AZOPS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("AZOPS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AZOPS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AZOPS_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("AZOPS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AZOPS_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AZOPS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("AZOPS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("AZOPS_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("AZOPS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AZOPS_SERVER_PORT") {
            self.server.port = parse_u16("AZOPS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AZOPS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AZOPS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("AZOPS_APPROVAL_ENABLED") {
            self.approval.enabled = parse_bool("AZOPS_APPROVAL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_CHANNEL_URL") {
            self.approval.channel_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_TRANSPORT") {
            self.approval.transport = value.parse()?;
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_POLL_INTERVAL_SECS") {
            self.approval.poll_interval_secs =
                parse_u64("AZOPS_APPROVAL_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_DECISION_TIMEOUT_SECS") {
            self.approval.decision_timeout_secs =
                parse_u64("AZOPS_APPROVAL_DECISION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_RUN_HISTORY_URL") {
            self.approval.run_history_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_QUEUE_URL") {
            self.approval.queue_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_APPROVAL_CALLBACK_SECRET") {
            self.approval.callback_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("AZOPS_EXECUTION_BACKEND") {
            self.execution.backend = value.parse()?;
        }
        if let Some(value) = read_env("AZOPS_EXECUTION_CLI_PATH") {
            self.execution.cli_path = value;
        }
        if let Some(value) = read_env("AZOPS_EXECUTION_TIMEOUT_SECS") {
            self.execution.timeout_secs = parse_u64("AZOPS_EXECUTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_EXECUTION_PROPAGATION_DELAY_SECS") {
            self.execution.propagation_delay_secs =
                parse_u64("AZOPS_EXECUTION_PROPAGATION_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("AZOPS_EXECUTION_REMOTE_URL") {
            self.execution.remote_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_EXECUTION_REMOTE_KEY") {
            self.execution.remote_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("AZOPS_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(value);
        }
        if let Some(value) = read_env("AZOPS_DEFAULTS_LOCATION") {
            self.defaults.location = value;
        }

        let log_level = read_env("AZOPS_LOGGING_LEVEL").or_else(|| read_env("AZOPS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("AZOPS_LOGGING_FORMAT").or_else(|| read_env("AZOPS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.approval_enabled {
            self.approval.enabled = enabled;
        }
        if let Some(channel_url) = overrides.approval_channel_url {
            self.approval.channel_url = Some(channel_url);
        }
        if let Some(transport) = overrides.approval_transport {
            self.approval.transport = transport;
        }
        if let Some(backend) = overrides.execution_backend {
            self.execution.backend = backend;
        }
        if let Some(cli_path) = overrides.cli_path {
            self.execution.cli_path = cli_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_approval(&self.approval)?;
        validate_execution(&self.execution)?;
        validate_notifications(&self.notifications)?;
        validate_defaults(&self.defaults)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn require_http_url(field: &str, value: Option<&str>, context: &str) -> Result<(), ConfigError> {
    match value.map(str::trim) {
        None | Some("") => {
            Err(ConfigError::Validation(format!("{field} is required when {context}")))
        }
        Some(url) if !is_http_url(url) => Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https:// (got `{url}`)"
        ))),
        Some(_) => Ok(()),
    }
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let api_key_missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    let base_url_missing =
        llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);

    match llm.provider {
        LlmProvider::OpenAi if api_key_missing => Err(ConfigError::Validation(
            "llm.api_key is required for the openai provider".to_string(),
        )),
        LlmProvider::AzureOpenAi if api_key_missing || base_url_missing => {
            Err(ConfigError::Validation(
                "llm.api_key and llm.base_url (the deployment endpoint) are required for the azure_openai provider".to_string(),
            ))
        }
        LlmProvider::Ollama if base_url_missing => Err(ConfigError::Validation(
            "llm.base_url is required for the ollama provider".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_approval(approval: &ApprovalConfig) -> Result<(), ConfigError> {
    if !approval.enabled {
        return Ok(());
    }

    require_http_url(
        "approval.channel_url",
        approval.channel_url.as_deref(),
        "approval.enabled is true (set the workflow HTTP trigger URL, or approval.enabled = false for auto-approval)",
    )?;

    if approval.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "approval.poll_interval_secs must be greater than zero".to_string(),
        ));
    }
    if approval.decision_timeout_secs < approval.poll_interval_secs {
        return Err(ConfigError::Validation(
            "approval.decision_timeout_secs must be at least approval.poll_interval_secs"
                .to_string(),
        ));
    }

    match approval.transport {
        DecisionTransport::Callback => {}
        DecisionTransport::Polling => {
            require_http_url(
                "approval.run_history_url",
                approval.run_history_url.as_deref(),
                "approval.transport = \"polling\"",
            )?;
            let has_placeholder = approval
                .run_history_url
                .as_deref()
                .map(|url| url.contains("{request_id}"))
                .unwrap_or(false);
            if !has_placeholder {
                return Err(ConfigError::Validation(
                    "approval.run_history_url must contain a `{request_id}` placeholder"
                        .to_string(),
                ));
            }
        }
        DecisionTransport::Queue => {
            require_http_url(
                "approval.queue_url",
                approval.queue_url.as_deref(),
                "approval.transport = \"queue\"",
            )?;
            if approval.queue_receive_timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "approval.queue_receive_timeout_secs must be greater than zero".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_execution(execution: &ExecutionConfig) -> Result<(), ConfigError> {
    if execution.timeout_secs == 0 || execution.timeout_secs > 3_600 {
        return Err(ConfigError::Validation(
            "execution.timeout_secs must be in range 1..=3600".to_string(),
        ));
    }
    if execution.verify_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "execution.verify_timeout_secs must be greater than zero".to_string(),
        ));
    }

    match execution.backend {
        ExecutionBackendKind::Local if execution.cli_path.trim().is_empty() => {
            Err(ConfigError::Validation(
                "execution.cli_path must name the Azure CLI binary (usually `az`)".to_string(),
            ))
        }
        ExecutionBackendKind::Remote => require_http_url(
            "execution.remote_url",
            execution.remote_url.as_deref(),
            "execution.backend = \"remote\"",
        ),
        ExecutionBackendKind::Local => Ok(()),
    }
}

fn validate_notifications(notifications: &NotificationConfig) -> Result<(), ConfigError> {
    if let Some(url) = &notifications.webhook_url {
        if !is_http_url(url) {
            return Err(ConfigError::Validation(
                "notifications.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_defaults(defaults: &ResourceDefaults) -> Result<(), ConfigError> {
    let required = [
        ("defaults.location", &defaults.location),
        ("defaults.disk_sku", &defaults.disk_sku),
        ("defaults.vm_size", &defaults.vm_size),
        ("defaults.vm_image", &defaults.vm_image),
        ("defaults.admin_username", &defaults.admin_username),
        ("defaults.storage_sku", &defaults.storage_sku),
        ("defaults.storage_kind", &defaults.storage_kind),
        ("defaults.vnet_address_prefix", &defaults.vnet_address_prefix),
    ];
    match required.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((field, _)) => Err(ConfigError::Validation(format!("{field} must not be empty"))),
        None => Ok(()),
    }
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    approval: Option<ApprovalPatch>,
    execution: Option<ExecutionPatch>,
    notifications: Option<NotificationPatch>,
    defaults: Option<DefaultsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalPatch {
    enabled: Option<bool>,
    channel_url: Option<String>,
    transport: Option<DecisionTransport>,
    poll_interval_secs: Option<u64>,
    decision_timeout_secs: Option<u64>,
    run_history_url: Option<String>,
    queue_url: Option<String>,
    queue_receive_timeout_secs: Option<u64>,
    callback_secret: Option<String>,
    submit_max_retries: Option<u32>,
    submit_backoff_ms: Option<u64>,
    observer_max_transport_errors: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutionPatch {
    backend: Option<ExecutionBackendKind>,
    cli_path: Option<String>,
    timeout_secs: Option<u64>,
    propagation_delay_secs: Option<u64>,
    verify_timeout_secs: Option<u64>,
    remote_url: Option<String>,
    remote_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DefaultsPatch {
    location: Option<String>,
    disk_sku: Option<String>,
    vm_size: Option<String>,
    vm_image: Option<String>,
    admin_username: Option<String>,
    storage_sku: Option<String>,
    storage_kind: Option<String>,
    vnet_address_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
