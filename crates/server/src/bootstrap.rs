use std::sync::Arc;
use std::time::Duration;

use azops_agent::{AgentRuntime, LlmClient, LlmError, OpenAiCompatibleClient};
use azops_core::approval::{
    ApprovalChannel, CallbackObserver, CallbackRegistry, DecisionObserver, PollingObserver,
    QueueObserver, CALLBACK_RETENTION,
};
use azops_core::command::CommandGenerator;
use azops_core::config::{
    AppConfig, ApprovalConfig, ConfigError, DecisionTransport, ExecutionBackendKind,
};
use azops_core::execution::{CliVerifier, ExecutionBackend, LocalCliBackend};
use azops_core::ledger::DeploymentLedger;
use azops_core::notify::{FanoutNotifier, InMemoryNotifier, Notifier};
use azops_core::orchestrator::{
    ApprovalOrchestrator, OrchestratorError, OrchestratorPorts, OrchestratorSettings,
};
use azops_db::{connect_with_settings, migrations, DbPool, SqlDeploymentLedger};
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::integrations::{
    http_client, DisabledChannel, HttpApprovalChannel, HttpDecisionQueue, RemoteFunctionBackend,
    RunHistorySource, WebhookNotifier,
};

const INTEGRATION_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("integration setup failed: {0}")]
    Integration(String),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    bootstrap_with_llm(config, llm).await
}

/// Connects storage, applies migrations and wires every port from config.
pub async fn bootstrap_with_llm(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        transport = config.approval.transport.as_str(),
        backend = config.execution.backend.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = http_client(INTEGRATION_HTTP_TIMEOUT)
        .map_err(|error| BootstrapError::Integration(error.to_string()))?;
    // Unclaimed callbacks outlive the decision window so a slow submit still finds them.
    let registry = Arc::new(CallbackRegistry::with_retention(
        config.approval.decision_timeout().saturating_mul(2).max(CALLBACK_RETENTION),
    ));
    let outbox = Arc::new(InMemoryNotifier::new());

    let ledger: Arc<dyn DeploymentLedger> = Arc::new(SqlDeploymentLedger::new(db_pool.clone()));
    let channel: Arc<dyn ApprovalChannel> = match &config.approval.channel_url {
        Some(url) => Arc::new(HttpApprovalChannel::new(client.clone(), url)),
        None => Arc::new(DisabledChannel),
    };
    let observer = build_observer(&config.approval, &client, &registry)?;
    let backend = build_backend(&config, &client)?;
    let verifier = Arc::new(CliVerifier::new(
        Arc::clone(&backend),
        CommandGenerator::new(&config.execution.cli_path),
        config.execution.verify_timeout(),
    ));

    let mut notifier = FanoutNotifier::new(vec![outbox.clone() as Arc<dyn Notifier>]);
    if let Some(url) = &config.notifications.webhook_url {
        notifier.push(Arc::new(WebhookNotifier::new(client.clone(), url)));
    }

    let orchestrator = Arc::new(ApprovalOrchestrator::new(
        OrchestratorPorts {
            ledger,
            channel,
            observer,
            backend,
            verifier,
            notifier: Arc::new(notifier),
        },
        OrchestratorSettings::from_config(&config),
    )?);
    let agent = Arc::new(AgentRuntime::from_config(&config, llm));

    let state = ApiState {
        agent,
        orchestrator,
        registry,
        outbox,
        transport: config.approval.transport,
        callback_secret: config.approval.callback_secret.clone(),
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        approval_enabled = config.approval.enabled,
        "application wired"
    );

    Ok(Application { config: Arc::new(config), db_pool, state })
}

fn build_observer(
    approval: &ApprovalConfig,
    client: &Client,
    registry: &Arc<CallbackRegistry>,
) -> Result<Arc<dyn DecisionObserver>, BootstrapError> {
    let missing = |field: &str| {
        BootstrapError::Integration(format!(
            "{field} is required for approval.transport = \"{}\"",
            approval.transport.as_str()
        ))
    };

    let observer: Arc<dyn DecisionObserver> = match approval.transport {
        DecisionTransport::Callback => Arc::new(CallbackObserver::new(Arc::clone(registry))),
        DecisionTransport::Polling => {
            let url = approval
                .run_history_url
                .as_deref()
                .ok_or_else(|| missing("approval.run_history_url"))?;
            Arc::new(PollingObserver::new(
                RunHistorySource::new(client.clone(), url),
                approval.poll_interval(),
                approval.observer_max_transport_errors,
            ))
        }
        DecisionTransport::Queue => {
            let url = approval.queue_url.as_deref().ok_or_else(|| missing("approval.queue_url"))?;
            Arc::new(QueueObserver::new(
                HttpDecisionQueue::new(client.clone(), url),
                approval.queue_receive_timeout(),
                approval.observer_max_transport_errors,
            ))
        }
    };
    Ok(observer)
}

fn build_backend(
    config: &AppConfig,
    client: &Client,
) -> Result<Arc<dyn ExecutionBackend>, BootstrapError> {
    let backend: Arc<dyn ExecutionBackend> = match config.execution.backend {
        ExecutionBackendKind::Local => Arc::new(LocalCliBackend::new()),
        ExecutionBackendKind::Remote => {
            let url = config.execution.remote_url.as_deref().ok_or_else(|| {
                BootstrapError::Integration(
                    "execution.remote_url is required for the remote backend".to_string(),
                )
            })?;
            Arc::new(RemoteFunctionBackend::new(
                client.clone(),
                url,
                config.execution.remote_key.clone(),
            ))
        }
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use azops_core::config::{
        AppConfig, ConfigOverrides, DecisionTransport, ExecutionBackendKind, LoadOptions,
    };

    use super::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn temp_database() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("azops.db").display());
        (dir, url)
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_approval_channel() {
        let (_dir, url) = temp_database();
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(url),
                approval_enabled: Some(true),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("approval.channel_url"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_wires_ledger_tables_and_auto_approval() {
        let (_dir, url) = temp_database();
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(url),
                approval_enabled: Some(false),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with approval disabled");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('deployment_request', 'approval_decision', 'deployment_transition')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("ledger tables should exist after bootstrap");
        assert_eq!(table_count, 3);
        assert!(!app.state.orchestrator.settings().approval_enabled);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn remote_backend_and_polling_need_their_urls() {
        let (_dir, url) = temp_database();
        let mut config = AppConfig::default();
        config.database.url = url;
        config.approval.enabled = false;
        config.approval.transport = DecisionTransport::Polling;
        config.execution.backend = ExecutionBackendKind::Remote;

        let error = bootstrap_with_config(config).await.err().expect("missing urls");
        assert!(matches!(error, BootstrapError::Integration(ref message) if message.contains("run_history_url")));
    }
}
