use azops_core::config::{AppConfig, ExecutionBackendKind, LlmProvider, LoadOptions};
use azops_db::connect_with_settings;
use serde::Serialize;

use crate::commands::block_on;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_credentials(&config));
            checks.push(check_approval_channel(&config));
            checks.push(check_cli_availability(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in
                ["llm_credentials", "approval_channel", "cli_availability", "database_connectivity"]
            {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let name = "llm_credentials";
    match (config.llm.provider, config.llm.api_key.is_some()) {
        (LlmProvider::Ollama, _) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: "ollama does not need an api key".to_string(),
        },
        (LlmProvider::AzureOpenAi, true) if config.llm.base_url.is_none() => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: "azure_openai needs llm.base_url (the resource endpoint)".to_string(),
        },
        (_, true) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("api key present for model `{}`", config.llm.model),
        },
        (provider, false) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("{provider:?} needs llm.api_key"),
        },
    }
}

fn check_approval_channel(config: &AppConfig) -> DoctorCheck {
    let name = "approval_channel";
    if !config.approval.enabled {
        return DoctorCheck::skipped(name, "approval disabled; requests are auto-approved");
    }

    let approval = &config.approval;
    let missing = match approval.transport {
        azops_core::config::DecisionTransport::Callback => None,
        azops_core::config::DecisionTransport::Polling => {
            approval.run_history_url.is_none().then_some("approval.run_history_url")
        }
        azops_core::config::DecisionTransport::Queue => {
            approval.queue_url.is_none().then_some("approval.queue_url")
        }
    };

    match missing {
        Some(field) => DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("transport `{}` needs {field}", approval.transport.as_str()),
        },
        None => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("channel configured; decisions by {}", approval.transport.as_str()),
        },
    }
}

fn check_cli_availability(config: &AppConfig) -> DoctorCheck {
    let name = "cli_availability";
    match config.execution.backend {
        ExecutionBackendKind::Remote => {
            if config.execution.remote_url.is_some() {
                DoctorCheck::skipped(name, "remote backend runs the cli elsewhere")
            } else {
                DoctorCheck {
                    name,
                    status: CheckStatus::Fail,
                    details: "remote backend needs execution.remote_url".to_string(),
                }
            }
        }
        ExecutionBackendKind::Local => match which::which(&config.execution.cli_path) {
            Ok(path) => DoctorCheck {
                name,
                status: CheckStatus::Pass,
                details: format!("found `{}`", path.display()),
            },
            Err(error) => DoctorCheck {
                name,
                status: CheckStatus::Fail,
                details: format!("`{}` not found: {error}", config.execution.cli_path),
            },
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let connected = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });
    let result = connected
        .map_err(|error| format!("failed to initialize async runtime: {error}"))
        .and_then(|connected| connected);

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
