use std::env;
use std::sync::{Mutex, OnceLock};

use azops_cli::commands::{config, doctor, migrate, render};
use serde_json::Value;

const READY_ENV: &[(&str, &str)] =
    &[("AZOPS_DATABASE_URL", "sqlite::memory:"), ("AZOPS_APPROVAL_ENABLED", "false")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(READY_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["applied"], payload["known"]);
        assert!(payload.get("error_class").is_none());

        let tables: Vec<&str> = payload["tables"]
            .as_array()
            .map(|tables| tables.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        assert!(tables.contains(&"deployment_request"), "{payload}");
        assert!(tables.contains(&"deployment_transition"), "{payload}");
    });
}

#[test]
fn migrate_returns_config_failure_when_approval_has_no_channel() {
    with_env(&[("AZOPS_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("approval.channel_url"));
    });
}

#[test]
fn render_builds_disk_command_with_defaults_and_estimate() {
    with_env(READY_ENV, || {
        let params = ["name=disk01", "resource_group=rg1", "size_gb=128"].map(String::from);
        let result = render::run("disk", &params);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["resource_type"], "disk");
        assert_eq!(
            payload["cli"],
            "az disk create --name disk01 --resource-group rg1 --size-gb 128 --sku Standard_LRS"
        );
        assert_eq!(payload["estimated_monthly_cost"], "6.40");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn render_reports_missing_and_invalid_parameters() {
    with_env(READY_ENV, || {
        let missing = render::run("vm", &["name=vm01".to_string()]);
        assert_eq!(missing.exit_code, 2);
        let payload = parse_payload(&missing.output);
        assert_eq!(payload["error_class"], "missing_parameters");
        assert!(payload["message"].as_str().unwrap_or_default().contains("resource_group"));

        let invalid = render::run(
            "disk",
            &["name=disk01", "resource_group=rg1", "size_gb=big"].map(String::from),
        );
        assert_eq!(parse_payload(&invalid.output)["error_class"], "invalid_parameter");

        let unknown = render::run("database", &[]);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_resource_type");
    });
}

#[test]
fn doctor_passes_with_remote_backend_and_auto_approval() {
    with_env(
        &[
            ("AZOPS_DATABASE_URL", "sqlite::memory:"),
            ("AZOPS_APPROVAL_ENABLED", "false"),
            ("AZOPS_EXECUTION_BACKEND", "remote"),
            ("AZOPS_EXECUTION_REMOTE_URL", "http://localhost:7071/api/execute"),
        ],
        || {
            let payload = parse_payload(&doctor::run(true));
            assert_eq!(payload["overall_status"], "pass", "{payload}");

            let checks = payload["checks"].as_array().cloned().unwrap_or_default();
            let status_of = |name: &str| {
                checks
                    .iter()
                    .find(|check| check["name"] == name)
                    .map(|check| check["status"].clone())
                    .unwrap_or(Value::Null)
            };
            assert_eq!(status_of("database_connectivity"), "pass");
            assert_eq!(status_of("approval_channel"), "skipped");
            assert_eq!(status_of("cli_availability"), "skipped");
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_redacts_secrets_and_attributes_env_sources() {
    with_env(
        &[
            ("AZOPS_DATABASE_URL", "sqlite::memory:"),
            ("AZOPS_APPROVAL_CHANNEL_URL", "https://example.logic.azure.com/workflows/1?sig=topsecret"),
            ("AZOPS_APPROVAL_CALLBACK_SECRET", "hmac-key"),
        ],
        || {
            let output = config::run();
            assert!(!output.contains("topsecret"), "{output}");
            assert!(!output.contains("hmac-key"), "{output}");
            assert!(output.contains(
                "- approval.callback_secret = <redacted> (source: env (AZOPS_APPROVAL_CALLBACK_SECRET))"
            ));
            assert!(output.contains("- database.url = sqlite::memory: (source: env (AZOPS_DATABASE_URL))"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "AZOPS_DATABASE_URL",
        "AZOPS_DATABASE_MAX_CONNECTIONS",
        "AZOPS_DATABASE_TIMEOUT_SECS",
        "AZOPS_LLM_PROVIDER",
        "AZOPS_LLM_API_KEY",
        "AZOPS_LLM_BASE_URL",
        "AZOPS_LLM_MODEL",
        "AZOPS_APPROVAL_ENABLED",
        "AZOPS_APPROVAL_CHANNEL_URL",
        "AZOPS_APPROVAL_TRANSPORT",
        "AZOPS_APPROVAL_RUN_HISTORY_URL",
        "AZOPS_APPROVAL_QUEUE_URL",
        "AZOPS_APPROVAL_CALLBACK_SECRET",
        "AZOPS_EXECUTION_BACKEND",
        "AZOPS_EXECUTION_CLI_PATH",
        "AZOPS_EXECUTION_REMOTE_URL",
        "AZOPS_EXECUTION_REMOTE_KEY",
        "AZOPS_NOTIFICATIONS_WEBHOOK_URL",
        "AZOPS_DEFAULTS_LOCATION",
        "AZOPS_LOGGING_LEVEL",
        "AZOPS_LOGGING_FORMAT",
        "AZOPS_LOG_LEVEL",
        "AZOPS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
