//! Operator subcommands. Each prints one JSON document; failures carry a
//! class that also decides the process exit code.

pub mod config;
pub mod doctor;
pub mod migrate;
pub mod render;

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};

use azops_core::config::{AppConfig, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    ConfigValidation,
    UnknownResourceType,
    InvalidParameter,
    MissingParameters,
    RuntimeInit,
    DbConnectivity,
    Migration,
}

impl FailureClass {
    /// 2 for operator input problems, higher codes for environment failures.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::ConfigValidation
            | Self::UnknownResourceType
            | Self::InvalidParameter
            | Self::MissingParameters => 2,
            Self::RuntimeInit => 3,
            Self::DbConnectivity => 4,
            Self::Migration => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<FailureClass>,
    message: String,
    #[serde(flatten)]
    details: Map<String, Value>,
}

impl CommandResult {
    /// Success report; the fields of `details` sit next to `message`.
    pub fn ok(command: &str, message: impl Into<String>, details: impl Serialize) -> Self {
        let details = match serde_json::to_value(details) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        let report =
            Report { command, status: "ok", error_class: None, message: message.into(), details };
        Self { exit_code: 0, output: encode(&report) }
    }

    pub fn failed(command: &str, class: FailureClass, message: impl Into<String>) -> Self {
        let report = Report {
            command,
            status: "error",
            error_class: Some(class),
            message: message.into(),
            details: Map::new(),
        };
        Self { exit_code: class.exit_code(), output: encode(&report) }
    }
}

fn encode(report: &Report<'_>) -> String {
    serde_json::to_string(report).unwrap_or_else(|error| {
        serde_json::json!({ "command": report.command, "status": "error", "message": error.to_string() })
            .to_string()
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failed(
            command,
            FailureClass::ConfigValidation,
            format!("configuration issue: {error}"),
        )
    })
}

/// Runs `future` on a throwaway current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
