//! Offline dry run: builds the command and monthly estimate for a resource
//! from `key=value` parameters, without an LLM or approval.

use azops_core::command::CommandGenerator;
use azops_core::cost::CostEstimator;
use azops_core::domain::resource::{ResourceDraft, ResourceKind};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::commands::{load_config, CommandResult, FailureClass};

#[derive(Debug, Serialize)]
struct RenderDetails {
    resource_type: &'static str,
    cli: String,
    estimated_monthly_cost: String,
}

pub fn run(kind: &str, params: &[String]) -> CommandResult {
    let Some(kind) = ResourceKind::parse(kind) else {
        let known: Vec<&str> = ResourceKind::ALL.iter().map(ResourceKind::as_str).collect();
        return CommandResult::failed(
            "render",
            FailureClass::UnknownResourceType,
            format!("`{kind}` is not one of: {}", known.join(", ")),
        );
    };

    let config = match load_config("render") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let arguments = match parse_pairs(params) {
        Ok(arguments) => arguments,
        Err(message) => return CommandResult::failed("render", FailureClass::InvalidParameter, message),
    };

    let mut draft = ResourceDraft::new(kind);
    match draft.apply_arguments(&arguments) {
        Ok(ignored) if !ignored.is_empty() => {
            return CommandResult::failed(
                "render",
                FailureClass::InvalidParameter,
                format!("not parameters of a {}: {}", kind.display_name(), ignored.join(", ")),
            );
        }
        Ok(_) => {}
        Err(error) => {
            return CommandResult::failed("render", FailureClass::InvalidParameter, error.to_string());
        }
    }

    let spec = match draft.complete(&config.defaults) {
        Ok(spec) => spec,
        Err(missing) => {
            let keys: Vec<&str> = missing.missing.iter().map(|field| field.key()).collect();
            return CommandResult::failed(
                "render",
                FailureClass::MissingParameters,
                format!("missing required parameters: {}", keys.join(", ")),
            );
        }
    };

    let details = RenderDetails {
        resource_type: kind.as_str(),
        cli: CommandGenerator::new(&config.execution.cli_path).create_command(&spec).render(),
        estimated_monthly_cost: CostEstimator::new().monthly_estimate(&spec).to_string(),
    };
    CommandResult::ok("render", format!("dry run for {}", kind.display_name()), details)
}

fn parse_pairs(params: &[String]) -> Result<Map<String, Value>, String> {
    let mut arguments = Map::new();
    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            return Err(format!("`{param}` is not key=value"));
        };
        arguments.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(arguments)
}
