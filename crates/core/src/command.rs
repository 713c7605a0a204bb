//! Azure CLI command generation.
//!
//! Turns a completed [`ResourceSpec`] into a single `az ... create` invocation
//! and builds the matching existence probe used for post-execution
//! verification.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::resource::{ResourceKind, ResourceRef, ResourceSpec};

pub const DEFAULT_CLI_PROGRAM: &str = "az";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliCommand {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("command is empty")]
    Empty,
    #[error("unterminated quote in command")]
    UnterminatedQuote,
}

impl CliCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn flag(self, name: &str, value: impl Into<String>) -> Self {
        self.arg(format!("--{name}")).arg(value)
    }

    /// Values following a `--flag`, in order.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let wanted = format!("--{name}");
        self.args
            .iter()
            .position(|arg| *arg == wanted)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Splits a rendered command line back into program and arguments.
    /// Understands the single and double quoting that [`CliCommand::render`]
    /// produces; no variable expansion or globbing is performed.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_token = false;
        let mut chars = line.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '\'' => {
                    in_token = true;
                    loop {
                        match chars.next() {
                            Some('\'') => break,
                            Some(next) => current.push(next),
                            None => return Err(CommandParseError::UnterminatedQuote),
                        }
                    }
                }
                '"' => {
                    in_token = true;
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => match chars.next() {
                                Some(next) => current.push(next),
                                None => return Err(CommandParseError::UnterminatedQuote),
                            },
                            Some(next) => current.push(next),
                            None => return Err(CommandParseError::UnterminatedQuote),
                        }
                    }
                }
                '\\' => {
                    in_token = true;
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ch if ch.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                ch => {
                    in_token = true;
                    current.push(ch);
                }
            }
        }
        if in_token {
            tokens.push(current);
        }

        let mut tokens = tokens.into_iter();
        let program = tokens.next().ok_or(CommandParseError::Empty)?;
        Ok(Self { program, args: tokens.collect() })
    }

    pub fn fingerprint(&self) -> String {
        blake3::hash(self.render().as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for CliCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+'));
    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

/// How the stdout of an existence probe is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeInterpretation {
    /// `az group exists` prints `true` or `false`.
    BooleanStdout,
    /// `az ... show --query id` prints the ARM resource id when present. A
    /// remote runner may wrap it as `{"id": "..."}`; anything else is absent.
    ResourceId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistenceProbe {
    pub command: CliCommand,
    pub interpretation: ProbeInterpretation,
}

impl ExistenceProbe {
    pub fn interpret(&self, exit_code: Option<i32>, stdout: &str) -> bool {
        if exit_code != Some(0) {
            return false;
        }
        match self.interpretation {
            ProbeInterpretation::BooleanStdout => stdout.trim().eq_ignore_ascii_case("true"),
            ProbeInterpretation::ResourceId => resource_id(stdout).is_some(),
        }
    }
}

fn resource_id(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim();
    let id = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(object)) => object.get("id")?.as_str()?.trim().to_string(),
        Ok(serde_json::Value::String(id)) => id.trim().to_string(),
        _ => trimmed.to_string(),
    };
    let looks_like_arm_id =
        id.to_ascii_lowercase().starts_with("/subscriptions/") && !id.contains(char::is_whitespace);
    looks_like_arm_id.then_some(id)
}

#[derive(Clone, Debug)]
pub struct CommandGenerator {
    program: String,
}

impl Default for CommandGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CLI_PROGRAM)
    }
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn create_command(&self, spec: &ResourceSpec) -> CliCommand {
        let base = CliCommand::new(&self.program);
        match spec {
            ResourceSpec::ResourceGroup(rg) => base
                .arg("group")
                .arg("create")
                .flag("name", &rg.name)
                .flag("location", &rg.location),
            ResourceSpec::VirtualMachine(vm) => base
                .arg("vm")
                .arg("create")
                .flag("name", &vm.name)
                .flag("resource-group", &vm.resource_group)
                .flag("image", &vm.image)
                .flag("size", &vm.vm_size)
                .flag("admin-username", &vm.admin_username)
                .flag("location", &vm.location)
                .arg("--generate-ssh-keys"),
            ResourceSpec::Disk(disk) => base
                .arg("disk")
                .arg("create")
                .flag("name", &disk.name)
                .flag("resource-group", &disk.resource_group)
                .flag("size-gb", disk.size_gb.to_string())
                .flag("sku", &disk.sku),
            ResourceSpec::StorageAccount(storage) => base
                .arg("storage")
                .arg("account")
                .arg("create")
                .flag("name", &storage.name)
                .flag("resource-group", &storage.resource_group)
                .flag("location", &storage.location)
                .flag("sku", &storage.sku)
                .flag("kind", &storage.kind),
            ResourceSpec::VirtualNetwork(vnet) => base
                .arg("network")
                .arg("vnet")
                .arg("create")
                .flag("name", &vnet.name)
                .flag("resource-group", &vnet.resource_group)
                .flag("address-prefix", &vnet.address_prefix)
                .flag("location", &vnet.location),
        }
    }

    pub fn existence_probe(&self, resource: &ResourceRef) -> ExistenceProbe {
        let base = CliCommand::new(&self.program);
        let show = |command: CliCommand| ExistenceProbe {
            command: command
                .arg("show")
                .flag("name", &resource.name)
                .flag("resource-group", &resource.resource_group)
                .flag("query", "id")
                .flag("output", "tsv"),
            interpretation: ProbeInterpretation::ResourceId,
        };

        match resource.kind {
            ResourceKind::ResourceGroup => ExistenceProbe {
                command: base.arg("group").arg("exists").flag("name", &resource.name),
                interpretation: ProbeInterpretation::BooleanStdout,
            },
            ResourceKind::VirtualMachine => show(base.arg("vm")),
            ResourceKind::Disk => show(base.arg("disk")),
            ResourceKind::StorageAccount => show(base.arg("storage").arg("account")),
            ResourceKind::VirtualNetwork => show(base.arg("network").arg("vnet")),
        }
    }
}
