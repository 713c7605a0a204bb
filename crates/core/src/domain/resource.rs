use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Version of the parameter schemas below. Bump when a required field is added
/// or removed so stored drafts can be told apart.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    VirtualMachine,
    Disk,
    StorageAccount,
    VirtualNetwork,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        Self::ResourceGroup,
        Self::VirtualMachine,
        Self::Disk,
        Self::StorageAccount,
        Self::VirtualNetwork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource_group",
            Self::VirtualMachine => "virtual_machine",
            Self::Disk => "disk",
            Self::StorageAccount => "storage_account",
            Self::VirtualNetwork => "virtual_network",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "resource_group" | "group" | "rg" => Some(Self::ResourceGroup),
            "virtual_machine" | "vm" => Some(Self::VirtualMachine),
            "disk" | "managed_disk" => Some(Self::Disk),
            "storage_account" | "storage" => Some(Self::StorageAccount),
            "virtual_network" | "vnet" => Some(Self::VirtualNetwork),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource group",
            Self::VirtualMachine => "virtual machine",
            Self::Disk => "managed disk",
            Self::StorageAccount => "storage account",
            Self::VirtualNetwork => "virtual network",
        }
    }

    pub fn schema(&self) -> &'static ResourceSchema {
        match self {
            Self::ResourceGroup => &RESOURCE_GROUP_SCHEMA,
            Self::VirtualMachine => &VIRTUAL_MACHINE_SCHEMA,
            Self::Disk => &DISK_SCHEMA,
            Self::StorageAccount => &STORAGE_ACCOUNT_SCHEMA,
            Self::VirtualNetwork => &VIRTUAL_NETWORK_SCHEMA,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterField {
    Name,
    ResourceGroup,
    Location,
    SizeGb,
    Sku,
    VmSize,
    Image,
    AdminUsername,
    StorageKind,
    AddressPrefix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    PositiveInteger,
}

impl ParameterField {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ResourceGroup => "resource_group",
            Self::Location => "location",
            Self::SizeGb => "size_gb",
            Self::Sku => "sku",
            Self::VmSize => "vm_size",
            Self::Image => "image",
            Self::AdminUsername => "admin_username",
            Self::StorageKind => "storage_kind",
            Self::AddressPrefix => "address_prefix",
        }
    }

    /// Accepts the canonical key plus the spellings LLM tool calls tend to use.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().to_ascii_lowercase().replace('-', "_");
        let field = match normalized.as_str() {
            "name" | "resource_name" | "vm_name" | "disk_name" | "account_name" | "vnet_name" => {
                Self::Name
            }
            "resource_group" | "resourcegroup" | "resource_group_name" | "rg" | "group" => {
                Self::ResourceGroup
            }
            "location" | "region" => Self::Location,
            "size_gb" | "sizegb" | "disk_size_gb" | "disk_size" => Self::SizeGb,
            "sku" | "disk_sku" | "storage_sku" => Self::Sku,
            "vm_size" | "vmsize" | "size" => Self::VmSize,
            "image" | "os_image" => Self::Image,
            "admin_username" | "adminusername" | "username" => Self::AdminUsername,
            "storage_kind" | "kind" => Self::StorageKind,
            "address_prefix" | "addressprefix" | "address_space" | "cidr" => Self::AddressPrefix,
            _ => return None,
        };
        Some(field)
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::SizeGb => FieldType::PositiveInteger,
            _ => FieldType::Text,
        }
    }

    pub fn question(&self, kind: ResourceKind) -> String {
        let resource = kind.display_name();
        match self {
            Self::Name => format!("What name should the new {resource} have?"),
            Self::ResourceGroup => {
                format!("Which resource group should the {resource} be created in?")
            }
            Self::Location => format!("Which Azure region should the {resource} be created in?"),
            Self::SizeGb => format!("How large should the {resource} be, in GB?"),
            Self::Sku => format!("Which SKU should the {resource} use?"),
            Self::VmSize => "Which VM size should be used (for example Standard_B2s)?".to_string(),
            Self::Image => "Which OS image should the virtual machine run?".to_string(),
            Self::AdminUsername => "What admin username should the virtual machine use?".to_string(),
            Self::StorageKind => "Which storage account kind should be used?".to_string(),
            Self::AddressPrefix => {
                "Which address prefix should the virtual network use (for example 10.0.0.0/16)?"
                    .to_string()
            }
        }
    }

    /// Parses a free-text chat answer for this field.
    pub fn parse_text(&self, raw: &str) -> Result<FieldValue, ParameterError> {
        let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
        if trimmed.is_empty() {
            return Err(ParameterError::Empty { field: *self });
        }

        match self.field_type() {
            FieldType::Text => Ok(FieldValue::Text(trimmed.to_string())),
            FieldType::PositiveInteger => parse_positive_integer(*self, trimmed),
        }
    }

    /// Parses a JSON argument from an LLM function call for this field.
    pub fn parse_json(&self, value: &Value) -> Result<FieldValue, ParameterError> {
        match (self.field_type(), value) {
            (_, Value::String(text)) => self.parse_text(text),
            (FieldType::PositiveInteger, Value::Number(number)) => number
                .as_u64()
                .filter(|value| *value > 0)
                .and_then(|value| u32::try_from(value).ok())
                .map(FieldValue::Number)
                .ok_or(ParameterError::InvalidType { field: *self, expected: "positive integer" }),
            (FieldType::Text, Value::Number(number)) => Ok(FieldValue::Text(number.to_string())),
            (FieldType::PositiveInteger, _) => {
                Err(ParameterError::InvalidType { field: *self, expected: "positive integer" })
            }
            (FieldType::Text, _) => {
                Err(ParameterError::InvalidType { field: *self, expected: "string" })
            }
        }
    }
}

impl fmt::Display for ParameterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn parse_positive_integer(field: ParameterField, raw: &str) -> Result<FieldValue, ParameterError> {
    let lowered = raw.to_ascii_lowercase();
    let digits = lowered
        .trim_end_matches("gib")
        .trim_end_matches("gb")
        .trim_end_matches('g')
        .trim()
        .replace('_', "");

    digits
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .map(FieldValue::Number)
        .ok_or(ParameterError::InvalidType { field, expected: "positive integer" })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(u32),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("`{field}` must not be empty")]
    Empty { field: ParameterField },
    #[error("`{field}` must be a {expected}")]
    InvalidType { field: ParameterField, expected: &'static str },
    #[error("`{field}` is not a parameter of a {kind}")]
    NotApplicable { field: ParameterField, kind: ResourceKind },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("missing required parameters for {kind}: {missing:?}")]
pub struct MissingParameters {
    pub kind: ResourceKind,
    pub missing: Vec<ParameterField>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    pub version: u32,
    pub required: &'static [ParameterField],
    pub optional: &'static [ParameterField],
}

impl ResourceSchema {
    pub fn accepts(&self, field: ParameterField) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }
}

pub static RESOURCE_GROUP_SCHEMA: ResourceSchema = ResourceSchema {
    kind: ResourceKind::ResourceGroup,
    version: SCHEMA_VERSION,
    required: &[ParameterField::Name],
    optional: &[ParameterField::Location],
};

pub static VIRTUAL_MACHINE_SCHEMA: ResourceSchema = ResourceSchema {
    kind: ResourceKind::VirtualMachine,
    version: SCHEMA_VERSION,
    required: &[ParameterField::Name, ParameterField::ResourceGroup],
    optional: &[
        ParameterField::Image,
        ParameterField::VmSize,
        ParameterField::AdminUsername,
        ParameterField::Location,
    ],
};

pub static DISK_SCHEMA: ResourceSchema = ResourceSchema {
    kind: ResourceKind::Disk,
    version: SCHEMA_VERSION,
    required: &[ParameterField::Name, ParameterField::ResourceGroup, ParameterField::SizeGb],
    optional: &[ParameterField::Sku],
};

pub static STORAGE_ACCOUNT_SCHEMA: ResourceSchema = ResourceSchema {
    kind: ResourceKind::StorageAccount,
    version: SCHEMA_VERSION,
    required: &[ParameterField::Name, ParameterField::ResourceGroup],
    optional: &[ParameterField::Location, ParameterField::Sku, ParameterField::StorageKind],
};

pub static VIRTUAL_NETWORK_SCHEMA: ResourceSchema = ResourceSchema {
    kind: ResourceKind::VirtualNetwork,
    version: SCHEMA_VERSION,
    required: &[ParameterField::Name, ParameterField::ResourceGroup],
    optional: &[ParameterField::AddressPrefix, ParameterField::Location],
};

/// Fallback values for optional parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefaults {
    pub location: String,
    pub disk_sku: String,
    pub vm_size: String,
    pub vm_image: String,
    pub admin_username: String,
    pub storage_sku: String,
    pub storage_kind: String,
    pub vnet_address_prefix: String,
}

impl Default for ResourceDefaults {
    fn default() -> Self {
        Self {
            location: "eastus".to_string(),
            disk_sku: "Standard_LRS".to_string(),
            vm_size: "Standard_B2s".to_string(),
            vm_image: "Ubuntu2204".to_string(),
            admin_username: "azureuser".to_string(),
            storage_sku: "Standard_LRS".to_string(),
            storage_kind: "StorageV2".to_string(),
            vnet_address_prefix: "10.0.0.0/16".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupDraft {
    pub name: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineDraft {
    pub name: Option<String>,
    pub resource_group: Option<String>,
    pub image: Option<String>,
    pub vm_size: Option<String>,
    pub admin_username: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDraft {
    pub name: Option<String>,
    pub resource_group: Option<String>,
    pub size_gb: Option<u32>,
    pub sku: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccountDraft {
    pub name: Option<String>,
    pub resource_group: Option<String>,
    pub location: Option<String>,
    pub sku: Option<String>,
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkDraft {
    pub name: Option<String>,
    pub resource_group: Option<String>,
    pub address_prefix: Option<String>,
    pub location: Option<String>,
}

/// Partially collected parameters, one closed variant per resource kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDraft {
    ResourceGroup(ResourceGroupDraft),
    VirtualMachine(VirtualMachineDraft),
    Disk(DiskDraft),
    StorageAccount(StorageAccountDraft),
    VirtualNetwork(VirtualNetworkDraft),
}

impl ResourceDraft {
    pub fn new(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::ResourceGroup => Self::ResourceGroup(ResourceGroupDraft::default()),
            ResourceKind::VirtualMachine => Self::VirtualMachine(VirtualMachineDraft::default()),
            ResourceKind::Disk => Self::Disk(DiskDraft::default()),
            ResourceKind::StorageAccount => Self::StorageAccount(StorageAccountDraft::default()),
            ResourceKind::VirtualNetwork => Self::VirtualNetwork(VirtualNetworkDraft::default()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::ResourceGroup(_) => ResourceKind::ResourceGroup,
            Self::VirtualMachine(_) => ResourceKind::VirtualMachine,
            Self::Disk(_) => ResourceKind::Disk,
            Self::StorageAccount(_) => ResourceKind::StorageAccount,
            Self::VirtualNetwork(_) => ResourceKind::VirtualNetwork,
        }
    }

    /// Required fields that are still empty, in schema order.
    pub fn missing_required(&self) -> Vec<ParameterField> {
        use ParameterField::{Name, ResourceGroup, SizeGb};

        let checks: Vec<(ParameterField, bool)> = match self {
            Self::ResourceGroup(draft) => vec![(Name, draft.name.is_some())],
            Self::VirtualMachine(draft) => {
                vec![(Name, draft.name.is_some()), (ResourceGroup, draft.resource_group.is_some())]
            }
            Self::Disk(draft) => vec![
                (Name, draft.name.is_some()),
                (ResourceGroup, draft.resource_group.is_some()),
                (SizeGb, draft.size_gb.is_some()),
            ],
            Self::StorageAccount(draft) => {
                vec![(Name, draft.name.is_some()), (ResourceGroup, draft.resource_group.is_some())]
            }
            Self::VirtualNetwork(draft) => {
                vec![(Name, draft.name.is_some()), (ResourceGroup, draft.resource_group.is_some())]
            }
        };

        checks.into_iter().filter(|(_, present)| !present).map(|(field, _)| field).collect()
    }

    pub fn is_filled(&self, field: ParameterField) -> bool {
        match (self, field) {
            (Self::ResourceGroup(d), ParameterField::Name) => d.name.is_some(),
            (Self::ResourceGroup(d), ParameterField::Location) => d.location.is_some(),
            (Self::VirtualMachine(d), ParameterField::Name) => d.name.is_some(),
            (Self::VirtualMachine(d), ParameterField::ResourceGroup) => d.resource_group.is_some(),
            (Self::VirtualMachine(d), ParameterField::Image) => d.image.is_some(),
            (Self::VirtualMachine(d), ParameterField::VmSize) => d.vm_size.is_some(),
            (Self::VirtualMachine(d), ParameterField::AdminUsername) => d.admin_username.is_some(),
            (Self::VirtualMachine(d), ParameterField::Location) => d.location.is_some(),
            (Self::Disk(d), ParameterField::Name) => d.name.is_some(),
            (Self::Disk(d), ParameterField::ResourceGroup) => d.resource_group.is_some(),
            (Self::Disk(d), ParameterField::SizeGb) => d.size_gb.is_some(),
            (Self::Disk(d), ParameterField::Sku) => d.sku.is_some(),
            (Self::StorageAccount(d), ParameterField::Name) => d.name.is_some(),
            (Self::StorageAccount(d), ParameterField::ResourceGroup) => d.resource_group.is_some(),
            (Self::StorageAccount(d), ParameterField::Location) => d.location.is_some(),
            (Self::StorageAccount(d), ParameterField::Sku) => d.sku.is_some(),
            (Self::StorageAccount(d), ParameterField::StorageKind) => d.kind.is_some(),
            (Self::VirtualNetwork(d), ParameterField::Name) => d.name.is_some(),
            (Self::VirtualNetwork(d), ParameterField::ResourceGroup) => d.resource_group.is_some(),
            (Self::VirtualNetwork(d), ParameterField::AddressPrefix) => d.address_prefix.is_some(),
            (Self::VirtualNetwork(d), ParameterField::Location) => d.location.is_some(),
            _ => false,
        }
    }

    pub fn set(&mut self, field: ParameterField, value: FieldValue) -> Result<(), ParameterError> {
        let kind = self.kind();
        let not_applicable = ParameterError::NotApplicable { field, kind };
        let text = |value: FieldValue| match value {
            FieldValue::Text(text) => text,
            FieldValue::Number(number) => number.to_string(),
        };

        match (self, field) {
            (Self::ResourceGroup(d), ParameterField::Name) => d.name = Some(text(value)),
            (Self::ResourceGroup(d), ParameterField::Location) => d.location = Some(text(value)),
            (Self::VirtualMachine(d), ParameterField::Name) => d.name = Some(text(value)),
            (Self::VirtualMachine(d), ParameterField::ResourceGroup) => {
                d.resource_group = Some(text(value))
            }
            (Self::VirtualMachine(d), ParameterField::Image) => d.image = Some(text(value)),
            (Self::VirtualMachine(d), ParameterField::VmSize) => d.vm_size = Some(text(value)),
            (Self::VirtualMachine(d), ParameterField::AdminUsername) => {
                d.admin_username = Some(text(value))
            }
            (Self::VirtualMachine(d), ParameterField::Location) => d.location = Some(text(value)),
            (Self::Disk(d), ParameterField::Name) => d.name = Some(text(value)),
            (Self::Disk(d), ParameterField::ResourceGroup) => d.resource_group = Some(text(value)),
            (Self::Disk(d), ParameterField::SizeGb) => match value {
                FieldValue::Number(size) => d.size_gb = Some(size),
                FieldValue::Text(raw) => match field.parse_text(&raw)? {
                    FieldValue::Number(size) => d.size_gb = Some(size),
                    FieldValue::Text(_) => {
                        return Err(ParameterError::InvalidType {
                            field,
                            expected: "positive integer",
                        })
                    }
                },
            },
            (Self::Disk(d), ParameterField::Sku) => d.sku = Some(text(value)),
            (Self::StorageAccount(d), ParameterField::Name) => d.name = Some(text(value)),
            (Self::StorageAccount(d), ParameterField::ResourceGroup) => {
                d.resource_group = Some(text(value))
            }
            (Self::StorageAccount(d), ParameterField::Location) => d.location = Some(text(value)),
            (Self::StorageAccount(d), ParameterField::Sku) => d.sku = Some(text(value)),
            (Self::StorageAccount(d), ParameterField::StorageKind) => d.kind = Some(text(value)),
            (Self::VirtualNetwork(d), ParameterField::Name) => d.name = Some(text(value)),
            (Self::VirtualNetwork(d), ParameterField::ResourceGroup) => {
                d.resource_group = Some(text(value))
            }
            (Self::VirtualNetwork(d), ParameterField::AddressPrefix) => {
                d.address_prefix = Some(text(value))
            }
            (Self::VirtualNetwork(d), ParameterField::Location) => d.location = Some(text(value)),
            _ => return Err(not_applicable),
        }

        Ok(())
    }

    /// Merges LLM function-call arguments into the draft. Keys that do not map
    /// to a field of this resource kind are returned rather than rejected;
    /// values of the wrong type are an error.
    pub fn apply_arguments(
        &mut self,
        arguments: &Map<String, Value>,
    ) -> Result<Vec<String>, ParameterError> {
        let schema = self.kind().schema();
        let mut ignored = Vec::new();

        for (key, value) in arguments {
            if value.is_null() {
                continue;
            }
            let Some(field) = ParameterField::from_key(key).filter(|field| schema.accepts(*field))
            else {
                ignored.push(key.clone());
                continue;
            };
            let parsed = field.parse_json(value)?;
            self.set(field, parsed)?;
        }

        Ok(ignored)
    }

    pub fn complete(&self, defaults: &ResourceDefaults) -> Result<ResourceSpec, MissingParameters> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            return Err(MissingParameters { kind: self.kind(), missing });
        }

        let or_default = |value: &Option<String>, fallback: &str| {
            value.clone().unwrap_or_else(|| fallback.to_string())
        };
        let required = |value: &Option<String>| value.clone().unwrap_or_default();

        let spec = match self {
            Self::ResourceGroup(d) => ResourceSpec::ResourceGroup(ResourceGroupSpec {
                name: required(&d.name),
                location: or_default(&d.location, &defaults.location),
            }),
            Self::VirtualMachine(d) => ResourceSpec::VirtualMachine(VirtualMachineSpec {
                name: required(&d.name),
                resource_group: required(&d.resource_group),
                image: or_default(&d.image, &defaults.vm_image),
                vm_size: or_default(&d.vm_size, &defaults.vm_size),
                admin_username: or_default(&d.admin_username, &defaults.admin_username),
                location: or_default(&d.location, &defaults.location),
            }),
            Self::Disk(d) => ResourceSpec::Disk(DiskSpec {
                name: required(&d.name),
                resource_group: required(&d.resource_group),
                size_gb: d.size_gb.unwrap_or_default(),
                sku: or_default(&d.sku, &defaults.disk_sku),
            }),
            Self::StorageAccount(d) => ResourceSpec::StorageAccount(StorageAccountSpec {
                name: required(&d.name),
                resource_group: required(&d.resource_group),
                location: or_default(&d.location, &defaults.location),
                sku: or_default(&d.sku, &defaults.storage_sku),
                kind: or_default(&d.kind, &defaults.storage_kind),
            }),
            Self::VirtualNetwork(d) => ResourceSpec::VirtualNetwork(VirtualNetworkSpec {
                name: required(&d.name),
                resource_group: required(&d.resource_group),
                address_prefix: or_default(&d.address_prefix, &defaults.vnet_address_prefix),
                location: or_default(&d.location, &defaults.location),
            }),
        };

        Ok(spec)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupSpec {
    pub name: String,
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineSpec {
    pub name: String,
    pub resource_group: String,
    pub image: String,
    pub vm_size: String,
    pub admin_username: String,
    pub location: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub resource_group: String,
    pub size_gb: u32,
    pub sku: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccountSpec {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub sku: String,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkSpec {
    pub name: String,
    pub resource_group: String,
    pub address_prefix: String,
    pub location: String,
}

/// Fully collected parameters, ready for command generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    ResourceGroup(ResourceGroupSpec),
    VirtualMachine(VirtualMachineSpec),
    Disk(DiskSpec),
    StorageAccount(StorageAccountSpec),
    VirtualNetwork(VirtualNetworkSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::ResourceGroup(_) => ResourceKind::ResourceGroup,
            Self::VirtualMachine(_) => ResourceKind::VirtualMachine,
            Self::Disk(_) => ResourceKind::Disk,
            Self::StorageAccount(_) => ResourceKind::StorageAccount,
            Self::VirtualNetwork(_) => ResourceKind::VirtualNetwork,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ResourceGroup(spec) => &spec.name,
            Self::VirtualMachine(spec) => &spec.name,
            Self::Disk(spec) => &spec.name,
            Self::StorageAccount(spec) => &spec.name,
            Self::VirtualNetwork(spec) => &spec.name,
        }
    }

    /// The group the resource lands in; a resource group is its own group.
    pub fn resource_group(&self) -> &str {
        match self {
            Self::ResourceGroup(spec) => &spec.name,
            Self::VirtualMachine(spec) => &spec.resource_group,
            Self::Disk(spec) => &spec.resource_group,
            Self::StorageAccount(spec) => &spec.resource_group,
            Self::VirtualNetwork(spec) => &spec.resource_group,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::ResourceGroup(spec) => Some(&spec.location),
            Self::VirtualMachine(spec) => Some(&spec.location),
            Self::Disk(_) => None,
            Self::StorageAccount(spec) => Some(&spec.location),
            Self::VirtualNetwork(spec) => Some(&spec.location),
        }
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind(),
            name: self.name().to_string(),
            resource_group: self.resource_group().to_string(),
        }
    }
}

/// Identifies a deployed (or to-be-deployed) resource for existence checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub resource_group: String,
}
