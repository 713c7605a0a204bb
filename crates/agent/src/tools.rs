use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use azops_core::domain::resource::{FieldType, ParameterField, ResourceKind};

/// One entry of the OpenAI-compatible `tools` array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn tool_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::ResourceGroup => "create_resource_group",
        ResourceKind::VirtualMachine => "create_virtual_machine",
        ResourceKind::Disk => "create_disk",
        ResourceKind::StorageAccount => "create_storage_account",
        ResourceKind::VirtualNetwork => "create_virtual_network",
    }
}

pub fn kind_for_tool(name: &str) -> Option<ResourceKind> {
    ResourceKind::ALL.into_iter().find(|kind| tool_name(*kind) == name.trim())
}

fn field_description(field: ParameterField) -> &'static str {
    match field {
        ParameterField::Name => "Name of the new resource",
        ParameterField::ResourceGroup => "Resource group to create the resource in",
        ParameterField::Location => "Azure region, for example eastus",
        ParameterField::SizeGb => "Disk size in GB",
        ParameterField::Sku => "SKU name, for example Standard_LRS",
        ParameterField::VmSize => "Virtual machine size, for example Standard_B2s",
        ParameterField::Image => "OS image alias, for example Ubuntu2204",
        ParameterField::AdminUsername => "Administrator user name",
        ParameterField::StorageKind => "Storage account kind, for example StorageV2",
        ParameterField::AddressPrefix => "Address space in CIDR form, for example 10.0.0.0/16",
    }
}

/// Builds the function definition for one resource kind from its schema.
pub fn definition(kind: ResourceKind) -> ToolDefinition {
    let schema = kind.schema();
    let mut properties = Map::new();
    for field in schema.required.iter().chain(schema.optional.iter()) {
        let json_type = match field.field_type() {
            FieldType::Text => "string",
            FieldType::PositiveInteger => "integer",
        };
        properties.insert(
            field.key().to_string(),
            json!({ "type": json_type, "description": field_description(*field) }),
        );
    }
    let required: Vec<&str> = schema.required.iter().map(|field| field.key()).collect();

    ToolDefinition {
        kind: "function".to_string(),
        function: FunctionSpec {
            name: tool_name(kind).to_string(),
            description: format!("Create an Azure {}", kind.display_name()),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        },
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    ResourceKind::ALL.into_iter().map(definition).collect()
}

#[cfg(test)]
mod tests {
    use super::{definition, definitions, kind_for_tool, tool_name};
    use azops_core::domain::resource::ResourceKind;

    #[test]
    fn every_kind_has_a_round_tripping_tool_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind_for_tool(tool_name(kind)), Some(kind));
        }
        assert_eq!(kind_for_tool("delete_disk"), None);
        assert_eq!(definitions().len(), ResourceKind::ALL.len());
    }

    #[test]
    fn disk_definition_lists_required_fields_and_integer_size() {
        let tool = definition(ResourceKind::Disk);
        let parameters = &tool.function.parameters;

        assert_eq!(tool.kind, "function");
        assert_eq!(tool.function.name, "create_disk");
        assert_eq!(parameters["required"], serde_json::json!(["name", "resource_group", "size_gb"]));
        assert_eq!(parameters["properties"]["size_gb"]["type"], "integer");
        assert_eq!(parameters["properties"]["sku"]["type"], "string");
        assert!(parameters["properties"].get("image").is_none());
    }
}
