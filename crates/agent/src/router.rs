//! Second routing stage: a priority-ordered rule table that corrects the
//! LLM's function choice when the arguments clearly belong to another kind.

use serde_json::{Map, Value};
use tracing::info;

use azops_core::domain::resource::{ParameterField, ResourceKind};

type Arguments = Map<String, Value>;

#[derive(Clone, Copy, Debug)]
pub struct RoutingRule {
    pub name: &'static str,
    pub from: ResourceKind,
    pub condition: fn(&Arguments) -> bool,
    pub target: ResourceKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutedIntent {
    pub kind: ResourceKind,
    pub arguments: Arguments,
    /// Name of the rule that rerouted the call, if any.
    pub rule: Option<&'static str>,
}

fn present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

/// True when any key resolving to `field`, aliases included, carries a value.
fn has(arguments: &Arguments, field: ParameterField) -> bool {
    arguments
        .iter()
        .any(|(key, value)| ParameterField::from_key(key) == Some(field) && present(value))
}

fn names_a_disk(arguments: &Arguments) -> bool {
    arguments.iter().any(|(key, value)| {
        if ParameterField::from_key(key) != Some(ParameterField::Name) || !present(value) {
            return false;
        }
        let key = key.trim().to_ascii_lowercase();
        let named = value.as_str().map(str::to_ascii_lowercase).unwrap_or_default();
        key.starts_with("disk") || named.contains("disk")
    })
}

fn vm_call_looks_like_disk(arguments: &Arguments) -> bool {
    let vm_only = [ParameterField::Image, ParameterField::VmSize, ParameterField::AdminUsername];
    if vm_only.iter().any(|field| has(arguments, *field)) {
        return false;
    }
    has(arguments, ParameterField::SizeGb) || names_a_disk(arguments)
}

fn disk_call_looks_like_vm(arguments: &Arguments) -> bool {
    has(arguments, ParameterField::Image) || has(arguments, ParameterField::VmSize)
}

fn storage_call_looks_like_vnet(arguments: &Arguments) -> bool {
    has(arguments, ParameterField::AddressPrefix)
}

fn vnet_call_looks_like_storage(arguments: &Arguments) -> bool {
    has(arguments, ParameterField::StorageKind) && !has(arguments, ParameterField::AddressPrefix)
}

fn group_call_looks_like_vm(arguments: &Arguments) -> bool {
    has(arguments, ParameterField::VmSize) || has(arguments, ParameterField::Image)
}

pub const DEFAULT_RULES: &[RoutingRule] = &[
    RoutingRule {
        name: "vm_without_vm_fields_but_disk_like",
        from: ResourceKind::VirtualMachine,
        condition: vm_call_looks_like_disk,
        target: ResourceKind::Disk,
    },
    RoutingRule {
        name: "disk_with_vm_fields",
        from: ResourceKind::Disk,
        condition: disk_call_looks_like_vm,
        target: ResourceKind::VirtualMachine,
    },
    RoutingRule {
        name: "storage_with_address_prefix",
        from: ResourceKind::StorageAccount,
        condition: storage_call_looks_like_vnet,
        target: ResourceKind::VirtualNetwork,
    },
    RoutingRule {
        name: "vnet_with_storage_kind",
        from: ResourceKind::VirtualNetwork,
        condition: vnet_call_looks_like_storage,
        target: ResourceKind::StorageAccount,
    },
    RoutingRule {
        name: "group_with_vm_fields",
        from: ResourceKind::ResourceGroup,
        condition: group_call_looks_like_vm,
        target: ResourceKind::VirtualMachine,
    },
];

#[derive(Clone, Debug)]
pub struct IntentRouter {
    rules: Vec<RoutingRule>,
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl IntentRouter {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Applies the first matching rule. Without a match the LLM's choice stands.
    pub fn route(&self, chosen: ResourceKind, arguments: Arguments) -> RoutedIntent {
        let matched = self
            .rules
            .iter()
            .find(|rule| rule.from == chosen && (rule.condition)(&arguments));

        match matched {
            Some(rule) => {
                info!(
                    event_name = "agent.intent_rerouted",
                    rule = rule.name,
                    from = chosen.as_str(),
                    to = rule.target.as_str(),
                    "llm tool choice corrected by routing rule"
                );
                RoutedIntent { kind: rule.target, arguments, rule: Some(rule.name) }
            }
            None => RoutedIntent { kind: chosen, arguments, rule: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{IntentRouter, RoutingRule};
    use azops_core::domain::resource::ResourceKind;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn vm_call_with_only_disk_fields_becomes_disk() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "disk01", "resource_group": "rg1", "size_gb": 128 })),
        );

        assert_eq!(routed.kind, ResourceKind::Disk);
        assert_eq!(routed.rule, Some("vm_without_vm_fields_but_disk_like"));
        assert_eq!(routed.arguments["size_gb"], 128);
    }

    #[test]
    fn vm_call_naming_a_disk_becomes_disk_without_size() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "disk01", "resource_group": "rg1" })),
        );
        assert_eq!(routed.kind, ResourceKind::Disk);

        let by_key = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "disk_name": "data01", "resource_group": "rg1" })),
        );
        assert_eq!(by_key.kind, ResourceKind::Disk);
    }

    #[test]
    fn size_alias_counts_as_disk_field() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "data-store", "resource_group": "rg1", "disk_size_gb": 128 })),
        );
        assert_eq!(routed.kind, ResourceKind::Disk);
        assert_eq!(routed.arguments["disk_size_gb"], 128);
    }

    #[test]
    fn vm_alias_fields_keep_disk_named_vm() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "diskless-vm", "resource_group": "rg1", "os_image": "Ubuntu2204" })),
        );
        assert_eq!(routed.kind, ResourceKind::VirtualMachine);

        let plain = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "web01", "resource_group": "rg1" })),
        );
        assert_eq!(plain.kind, ResourceKind::VirtualMachine);
        assert_eq!(plain.rule, None);
    }

    #[test]
    fn vm_call_with_vm_fields_stays_vm() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::VirtualMachine,
            args(json!({ "name": "vm01", "resource_group": "rg1", "size_gb": 64, "image": "Ubuntu2204" })),
        );

        assert_eq!(routed.kind, ResourceKind::VirtualMachine);
        assert_eq!(routed.rule, None);
    }

    #[test]
    fn storage_and_network_mixups_are_corrected() {
        let router = IntentRouter::default();

        let vnet = router.route(
            ResourceKind::StorageAccount,
            args(json!({ "name": "net1", "address_prefix": "10.1.0.0/16" })),
        );
        assert_eq!(vnet.kind, ResourceKind::VirtualNetwork);

        let storage = router.route(
            ResourceKind::VirtualNetwork,
            args(json!({ "name": "stor1", "storage_kind": "StorageV2" })),
        );
        assert_eq!(storage.kind, ResourceKind::StorageAccount);

        let untouched = router.route(
            ResourceKind::VirtualNetwork,
            args(json!({ "name": "net1", "storage_kind": "StorageV2", "address_prefix": "10.0.0.0/8" })),
        );
        assert_eq!(untouched.kind, ResourceKind::VirtualNetwork);
    }

    #[test]
    fn blank_values_do_not_trigger_rules() {
        let router = IntentRouter::default();
        let routed = router.route(
            ResourceKind::Disk,
            args(json!({ "name": "disk01", "image": "  ", "vm_size": null })),
        );
        assert_eq!(routed.kind, ResourceKind::Disk);
    }

    #[test]
    fn first_matching_rule_wins() {
        fn always(_: &Map<String, Value>) -> bool {
            true
        }
        let router = IntentRouter::new(vec![
            RoutingRule {
                name: "first",
                from: ResourceKind::Disk,
                condition: always,
                target: ResourceKind::StorageAccount,
            },
            RoutingRule {
                name: "second",
                from: ResourceKind::Disk,
                condition: always,
                target: ResourceKind::VirtualNetwork,
            },
        ]);

        let routed = router.route(ResourceKind::Disk, Map::new());
        assert_eq!(routed.kind, ResourceKind::StorageAccount);
        assert_eq!(routed.rule, Some("first"));
    }
}
