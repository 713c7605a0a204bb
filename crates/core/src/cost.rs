//! Static monthly cost estimates carried in the approval payload.
//!
//! Figures are list-price approximations in USD; they are shown to approvers
//! as an order of magnitude, not billed.

use rust_decimal::Decimal;

use crate::domain::resource::ResourceSpec;

const DEFAULT_VM_MONTHLY: Decimal = Decimal::from_parts(7008, 0, 0, false, 2);
const STORAGE_ACCOUNT_MONTHLY: Decimal = Decimal::from_parts(2000, 0, 0, false, 2);

#[derive(Clone, Debug, Default)]
pub struct CostEstimator;

impl CostEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn monthly_estimate(&self, spec: &ResourceSpec) -> Decimal {
        match spec {
            ResourceSpec::ResourceGroup(_) | ResourceSpec::VirtualNetwork(_) => Decimal::ZERO,
            ResourceSpec::Disk(disk) => {
                (disk_price_per_gb(&disk.sku) * Decimal::from(disk.size_gb)).round_dp(2)
            }
            ResourceSpec::VirtualMachine(vm) => vm_monthly(&vm.vm_size),
            ResourceSpec::StorageAccount(_) => STORAGE_ACCOUNT_MONTHLY,
        }
    }
}

fn disk_price_per_gb(sku: &str) -> Decimal {
    match sku.to_ascii_lowercase().as_str() {
        "standardssd_lrs" | "standardssd_zrs" => Decimal::new(75, 3),
        "premium_lrs" | "premium_zrs" | "premiumv2_lrs" => Decimal::new(135, 3),
        _ => Decimal::new(5, 2),
    }
}

fn vm_monthly(size: &str) -> Decimal {
    match size.to_ascii_lowercase().as_str() {
        "standard_b1s" => Decimal::new(759, 2),
        "standard_b2s" => Decimal::new(3037, 2),
        "standard_d2s_v3" => Decimal::new(7008, 2),
        "standard_d4s_v3" => Decimal::new(14016, 2),
        _ => DEFAULT_VM_MONTHLY,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CostEstimator;
    use crate::domain::resource::{
        DiskSpec, ResourceGroupSpec, ResourceSpec, VirtualMachineSpec,
    };

    #[test]
    fn disk_estimate_scales_with_size_and_sku() {
        let estimator = CostEstimator::new();
        let disk = |sku: &str| {
            ResourceSpec::Disk(DiskSpec {
                name: "disk01".into(),
                resource_group: "rg1".into(),
                size_gb: 128,
                sku: sku.into(),
            })
        };

        assert_eq!(estimator.monthly_estimate(&disk("Standard_LRS")), Decimal::new(640, 2));
        assert_eq!(estimator.monthly_estimate(&disk("Premium_LRS")), Decimal::new(1728, 2));
    }

    #[test]
    fn unknown_vm_size_uses_general_purpose_figure() {
        let vm = ResourceSpec::VirtualMachine(VirtualMachineSpec {
            name: "vm01".into(),
            resource_group: "rg1".into(),
            image: "Ubuntu2204".into(),
            vm_size: "Standard_E64s_v5".into(),
            admin_username: "azureuser".into(),
            location: "eastus".into(),
        });

        assert_eq!(CostEstimator::new().monthly_estimate(&vm), Decimal::new(7008, 2));
    }

    #[test]
    fn resource_groups_are_free() {
        let rg = ResourceSpec::ResourceGroup(ResourceGroupSpec {
            name: "rg1".into(),
            location: "eastus".into(),
        });
        assert_eq!(CostEstimator::new().monthly_estimate(&rg), Decimal::ZERO);
    }
}
