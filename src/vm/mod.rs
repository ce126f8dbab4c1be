//! # Virtual Machine Requests
//!
//! Turns a resolved [`Config`](crate::config::Config) into the ARM request
//! bodies for one VM and its network interface.
//!
//! ## Submodules
//! - `builder`: functions assembling each part of the request.
//! - `types`: the serialized request structures.

pub mod builder;
pub mod types;

pub use builder::{LaunchPlan, build_launch_plan};

/// Names of the resources that make up one VM. The NIC and disk names are
/// derived from the VM name, so nothing needs to be recorded between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmResources {
    pub vm_name: String,
    pub nic_name: String,
    pub disk_name: String,
}

impl VmResources {
    pub fn new(vm_name: &str) -> Self {
        VmResources {
            vm_name: vm_name.to_string(),
            nic_name: format!("{}-nic", vm_name),
            disk_name: format!("{}-disk", vm_name),
        }
    }
}
