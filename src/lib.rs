// # launch-vm: Create and Tear Down an Azure VM
//
// The crate resolves its settings from flags and the environment, builds the
// ARM requests for one Linux VM (plus its NIC and OS disk), creates the
// resources in dependency order and, unless told to keep them, deletes them
// again in reverse.

/// Shared HTTP client.
pub mod client;

/// Flags, environment fallbacks and the resolved run configuration.
pub mod config;

/// Azure Resource Manager: credentials, requests and long-running operations.
pub mod azure;

/// VM request payloads and the builders that assemble them.
pub mod vm;

/// The ordered create/delete state machine.
pub mod lifecycle;

pub use config::{Args, Config, NicMode};
pub use lifecycle::{Lifecycle, Outcome, ResourceApi, Stage};
pub use vm::{LaunchPlan, VmResources, build_launch_plan};
