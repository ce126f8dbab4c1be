//! Command-line flags, their environment fallbacks, and the immutable
//! [`Config`] resolved from them once at startup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::azure::DEFAULT_ARM_ENDPOINT;

pub const DEFAULT_LOCATION: &str = "westeurope";
pub const DEFAULT_VM_NAME: &str = "test-vm";
pub const DEFAULT_INSTANCE_SIZE: &str = "Standard_DC2as_v5";
pub const DEFAULT_ADMIN_USERNAME: &str = "azureuser";
/// Relative to the home directory.
pub const DEFAULT_SSH_PUBLIC_KEY: &str = ".ssh/id_ed25519.pub";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("cannot determine the home directory for the default SSH public key; pass --pub-key")]
    NoHomeDirectory,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// How the VM gets its network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NicMode {
    /// Create the NIC as its own resource first, then reference it from the VM.
    Standalone,
    /// Describe the NIC inside the VM request; ARM creates it with the VM.
    Inline,
}

#[derive(Parser, Debug)]
#[command(
    name = "launch-vm",
    version,
    about = "Create an Azure VM with its NIC and OS disk, then delete them again unless --keep"
)]
pub struct Args {
    /// Resource group name
    #[arg(short = 'g', long, env = "RESOURCE_GROUP")]
    pub resource_group: String,

    /// Subnet ID to attach the NIC to
    #[arg(short = 'n', long, env = "SUBNET_ID")]
    pub subnet_id: String,

    /// Image ID to use for the virtual machine
    #[arg(short = 'i', long, env = "IMAGE_ID")]
    pub image_id: String,

    /// Subscription ID
    #[arg(short = 's', long, env = "SUBSCRIPTION_ID")]
    pub subscription_id: String,

    /// Enable secure boot for the virtual machine
    #[arg(short = 'b', long)]
    pub secure_boot: bool,

    /// Enable confidential computing for the virtual machine
    #[arg(short = 'c', long)]
    pub confidential: bool,

    /// Location of the virtual machine
    #[arg(short = 'l', long, env = "LOCATION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Name of the virtual machine
    #[arg(long, env = "VM_NAME", default_value = DEFAULT_VM_NAME)]
    pub name: String,

    /// Instance size of the virtual machine
    #[arg(short = 'z', long, env = "INSTANCE_SIZE", default_value = DEFAULT_INSTANCE_SIZE)]
    pub size: String,

    /// Do not delete the resources after creating them
    #[arg(short = 'k', long)]
    pub keep: bool,

    /// SSH public key path [default: ~/.ssh/id_ed25519.pub]
    #[arg(short = 'p', long, env = "SSH_PUBLIC_KEY")]
    pub pub_key: Option<PathBuf>,

    /// Admin user created on the VM
    #[arg(long, env = "ADMIN_USERNAME", default_value = DEFAULT_ADMIN_USERNAME)]
    pub admin_username: String,

    /// Whether the NIC is created on its own or inline with the VM
    #[arg(long, env = "NIC_MODE", value_enum, default_value_t = NicMode::Standalone)]
    pub nic_mode: NicMode,

    /// OS disk size in GB (defaults to the image size)
    #[arg(long, env = "DISK_SIZE_GB")]
    pub disk_size_gb: Option<u32>,

    /// Azure Resource Manager endpoint
    #[arg(long, env = "ARM_ENDPOINT", default_value = DEFAULT_ARM_ENDPOINT)]
    pub arm_endpoint: String,

    /// Seconds to wait for each create or delete operation
    #[arg(long = "operation-timeout", env = "OPERATION_TIMEOUT_SECS", default_value_t = 1800)]
    pub operation_timeout_secs: u64,

    /// Seconds between polls when the service suggests none
    #[arg(long = "poll-interval", env = "POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Print the requests as JSON instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

/// Settings for one run. Built once by [`Config::resolve`] and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub resource_group: String,
    pub subnet_id: String,
    pub image_id: String,
    pub subscription_id: String,
    pub secure_boot: bool,
    pub confidential: bool,
    pub location: String,
    pub vm_name: String,
    pub instance_size: String,
    pub keep: bool,
    pub ssh_public_key_path: PathBuf,
    pub admin_username: String,
    pub nic_mode: NicMode,
    pub disk_size_gb: Option<u32>,
    pub arm_endpoint: String,
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
    pub dry_run: bool,
}

impl Config {
    /// Validates the parsed flags and fills in the SSH key default from the
    /// user's home directory.
    pub fn resolve(args: Args) -> Result<Self, ConfigError> {
        Self::resolve_with_home(args, dirs::home_dir())
    }

    pub fn resolve_with_home(args: Args, home: Option<PathBuf>) -> Result<Self, ConfigError> {
        let required = [
            ("resource-group", &args.resource_group),
            ("subnet-id", &args.subnet_id),
            ("image-id", &args.image_id),
            ("subscription-id", &args.subscription_id),
            ("name", &args.name),
            ("size", &args.size),
            ("location", &args.location),
            ("admin-username", &args.admin_username),
            ("arm-endpoint", &args.arm_endpoint),
        ];
        for (flag, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(flag));
            }
        }
        if args.operation_timeout_secs == 0 {
            return Err(ConfigError::Zero("operation-timeout"));
        }
        if args.poll_interval_secs == 0 {
            return Err(ConfigError::Zero("poll-interval"));
        }
        if args.disk_size_gb == Some(0) {
            return Err(ConfigError::Zero("disk-size-gb"));
        }

        let ssh_public_key_path = match args.pub_key {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => home
                .ok_or(ConfigError::NoHomeDirectory)?
                .join(DEFAULT_SSH_PUBLIC_KEY),
        };

        Ok(Config {
            resource_group: args.resource_group,
            subnet_id: args.subnet_id,
            image_id: args.image_id,
            subscription_id: args.subscription_id,
            secure_boot: args.secure_boot,
            confidential: args.confidential,
            location: args.location,
            vm_name: args.name,
            instance_size: args.size,
            keep: args.keep,
            ssh_public_key_path,
            admin_username: args.admin_username,
            nic_mode: args.nic_mode,
            disk_size_gb: args.disk_size_gb,
            arm_endpoint: args.arm_endpoint,
            operation_timeout: Duration::from_secs(args.operation_timeout_secs),
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            dry_run: args.dry_run,
        })
    }
}
