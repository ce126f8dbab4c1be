//! # VM Request Builders
//!
//! Helpers that assemble each part of the VM creation request from a resolved
//! [`Config`]. [`build_launch_plan`] runs all of them up front so that local
//! failures, such as an unreadable SSH key, surface before any remote call.

use std::path::Path;

use anyhow::{Context, Result};

use crate::azure::client::{ResourceKind, resource_id};
use crate::azure::types::SubResource;
use crate::config::{Config, NicMode};
use crate::vm::VmResources;
use crate::vm::types::*;

/// Image IDs with this prefix name community gallery images.
pub const COMMUNITY_GALLERY_PREFIX: &str = "/CommunityGalleries";

/// Network API version required when NICs are described inline.
pub const INLINE_NETWORK_API_VERSION: &str = "2020-11-01";

const IP_CONFIGURATION_NAME: &str = "ip-config";

/// Every request needed to launch one VM.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub resources: VmResources,
    /// Set only when the NIC is created on its own.
    pub network_interface: Option<NetworkInterface>,
    pub virtual_machine: VirtualMachine,
}

/// Builds the complete plan. Reads the SSH public key; makes no remote call.
pub fn build_launch_plan(config: &Config) -> Result<LaunchPlan> {
    let resources = VmResources::new(&config.vm_name);
    let ssh = build_ssh_configuration(&config.admin_username, &config.ssh_public_key_path)?;

    let (network_interface, network_profile) = match config.nic_mode {
        NicMode::Standalone => {
            let nic_id = resource_id(
                &config.subscription_id,
                &config.resource_group,
                ResourceKind::NetworkInterface,
                &resources.nic_name,
            );
            (
                Some(build_network_interface(&config.location, &config.subnet_id)),
                build_network_profile_reference(&nic_id),
            )
        }
        NicMode::Inline => (
            None,
            NetworkProfile {
                network_api_version: Some(INLINE_NETWORK_API_VERSION.to_string()),
                network_interface_configurations: vec![build_network_config(
                    &resources.nic_name,
                    &config.subnet_id,
                )],
                network_interfaces: vec![],
            },
        ),
    };

    let virtual_machine = build_virtual_machine(config, &resources, ssh, network_profile);
    Ok(LaunchPlan {
        resources,
        network_interface,
        virtual_machine,
    })
}

/// Inline NIC configuration, deleted together with its VM.
pub fn build_network_config(nic_name: &str, subnet_id: &str) -> NetworkInterfaceConfiguration {
    NetworkInterfaceConfiguration {
        name: nic_name.to_string(),
        properties: NetworkInterfaceConfigurationProperties {
            primary: true,
            delete_option: DeleteOption::Delete,
            ip_configurations: vec![InlineIpConfiguration {
                name: IP_CONFIGURATION_NAME.to_string(),
                properties: InlineIpConfigurationProperties {
                    primary: true,
                    subnet: SubResource {
                        id: subnet_id.to_string(),
                    },
                },
            }],
        },
    }
}

/// Standalone NIC with one dynamic, primary IP configuration on the subnet.
pub fn build_network_interface(location: &str, subnet_id: &str) -> NetworkInterface {
    NetworkInterface {
        location: location.to_string(),
        properties: NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: IP_CONFIGURATION_NAME.to_string(),
                properties: IpConfigurationProperties {
                    primary: true,
                    private_ip_allocation_method: IpAllocationMethod::Dynamic,
                    subnet: SubResource {
                        id: subnet_id.to_string(),
                    },
                },
            }],
        },
    }
}

/// Network profile pointing at an existing NIC, deleted together with the VM.
pub fn build_network_profile_reference(nic_id: &str) -> NetworkProfile {
    NetworkProfile {
        network_api_version: None,
        network_interface_configurations: vec![],
        network_interfaces: vec![NetworkInterfaceReference {
            id: nic_id.to_string(),
            properties: NetworkInterfaceReferenceProperties {
                primary: true,
                delete_option: DeleteOption::Delete,
            },
        }],
    }
}

pub fn build_image_reference(image_id: &str) -> ImageReference {
    if image_id.starts_with(COMMUNITY_GALLERY_PREFIX) {
        ImageReference {
            id: None,
            community_gallery_image_id: Some(image_id.to_string()),
        }
    } else {
        ImageReference {
            id: Some(image_id.to_string()),
            community_gallery_image_id: None,
        }
    }
}

/// Authorizes the key at `key_path` for `user_name` on the guest.
pub fn build_ssh_configuration(user_name: &str, key_path: &Path) -> Result<SshConfiguration> {
    let key_data = std::fs::read_to_string(key_path)
        .with_context(|| format!("Failed to read SSH public key {}", key_path.display()))?;

    Ok(SshConfiguration {
        public_keys: vec![SshPublicKey {
            path: format!("/home/{}/.ssh/authorized_keys", user_name),
            key_data,
        }],
    })
}

pub fn build_os_disk(disk_name: &str, confidential: bool, disk_size_gb: Option<u32>) -> OsDisk {
    // Confidential VMs require the guest state to be encrypted.
    let security_profile = confidential.then_some(DiskSecurityProfile {
        security_encryption_type: SecurityEncryptionType::NonPersistedTpm,
    });

    OsDisk {
        name: disk_name.to_string(),
        create_option: DiskCreateOption::FromImage,
        caching: CachingType::ReadWrite,
        delete_option: DeleteOption::Delete,
        disk_size_gb,
        managed_disk: ManagedDiskParameters {
            storage_account_type: StorageAccountType::StandardLrs,
            security_profile,
        },
    }
}

pub fn build_security_profile(secure_boot: bool, confidential: bool) -> SecurityProfile {
    SecurityProfile {
        security_type: if confidential {
            SecurityType::ConfidentialVm
        } else {
            SecurityType::TrustedLaunch
        },
        uefi_settings: UefiSettings {
            secure_boot_enabled: secure_boot,
            v_tpm_enabled: true,
        },
    }
}

pub fn build_virtual_machine(
    config: &Config,
    resources: &VmResources,
    ssh: SshConfiguration,
    network_profile: NetworkProfile,
) -> VirtualMachine {
    VirtualMachine {
        location: config.location.clone(),
        identity: VirtualMachineIdentity {
            identity_type: ResourceIdentityType::None,
        },
        properties: VirtualMachineProperties {
            hardware_profile: HardwareProfile {
                vm_size: config.instance_size.clone(),
            },
            storage_profile: StorageProfile {
                image_reference: build_image_reference(&config.image_id),
                os_disk: build_os_disk(
                    &resources.disk_name,
                    config.confidential,
                    config.disk_size_gb,
                ),
            },
            os_profile: OsProfile {
                computer_name: resources.vm_name.clone(),
                admin_username: config.admin_username.clone(),
                linux_configuration: LinuxConfiguration {
                    disable_password_authentication: true,
                    ssh,
                },
            },
            security_profile: build_security_profile(config.secure_boot, config.confidential),
            diagnostics_profile: DiagnosticsProfile {
                boot_diagnostics: BootDiagnostics { enabled: true },
            },
            network_profile,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(key_path: PathBuf) -> Config {
        Config {
            resource_group: "rg1".to_string(),
            subnet_id: "/subs/x/subnet1".to_string(),
            image_id: "/subs/x/img1".to_string(),
            subscription_id: "sub1".to_string(),
            secure_boot: false,
            confidential: false,
            location: "westeurope".to_string(),
            vm_name: "vm1".to_string(),
            instance_size: "Standard_DC2as_v5".to_string(),
            keep: false,
            ssh_public_key_path: key_path,
            admin_username: "azureuser".to_string(),
            nic_mode: NicMode::Standalone,
            disk_size_gb: None,
            arm_endpoint: "https://management.azure.com".to_string(),
            operation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            dry_run: false,
        }
    }

    fn key_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ssh-ed25519 AAAAC3Nza me@host").unwrap();
        file
    }

    #[test]
    fn community_gallery_images() {
        let image = build_image_reference("/CommunityGalleries/g/Images/i/Versions/latest");
        assert_eq!(
            image.community_gallery_image_id.as_deref(),
            Some("/CommunityGalleries/g/Images/i/Versions/latest")
        );
        assert_eq!(image.id, None);

        let image = build_image_reference("/subscriptions/x/images/img1");
        assert_eq!(image.id.as_deref(), Some("/subscriptions/x/images/img1"));
        assert_eq!(image.community_gallery_image_id, None);

        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json, serde_json::json!({"id": "/subscriptions/x/images/img1"}));
    }

    #[test]
    fn trusted_launch_follows_secure_boot_flag() {
        for secure_boot in [false, true] {
            let profile = build_security_profile(secure_boot, false);
            assert_eq!(profile.security_type, SecurityType::TrustedLaunch);
            assert_eq!(profile.uefi_settings.secure_boot_enabled, secure_boot);
            assert!(profile.uefi_settings.v_tpm_enabled);
        }
    }

    #[test]
    fn confidential_mode_escalates_vm_and_disk() {
        let profile = build_security_profile(false, true);
        assert_eq!(profile.security_type, SecurityType::ConfidentialVm);
        assert!(profile.uefi_settings.v_tpm_enabled);

        let disk = build_os_disk("vm1-disk", true, None);
        assert_eq!(
            disk.managed_disk.security_profile,
            Some(DiskSecurityProfile {
                security_encryption_type: SecurityEncryptionType::NonPersistedTpm
            })
        );
        let json = serde_json::to_value(&disk).unwrap();
        assert_eq!(
            json["managedDisk"]["securityProfile"]["securityEncryptionType"],
            "NonPersistedTPM"
        );

        let plain = build_os_disk("vm1-disk", false, Some(30));
        assert_eq!(plain.managed_disk.security_profile, None);
        let json = serde_json::to_value(&plain).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "vm1-disk",
                "createOption": "FromImage",
                "caching": "ReadWrite",
                "deleteOption": "Delete",
                "diskSizeGB": 30,
                "managedDisk": {"storageAccountType": "Standard_LRS"}
            })
        );
    }

    #[test]
    fn ssh_key_is_authorized_for_user() {
        let key = key_file();
        let ssh = build_ssh_configuration("azureuser", key.path()).unwrap();
        assert_eq!(ssh.public_keys.len(), 1);
        assert_eq!(ssh.public_keys[0].path, "/home/azureuser/.ssh/authorized_keys");
        assert_eq!(ssh.public_keys[0].key_data, "ssh-ed25519 AAAAC3Nza me@host\n");
    }

    #[test]
    fn missing_ssh_key_fails_plan() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_launch_plan(&config(dir.path().join("absent.pub"))).unwrap_err();
        assert!(err.to_string().contains("absent.pub"));
    }

    #[test]
    fn standalone_plan_references_nic_by_id() {
        let key = key_file();
        let plan = build_launch_plan(&config(key.path().to_path_buf())).unwrap();
        assert_eq!(plan.resources, VmResources::new("vm1"));

        let nic = plan.network_interface.expect("standalone NIC");
        assert_eq!(nic.location, "westeurope");
        let ip = &nic.properties.ip_configurations[0].properties;
        assert_eq!(ip.subnet.id, "/subs/x/subnet1");
        assert_eq!(ip.private_ip_allocation_method, IpAllocationMethod::Dynamic);
        assert!(ip.primary);

        let vm = serde_json::to_value(&plan.virtual_machine).unwrap();
        assert_eq!(vm["location"], "westeurope");
        assert_eq!(vm["identity"]["type"], "None");
        assert_eq!(vm["properties"]["hardwareProfile"]["vmSize"], "Standard_DC2as_v5");
        assert_eq!(vm["properties"]["osProfile"]["computerName"], "vm1");
        assert_eq!(
            vm["properties"]["osProfile"]["linuxConfiguration"]["disablePasswordAuthentication"],
            true
        );
        assert_eq!(vm["properties"]["diagnosticsProfile"]["bootDiagnostics"]["enabled"], true);
        assert_eq!(vm["properties"]["storageProfile"]["osDisk"]["name"], "vm1-disk");
        assert_eq!(
            vm["properties"]["networkProfile"],
            serde_json::json!({
                "networkInterfaces": [{
                    "id": "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Network/networkInterfaces/vm1-nic",
                    "properties": {"primary": true, "deleteOption": "Delete"}
                }]
            })
        );
    }

    #[test]
    fn inline_plan_embeds_nic_configuration() {
        let key = key_file();
        let mut config = config(key.path().to_path_buf());
        config.nic_mode = NicMode::Inline;
        let plan = build_launch_plan(&config).unwrap();
        assert!(plan.network_interface.is_none());

        let profile = &plan.virtual_machine.properties.network_profile;
        assert_eq!(profile.network_api_version.as_deref(), Some(INLINE_NETWORK_API_VERSION));
        assert!(profile.network_interfaces.is_empty());
        let nic = &profile.network_interface_configurations[0];
        assert_eq!(nic.name, "vm1-nic");
        assert_eq!(nic.properties.delete_option, DeleteOption::Delete);
        assert_eq!(
            nic.properties.ip_configurations[0].properties.subnet.id,
            "/subs/x/subnet1"
        );
    }
}
