//! # ARM Virtual Machine Data Types
//!
//! Request bodies for `Microsoft.Compute/virtualMachines` and
//! `Microsoft.Network/networkInterfaces`, serialized as the JSON payload of a
//! create-or-update (`PUT`) call. Only the fields this tool sets are modelled;
//! unset optional fields are left out of the payload entirely.

use serde::{Deserialize, Serialize};

use crate::azure::types::SubResource;

/// Body of a virtual machine create-or-update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// Azure region, e.g. `westeurope`.
    pub location: String,
    /// Managed identity assigned to the VM.
    pub identity: VirtualMachineIdentity,
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineIdentity {
    #[serde(rename = "type")]
    pub identity_type: ResourceIdentityType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceIdentityType {
    None,
    SystemAssigned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineProperties {
    #[serde(rename = "hardwareProfile")]
    pub hardware_profile: HardwareProfile,
    #[serde(rename = "storageProfile")]
    pub storage_profile: StorageProfile,
    #[serde(rename = "osProfile")]
    pub os_profile: OsProfile,
    #[serde(rename = "securityProfile")]
    pub security_profile: SecurityProfile,
    #[serde(rename = "diagnosticsProfile")]
    pub diagnostics_profile: DiagnosticsProfile,
    #[serde(rename = "networkProfile")]
    pub network_profile: NetworkProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// SKU name, e.g. `Standard_DC2as_v5`.
    #[serde(rename = "vmSize")]
    pub vm_size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageProfile {
    #[serde(rename = "imageReference")]
    pub image_reference: ImageReference,
    #[serde(rename = "osDisk")]
    pub os_disk: OsDisk,
}

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Managed image, gallery image version or snapshot resource ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `/CommunityGalleries/...` image ID.
    #[serde(
        rename = "communityGalleryImageId",
        skip_serializing_if = "Option::is_none"
    )]
    pub community_gallery_image_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsDisk {
    /// Name of the managed disk resource ARM creates for the VM.
    pub name: String,
    /// `FromImage` copies the image referenced by the storage profile.
    #[serde(rename = "createOption")]
    pub create_option: DiskCreateOption,
    /// Host caching mode.
    pub caching: CachingType,
    /// `Delete` removes the disk together with the VM; `Detach` leaves it behind.
    #[serde(rename = "deleteOption")]
    pub delete_option: DeleteOption,
    /// Size in GB; the image's size when unset.
    #[serde(rename = "diskSizeGB", skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<u32>,
    #[serde(rename = "managedDisk")]
    pub managed_disk: ManagedDiskParameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskCreateOption {
    FromImage,
    Empty,
    Attach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachingType {
    None,
    ReadOnly,
    ReadWrite,
}

/// What happens to an attached resource when its VM is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOption {
    Delete,
    Detach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedDiskParameters {
    /// Disk SKU.
    #[serde(rename = "storageAccountType")]
    pub storage_account_type: StorageAccountType,
    /// Only set for confidential VMs.
    #[serde(rename = "securityProfile", skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<DiskSecurityProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageAccountType {
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "StandardSSD_LRS")]
    StandardSsdLrs,
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSecurityProfile {
    /// Which parts of the disk and the VM guest state (UEFI and TPM) are
    /// encrypted. Required when the VM's security type is `ConfidentialVM`.
    #[serde(rename = "securityEncryptionType")]
    pub security_encryption_type: SecurityEncryptionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEncryptionType {
    /// Only the VM guest state is encrypted, and the TPM state is not persisted.
    #[serde(rename = "NonPersistedTPM")]
    NonPersistedTpm,
    #[serde(rename = "VMGuestStateOnly")]
    VmGuestStateOnly,
    #[serde(rename = "DiskWithVMGuestState")]
    DiskWithVmGuestState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsProfile {
    /// Guest host name.
    #[serde(rename = "computerName")]
    pub computer_name: String,
    /// Account the SSH key is authorized for.
    #[serde(rename = "adminUsername")]
    pub admin_username: String,
    #[serde(rename = "linuxConfiguration")]
    pub linux_configuration: LinuxConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinuxConfiguration {
    #[serde(rename = "disablePasswordAuthentication")]
    pub disable_password_authentication: bool,
    pub ssh: SshConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfiguration {
    #[serde(rename = "publicKeys")]
    pub public_keys: Vec<SshPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshPublicKey {
    /// Where the key is written on the guest.
    pub path: String,
    /// The public key in OpenSSH format.
    #[serde(rename = "keyData")]
    pub key_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// `TrustedLaunch` or `ConfidentialVM`; both boot with UEFI.
    #[serde(rename = "securityType")]
    pub security_type: SecurityType,
    #[serde(rename = "uefiSettings")]
    pub uefi_settings: UefiSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityType {
    TrustedLaunch,
    #[serde(rename = "ConfidentialVM")]
    ConfidentialVm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UefiSettings {
    /// Only signed boot loaders and kernels may start.
    #[serde(rename = "secureBootEnabled")]
    pub secure_boot_enabled: bool,
    /// Virtual TPM for measured boot.
    #[serde(rename = "vTpmEnabled")]
    pub v_tpm_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsProfile {
    #[serde(rename = "bootDiagnostics")]
    pub boot_diagnostics: BootDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootDiagnostics {
    /// Serial console and screenshot capture, kept in managed storage.
    pub enabled: bool,
}

/// Either inline NIC configurations (created with the VM) or references to
/// network interfaces that already exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Network API version ARM uses to create the NICs in
    /// `network_interface_configurations`. Must be set for inline NICs and
    /// left out when only existing NICs are referenced.
    #[serde(rename = "networkApiVersion", skip_serializing_if = "Option::is_none")]
    pub network_api_version: Option<String>,
    #[serde(
        rename = "networkInterfaceConfigurations",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub network_interface_configurations: Vec<NetworkInterfaceConfiguration>,
    /// Existing NICs, by resource ID.
    #[serde(
        rename = "networkInterfaces",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceReference {
    /// Resource ID of the NIC.
    pub id: String,
    pub properties: NetworkInterfaceReferenceProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceReferenceProperties {
    /// The primary NIC carries the VM's default route.
    pub primary: bool,
    /// Whether deleting the VM also deletes this NIC.
    #[serde(rename = "deleteOption")]
    pub delete_option: DeleteOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceConfiguration {
    /// Name of the NIC resource ARM creates.
    pub name: String,
    pub properties: NetworkInterfaceConfigurationProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceConfigurationProperties {
    pub primary: bool,
    /// Whether deleting the VM also deletes the NIC created from this configuration.
    #[serde(rename = "deleteOption")]
    pub delete_option: DeleteOption,
    #[serde(rename = "ipConfigurations")]
    pub ip_configurations: Vec<InlineIpConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineIpConfiguration {
    pub name: String,
    pub properties: InlineIpConfigurationProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineIpConfigurationProperties {
    pub primary: bool,
    /// Subnet the private address is taken from.
    pub subnet: SubResource,
}

/// Body of a standalone `Microsoft.Network/networkInterfaces` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Must match the VM's region.
    pub location: String,
    pub properties: NetworkInterfaceProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterfaceProperties {
    #[serde(rename = "ipConfigurations")]
    pub ip_configurations: Vec<IpConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfiguration {
    pub name: String,
    pub properties: IpConfigurationProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfigurationProperties {
    pub primary: bool,
    /// `Dynamic` lets the subnet pick the address.
    #[serde(rename = "privateIPAllocationMethod")]
    pub private_ip_allocation_method: IpAllocationMethod,
    pub subnet: SubResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpAllocationMethod {
    Dynamic,
    Static,
}
