use serde::{Deserialize, Serialize};

// Wire types shared by every ARM resource provider.

/// Response of the Microsoft identity platform token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

/// Token as printed by `az account get-access-token`.
#[derive(Debug, Deserialize)]
pub struct CliAccessToken {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// The ARM error envelope: `{ "error": { "code": ..., "message": ... } }`.
#[derive(Debug, Default, Deserialize)]
pub struct CloudError {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Debug, Deserialize)]
pub struct OperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

/// Just enough of any ARM resource to read its identity and provisioning state.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: Option<ProvisioningProperties>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisioningProperties {
    #[serde(rename = "provisioningState", default)]
    pub provisioning_state: Option<String>,
}

/// Reference to another ARM resource by ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}
