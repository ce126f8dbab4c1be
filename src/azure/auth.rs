//! # Azure Authentication
//!
//! Resolves a credential from the environment and exchanges it for a bearer
//! token usable against Azure Resource Manager. The lookup order mirrors the
//! usual Azure tooling: an explicit token, a service principal (secret,
//! certificate or federated token), a managed identity, and finally the
//! Azure CLI.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use cached::proc_macro::cached;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::azure::types::{AccessToken, CliAccessToken};
use crate::client::CLIENT;

/// The public-cloud Microsoft identity platform.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of the client assertion signed with a service principal certificate.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The token endpoint the assertion is presented to.
    aud: String,
    /// The client (application) ID, as issuer.
    iss: String,
    /// The client (application) ID, as subject.
    sub: String,
    /// Unique assertion ID.
    jti: String,
    nbf: u64,
    iat: u64,
    exp: u64,
}

/// Where a bearer token comes from.
#[derive(Clone)]
pub enum Credential {
    /// A pre-issued token, used as is.
    AccessToken(String),
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// A PEM file holding both the private key and the certificate.
    ClientCertificate {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        certificate_path: PathBuf,
    },
    WorkloadIdentity {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        token_file: PathBuf,
    },
    /// App Service style endpoint when `endpoint` is set, otherwise IMDS.
    ManagedIdentity {
        client_id: Option<String>,
        endpoint: Option<(String, String)>,
    },
    AzureCli,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.kind())
    }
}

impl Credential {
    /// Picks the first credential the process environment configures.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Credential::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("AZURE_ACCESS_TOKEN") {
            return Credential::AccessToken(token);
        }

        let authority_host =
            var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());
        if let (Some(tenant_id), Some(client_id)) = (var("AZURE_TENANT_ID"), var("AZURE_CLIENT_ID"))
        {
            if let Some(client_secret) = var("AZURE_CLIENT_SECRET") {
                return Credential::ClientSecret {
                    authority_host,
                    tenant_id,
                    client_id,
                    client_secret,
                };
            }
            if let Some(path) = var("AZURE_CLIENT_CERTIFICATE_PATH") {
                return Credential::ClientCertificate {
                    authority_host,
                    tenant_id,
                    client_id,
                    certificate_path: PathBuf::from(path),
                };
            }
            if let Some(path) = var("AZURE_FEDERATED_TOKEN_FILE") {
                return Credential::WorkloadIdentity {
                    authority_host,
                    tenant_id,
                    client_id,
                    token_file: PathBuf::from(path),
                };
            }
        }

        if let (Some(endpoint), Some(header)) = (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
            return Credential::ManagedIdentity {
                client_id: var("AZURE_CLIENT_ID"),
                endpoint: Some((endpoint, header)),
            };
        }
        if var("AZURE_USE_MSI").is_some() {
            return Credential::ManagedIdentity {
                client_id: var("AZURE_CLIENT_ID"),
                endpoint: None,
            };
        }

        Credential::AzureCli
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::AccessToken(_) => "access-token",
            Credential::ClientSecret { .. } => "client-secret",
            Credential::ClientCertificate { .. } => "client-certificate",
            Credential::WorkloadIdentity { .. } => "workload-identity",
            Credential::ManagedIdentity { .. } => "managed-identity",
            Credential::AzureCli => "azure-cli",
        }
    }

    fn cache_key(&self, scope: &str) -> String {
        let client_id = match self {
            Credential::ClientSecret { client_id, .. }
            | Credential::ClientCertificate { client_id, .. }
            | Credential::WorkloadIdentity { client_id, .. } => client_id.as_str(),
            Credential::ManagedIdentity { client_id, .. } => client_id.as_deref().unwrap_or(""),
            Credential::AccessToken(_) | Credential::AzureCli => "",
        };
        format!("{}|{}|{}", self.kind(), client_id, scope)
    }

    /// Returns a bearer token for `scope` (e.g. `https://management.azure.com/.default`).
    pub async fn access_token(&self, scope: &str) -> Result<String> {
        match self {
            Credential::AccessToken(token) => Ok(token.clone()),
            _ => fetch_access_token(self, scope).await,
        }
    }
}

/// Fetches a token from the credential's issuer. Tokens live for at least an
/// hour; cached entries expire after 50 minutes.
#[cached(
    time = 3000,
    result = true,
    key = "String",
    convert = r#"{ credential.cache_key(scope) }"#
)]
async fn fetch_access_token(credential: &Credential, scope: &str) -> Result<String> {
    tracing::debug!(credential = credential.kind(), scope, "requesting access token");
    match credential {
        Credential::AccessToken(token) => Ok(token.clone()),
        Credential::ClientSecret {
            authority_host,
            tenant_id,
            client_id,
            client_secret,
        } => {
            let form = [
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", scope),
            ];
            request_token(authority_host, tenant_id, &form).await
        }
        Credential::ClientCertificate {
            authority_host,
            tenant_id,
            client_id,
            certificate_path,
        } => {
            let pem = tokio::fs::read_to_string(certificate_path)
                .await
                .with_context(|| format!("Failed to read {}", certificate_path.display()))?;
            let audience = token_url(authority_host, tenant_id);
            let assertion = client_assertion(&audience, client_id, &pem)?;
            let form = [
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
                ("scope", scope),
            ];
            request_token(authority_host, tenant_id, &form).await
        }
        Credential::WorkloadIdentity {
            authority_host,
            tenant_id,
            client_id,
            token_file,
        } => {
            let assertion = tokio::fs::read_to_string(token_file)
                .await
                .with_context(|| format!("Failed to read {}", token_file.display()))?;
            let form = [
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.trim()),
                ("scope", scope),
            ];
            request_token(authority_host, tenant_id, &form).await
        }
        Credential::ManagedIdentity {
            client_id,
            endpoint,
        } => managed_identity_token(client_id.as_deref(), endpoint.as_ref(), scope).await,
        Credential::AzureCli => azure_cli_token(scope).await,
    }
}

fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// Managed identity and the CLI speak in resources rather than scopes.
fn scope_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

async fn request_token(authority_host: &str, tenant_id: &str, form: &[(&str, &str)]) -> Result<String> {
    let response = CLIENT
        .post(token_url(authority_host, tenant_id))
        .form(form)
        .send()
        .await
        .context("Failed to call token endpoint")?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        bail!("Failed to get access token ({}): {}", status, error_text);
    }

    let token: AccessToken = response.json().await.context("Invalid token response")?;
    Ok(token.access_token)
}

async fn managed_identity_token(
    client_id: Option<&str>,
    endpoint: Option<&(String, String)>,
    scope: &str,
) -> Result<String> {
    let resource = scope_resource(scope);
    let request = match endpoint {
        Some((url, header)) => {
            let mut query = vec![("api-version", "2019-08-01"), ("resource", resource)];
            if let Some(id) = client_id {
                query.push(("client_id", id));
            }
            CLIENT
                .get(url)
                .query(&query)
                .header("X-IDENTITY-HEADER", header)
        }
        None => {
            let mut query = vec![("api-version", "2018-02-01"), ("resource", resource)];
            if let Some(id) = client_id {
                query.push(("client_id", id));
            }
            CLIENT
                .get(IMDS_TOKEN_URL)
                .query(&query)
                .header("Metadata", "true")
        }
    };

    let response = request
        .send()
        .await
        .context("Failed to call managed identity endpoint")?;
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        bail!("Managed identity token request failed ({}): {}", status, error_text);
    }
    let token: AccessToken = response.json().await.context("Invalid token response")?;
    Ok(token.access_token)
}

async fn azure_cli_token(scope: &str) -> Result<String> {
    let output = tokio::process::Command::new("az")
        .args([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            scope_resource(scope),
        ])
        .output()
        .await
        .context("No Azure credential configured and the Azure CLI (az) is not runnable")?;

    if !output.status.success() {
        bail!(
            "az account get-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let token: CliAccessToken =
        serde_json::from_slice(&output.stdout).context("Invalid az account get-access-token output")?;
    Ok(token.access_token)
}

/// Returns the full PEM block (markers included) labelled `label`.
fn pem_block<'a>(pem: &'a str, label: &str) -> Option<&'a str> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let start = pem.find(&begin)?;
    let stop = start + pem[start..].find(&end)? + end.len();
    Some(&pem[start..stop])
}

/// base64url SHA-1 digest of the certificate's DER encoding, as expected in `x5t`.
fn certificate_thumbprint(pem: &str) -> Result<String> {
    let block = pem_block(pem, "CERTIFICATE").context("No CERTIFICATE block in PEM file")?;
    let body: String = block
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .flat_map(|line| line.trim().chars())
        .collect();
    let der = STANDARD.decode(body).context("Malformed certificate")?;
    Ok(URL_SAFE_NO_PAD.encode(Sha1::digest(&der)))
}

fn client_assertion(audience: &str, client_id: &str, pem: &str) -> Result<String> {
    let key = pem_block(pem, "PRIVATE KEY")
        .or_else(|| pem_block(pem, "RSA PRIVATE KEY"))
        .context("No unencrypted private key in PEM file")?;

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        aud: audience.to_string(),
        iss: client_id.to_string(),
        sub: client_id.to_string(),
        jti: format!("{:032x}", rand::random::<u128>()),
        nbf: now,
        iat: now,
        exp: now + 600,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(certificate_thumbprint(pem)?);
    let encoding_key = EncodingKey::from_rsa_pem(key.as_bytes())?;
    Ok(encode(&header, &claims, &encoding_key)?)
}
