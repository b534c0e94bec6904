use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::config::VaultConfig;
use crate::snapshot::{SecretSnapshot, SecretValue};

/// Source of secret snapshots
///
/// Every error is treated as transient by the sync loop.
pub trait SecretProvider {
    fn fetch_secret(&self, path: &str) -> impl Future<Output = Result<SecretSnapshot>> + Send;
}

/// HashiCorp Vault client for KV v1 and v2 mounts
pub struct VaultProvider {
    client: Client,
    address: url::Url,
    token: String,
    namespace: Option<String>,
}

impl VaultProvider {
    /// Create a new Vault client
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let address = parse_address(&config.address)?;
        let token = config.resolved_token()?;

        let client = Client::builder()
            .user_agent(format!("vault-monitor/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            address,
            token,
            namespace: config.namespace.clone(),
        })
    }

    fn secret_url(&self, path: &str) -> Result<url::Url> {
        let path = format!("v1/{}", path.trim_start_matches('/'));
        self.address
            .join(&path)
            .with_context(|| format!("Invalid secret path: {}", path))
    }
}

impl SecretProvider for VaultProvider {
    async fn fetch_secret(&self, path: &str) -> Result<SecretSnapshot> {
        let url = self.secret_url(path)?;
        tracing::debug!("Fetching secret from: {}", url);

        let mut request = self.client.get(url).header("X-Vault-Token", &self.token);
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request.send().await
            .context("Failed to connect to Vault")?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await
                    .context("Failed to read response body")?;
                parse_secret_response(&body)
                    .with_context(|| format!("Unexpected response for secret '{}'", path))
            }
            StatusCode::NOT_FOUND => {
                anyhow::bail!("Secret not found (404). Check the secret path.\nPath: {}", path)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                anyhow::bail!(
                    "Access denied ({}). Check the Vault token and its policies.\nPath: {}",
                    response.status(),
                    path
                )
            }
            status => {
                anyhow::bail!("Vault returned unexpected status: {} for path: {}", status, path)
            }
        }
    }
}

/// Validate the Vault address and normalize it to end with `/`
fn parse_address(address: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(address)
        .with_context(|| format!("Invalid Vault address: {}", address))?;

    match url.scheme() {
        "https" => {}
        "http" => tracing::warn!("Vault address uses plain HTTP; the token is sent unencrypted"),
        other => anyhow::bail!("Vault address must use http or https (got: {})", other),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Turn a Vault read response into a snapshot
///
/// KV v2 nests the fields under `data.data` and carries the version in
/// `data.metadata.version`. KV v1 returns the fields directly under `data`.
/// Without metadata, a `version` field inside the secret is used.
fn parse_secret_response(body: &str) -> Result<SecretSnapshot> {
    let root: serde_json::Value = serde_json::from_str(body)
        .context("Response is not valid JSON")?;

    let data = root
        .get("data")
        .and_then(|d| d.as_object())
        .context("Response has no 'data' object")?;

    let (fields, metadata_version) = match data.get("data").and_then(|d| d.as_object()) {
        Some(fields) => {
            let version = data
                .get("metadata")
                .and_then(|m| m.get("version"))
                .map(|v| SecretValue::from_json(v.clone()));
            (fields, version)
        }
        None => (data, None),
    };

    let version = metadata_version
        .or_else(|| fields.get("version").map(|v| SecretValue::from_json(v.clone())))
        .map(|v| v.render())
        .unwrap_or_default();

    let values: BTreeMap<String, SecretValue> = fields
        .iter()
        .map(|(k, v)| (k.clone(), SecretValue::from_json(v.clone())))
        .collect();

    Ok(SecretSnapshot::new(version, values))
}
