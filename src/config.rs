//! Configuration Management
//!
//! Handles persistent configuration storage for azinv. Secrets are never written
//! to the config file; the client secret is read from the environment only.

use crate::azure::auth::{
    get_default_tenant, validate_tenant_id, AmbientSettings, DEFAULT_AUTHORITY_HOST,
};
use crate::azure::broker::AppRegistration;
use crate::azure::client::DEFAULT_ARM_ENDPOINT;
use crate::azure::http::DEFAULT_MAX_RETRIES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory (tenant) of the app registration
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Client id of the app registration used for the on-behalf-of exchange
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Try managed identity when falling back to the ambient credential
    #[serde(default = "default_managed_identity")]
    pub managed_identity: bool,
}

fn default_arm_endpoint() -> String {
    DEFAULT_ARM_ENDPOINT.to_string()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_managed_identity() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            arm_endpoint: default_arm_endpoint(),
            authority_host: default_authority_host(),
            max_retries: default_max_retries(),
            managed_identity: default_managed_identity(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azinv").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from a specific file; missing or unreadable files give defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective tenant (CLI > config > AZURE_TENANT_ID > az profile)
    pub fn effective_tenant(&self, cli: Option<&str>) -> Option<String> {
        first_valid_tenant([
            cli.map(str::to_string),
            self.tenant_id.clone(),
            std::env::var("AZURE_TENANT_ID").ok(),
        ])
        .or_else(get_default_tenant)
    }

    /// Get effective client id (CLI > config > AZURE_CLIENT_ID)
    pub fn effective_client_id(&self, cli: Option<&str>) -> Option<String> {
        [
            cli.map(str::to_string),
            self.client_id.clone(),
            std::env::var("AZURE_CLIENT_ID").ok(),
        ]
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
    }

    /// Management endpoint; invalid values fall back to the public cloud
    pub fn effective_arm_endpoint(&self) -> String {
        valid_url_or(&self.arm_endpoint, DEFAULT_ARM_ENDPOINT)
    }

    /// Token authority; invalid values fall back to the public cloud
    pub fn effective_authority_host(&self) -> String {
        valid_url_or(&self.authority_host, DEFAULT_AUTHORITY_HOST)
    }

    /// Settings for the ambient credential chain
    pub fn ambient_settings(&self, tenant_id: Option<String>) -> AmbientSettings {
        AmbientSettings {
            authority_host: self.effective_authority_host(),
            tenant_id,
            managed_identity: self.managed_identity,
            ..AmbientSettings::default()
        }
    }

    /// App registration for the on-behalf-of exchange, when fully configured
    pub fn app_registration(
        &self,
        tenant_id: Option<&str>,
        client_id: Option<&str>,
    ) -> Option<AppRegistration> {
        let (Some(tenant_id), Some(client_id), Some(secret)) =
            (tenant_id, client_id, client_secret())
        else {
            return None;
        };
        Some(
            AppRegistration::new(tenant_id, client_id, &secret)
                .with_authority_host(&self.effective_authority_host()),
        )
    }

    /// Set tenant and save
    pub fn set_tenant(&mut self, tenant_id: &str) -> Result<()> {
        self.tenant_id = Some(tenant_id.to_string());
        self.save()
    }

    /// Set client id and save
    pub fn set_client_id(&mut self, client_id: &str) -> Result<()> {
        self.client_id = Some(client_id.to_string());
        self.save()
    }
}

/// Client secret of the app registration (AZINV_CLIENT_SECRET, then AZURE_CLIENT_SECRET)
pub fn client_secret() -> Option<String> {
    ["AZINV_CLIENT_SECRET", "AZURE_CLIENT_SECRET"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
}

/// First candidate that is a well-formed tenant id; malformed ones are skipped
fn first_valid_tenant(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .find(|t| {
            let valid = validate_tenant_id(t);
            if !valid {
                tracing::warn!("Ignoring invalid tenant id: {}", t);
            }
            valid
        })
}

fn valid_url_or(value: &str, default: &str) -> String {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "https" | "http") && url.host_str().is_some() => {
            value.trim_end_matches('/').to_string()
        }
        _ => {
            tracing::warn!("Invalid endpoint {:?}, using {}", value, default);
            default.to_string()
        }
    }
}
