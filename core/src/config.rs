//! Client configuration.
//!
//! Configurations are plain immutable data. They can be built in code or
//! loaded from a JSON document whose `kind` field selects the variant:
//!
//! ```json
//! { "kind": "on_premise", "site_url": "https://farm.corp", "excluded_folders": ["/Archive"] }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;

pub const DEFAULT_LIBRARY: &str = "Shared Documents";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hosted tenant configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub site_name: String,
    pub site_url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "enabled")]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_library")]
    pub document_library: String,
}

impl CloudConfig {
    pub fn new(site_name: &str, site_url: &str, access_token: &str) -> Self {
        Self {
            site_name: site_name.to_string(),
            site_url: site_url.to_string(),
            public_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: Some(access_token.to_string()),
            verify_tls: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            document_library: DEFAULT_LIBRARY.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        require("site_url", &self.site_url)?;
        require("site_name", &self.site_name)?;
        require_timeout(self.timeout_secs)
    }

    /// `<site url>/sites/<name>/_api/Web`
    pub fn api_root(&self) -> String {
        format!("{}/_api/Web", self.site_root())
    }

    /// `/sites/<name>/<library>`
    pub fn folder_root(&self) -> String {
        format!(
            "/sites/{}/{}",
            self.site_name.trim_matches('/'),
            self.document_library.trim_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn site_root(&self) -> String {
        format!(
            "{}/sites/{}",
            self.site_url.trim_end_matches('/'),
            self.site_name.trim_matches('/')
        )
    }
}

/// On-premise farm configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OnPremiseConfig {
    #[serde(default)]
    pub site_name: String,
    pub site_url: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_library")]
    pub document_library: String,
    /// Folders that must never be created or deleted through this client.
    #[serde(default)]
    pub excluded_folders: Vec<String>,
}

impl OnPremiseConfig {
    pub fn new(site_url: &str) -> Self {
        Self {
            site_name: String::new(),
            site_url: site_url.to_string(),
            public_url: String::new(),
            access_token: None,
            verify_tls: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            document_library: DEFAULT_LIBRARY.to_string(),
            excluded_folders: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        require("site_url", &self.site_url)?;
        require_timeout(self.timeout_secs)
    }

    /// `<site url>/_api/Web`
    pub fn api_root(&self) -> String {
        format!("{}/_api/Web", self.site_url.trim_end_matches('/'))
    }

    /// `<site url>/_api/contextinfo`
    pub fn context_info_url(&self) -> String {
        format!("{}/_api/contextinfo", self.site_url.trim_end_matches('/'))
    }

    /// `/<library>`
    pub fn folder_root(&self) -> String {
        format!("/{}", self.document_library.trim_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Selects which client `connect` builds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Cloud(CloudConfig),
    OnPremise(OnPremiseConfig),
}

impl StoreConfig {
    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        let config: StoreConfig =
            serde_json::from_str(raw).map_err(|e| ApiError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ApiError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        match self {
            StoreConfig::Cloud(config) => config.validate(),
            StoreConfig::OnPremise(config) => config.validate(),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::ConfigError(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_timeout(secs: u64) -> Result<(), ApiError> {
    if secs == 0 {
        return Err(ApiError::ConfigError("timeout_secs must be greater than zero".to_string()));
    }
    Ok(())
}

fn enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_library() -> String {
    DEFAULT_LIBRARY.to_string()
}
