//! Wallet configuration - passed in by the composition root

use crate::error::{WalletError, WalletResult};
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder shipped in sample env files. Treated the same as a missing ID.
pub const PLACEHOLDER_PROJECT_ID: &str = "00000000000000000000000000000000";

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_PROJECT_ID: &str = "BASECONNECT_PROJECT_ID";
pub const ENV_BASE_RPC_URL: &str = "BASECONNECT_BASE_RPC_URL";
pub const ENV_BASE_SEPOLIA_RPC_URL: &str = "BASECONNECT_BASE_SEPOLIA_RPC_URL";
pub const ENV_APPROVAL_TIMEOUT_SECS: &str = "BASECONNECT_APPROVAL_TIMEOUT_SECS";
pub const ENV_RPC_TIMEOUT_SECS: &str = "BASECONNECT_RPC_TIMEOUT_SECS";

/// Dapp metadata shown to the remote wallet during pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "BaseConnect".into(),
            description: "Connect your wallet to the Base network".into(),
            url: "https://base.org".into(),
            icons: vec!["https://walletconnect.com/walletconnect-logo.png".into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub metadata: AppMetadata,
    pub project_id: Option<String>,
    pub rpc_overrides: BTreeMap<u64, String>,
    pub approval_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            metadata: AppMetadata::default(),
            project_id: None,
            rpc_overrides: BTreeMap::new(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl WalletConfig {
    pub fn new(app: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.metadata.name = app.into();
        config
    }
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self { self.project_id = Some(id.into()); self }
    pub fn with_rpc_override(mut self, chain_id: u64, url: impl Into<String>) -> Self { self.rpc_overrides.insert(chain_id, url.into()); self }
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self { self.approval_timeout = timeout; self }
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self { self.rpc_timeout = timeout; self }
    pub fn with_metadata(mut self, metadata: AppMetadata) -> Self { self.metadata = metadata; self }

    /// Build from `BASECONNECT_*` environment variables. Unset or unparsable
    /// values fall back to defaults; validation of the project ID is deferred
    /// to [`WalletConfig::project_id`] so the injected path keeps working.
    pub fn from_env(app: impl Into<String>) -> Self {
        let mut config = Self::new(app);
        if let Some(id) = env_nonempty(ENV_PROJECT_ID) {
            config.project_id = Some(id);
        }
        if let Some(url) = env_nonempty(ENV_BASE_RPC_URL) {
            config.rpc_overrides.insert(crate::chain::BASE_MAINNET, url);
        }
        if let Some(url) = env_nonempty(ENV_BASE_SEPOLIA_RPC_URL) {
            config.rpc_overrides.insert(crate::chain::BASE_SEPOLIA, url);
        }
        if let Some(secs) = env_nonempty(ENV_APPROVAL_TIMEOUT_SECS).and_then(|v| v.parse::<u64>().ok()) {
            config.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_nonempty(ENV_RPC_TIMEOUT_SECS).and_then(|v| v.parse::<u64>().ok()) {
            config.rpc_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Validated relay project identifier.
    pub fn project_id(&self) -> WalletResult<&str> {
        let id = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WalletError::Configuration("project ID is not set".into()))?;
        if id == PLACEHOLDER_PROJECT_ID {
            return Err(WalletError::Configuration("project ID is the placeholder value".into()));
        }
        if id.len() != 32 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(WalletError::Configuration(format!("project ID '{id}' is not 32 hex characters")));
        }
        Ok(id)
    }

    pub fn has_valid_project_id(&self) -> bool { self.project_id().is_ok() }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
