//! Chain Registry - static descriptions of the supported networks
//!
//! The first descriptor is the primary network. Adapters fall back to it when
//! a wallet does not report a chain.
//!
//! | Chain | Id | Explorer |
//! |-------|----|----------|
//! | Base Mainnet | 8453 | basescan.org |
//! | Base Sepolia | 84532 | sepolia.basescan.org |

use crate::config::WalletConfig;
use serde::Serialize;

pub const BASE_MAINNET: u64 = 8453;
pub const BASE_SEPOLIA: u64 = 84532;

pub const UNKNOWN_NETWORK: &str = "Unknown Network";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self { name: "Ether".into(), symbol: "ETH".into(), decimals: 18 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    pub id: u64,
    pub name: String,
    pub currency: NativeCurrency,
    /// Primary first, then fallbacks in order.
    pub rpc_urls: Vec<String>,
    pub explorer_url: String,
    pub testnet: bool,
}

impl ChainDescriptor {
    pub fn base() -> Self {
        Self {
            id: BASE_MAINNET,
            name: "Base Mainnet".into(),
            currency: NativeCurrency::ether(),
            rpc_urls: vec![
                "https://mainnet.base.org".into(),
                "https://base-rpc.publicnode.com".into(),
            ],
            explorer_url: "https://basescan.org".into(),
            testnet: false,
        }
    }

    pub fn base_sepolia() -> Self {
        Self {
            id: BASE_SEPOLIA,
            name: "Base Sepolia".into(),
            currency: NativeCurrency::ether(),
            rpc_urls: vec![
                "https://sepolia.base.org".into(),
                "https://base-sepolia-rpc.publicnode.com".into(),
            ],
            explorer_url: "https://sepolia.basescan.org".into(),
            testnet: true,
        }
    }

    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_url.trim_end_matches('/'), address)
    }

    /// `0x`-prefixed hex id, as used by `wallet_switchEthereumChain`.
    pub fn hex_id(&self) -> String { format!("{:#x}", self.id) }

    /// Put `url` in front of the endpoint list, keeping the others as fallbacks.
    pub fn with_primary_rpc(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.rpc_urls.retain(|u| *u != url);
        self.rpc_urls.insert(0, url);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chain {0}")]
pub struct UnknownChain(pub u64);

#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainDescriptor>,
}

impl Default for ChainRegistry {
    fn default() -> Self { Self::new(ChainDescriptor::base(), vec![ChainDescriptor::base_sepolia()]) }
}

impl ChainRegistry {
    pub fn new(primary: ChainDescriptor, others: Vec<ChainDescriptor>) -> Self {
        let mut chains = Vec::with_capacity(others.len() + 1);
        chains.push(primary);
        chains.extend(others.into_iter());
        Self { chains }
    }

    pub fn from_config(config: &WalletConfig) -> Self {
        let mut registry = Self::default();
        for (chain_id, url) in &config.rpc_overrides {
            registry.override_rpc(*chain_id, url);
        }
        registry
    }

    pub fn override_rpc(&mut self, chain_id: u64, url: &str) -> bool {
        match self.chains.iter_mut().find(|c| c.id == chain_id) {
            Some(chain) => {
                *chain = chain.clone().with_primary_rpc(url);
                true
            }
            None => {
                tracing::warn!(chain_id, "RPC override for unknown chain ignored");
                false
            }
        }
    }

    pub fn describe(&self, chain_id: u64) -> Result<&ChainDescriptor, UnknownChain> {
        self.chains.iter().find(|c| c.id == chain_id).ok_or(UnknownChain(chain_id))
    }

    pub fn is_supported(&self, chain_id: u64) -> bool { self.describe(chain_id).is_ok() }

    pub fn primary(&self) -> &ChainDescriptor { &self.chains[0] }

    pub fn ids(&self) -> Vec<u64> { self.chains.iter().map(|c| c.id).collect() }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> { self.chains.iter() }

    pub fn display_name(&self, chain_id: u64) -> &str {
        self.describe(chain_id).map(|c| c.name.as_str()).unwrap_or(UNKNOWN_NETWORK)
    }
}

/// Parse a chain id as wallets report it: `0x2105`, `8453`, or CAIP-2 `eip155:8453`.
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("eip155:").unwrap_or(raw);
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}
