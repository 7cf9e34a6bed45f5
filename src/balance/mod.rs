//! RPC Balance Resolver - native balance for (address, chain) with endpoint fallback
//!
//! ```text
//! resolve(address, chain)
//!     │
//!     ├── ChainRegistry::describe(chain) ── unknown ──▶ degraded
//!     │
//!     └── for url in descriptor.rpc_urls:
//!             eth_getBalance [address, "latest"]
//!                 ├── ok + parsable quantity ──▶ reliable result
//!                 └── transport / RPC / malformed ──▶ next url
//!                                                   │
//!                                        exhausted ─┴─▶ degraded (zero, unreliable)
//! ```
//!
//! `resolve` never fails: balance display is best-effort and must not block
//! connection state.

mod transport;
pub mod units;

pub use transport::{JsonRpcRequest, JsonRpcResponse, RpcError, RpcTransport};
#[cfg(feature = "native")]
pub use transport::HttpTransport;

use crate::chain::ChainRegistry;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const GET_BALANCE: &str = "eth_getBalance";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceResult {
    pub address: String,
    pub chain_id: u64,
    /// Smallest-denomination amount (wei). Zero when degraded.
    pub amount: u128,
    /// `amount` at the currency's precision.
    pub formatted: String,
    pub symbol: String,
    pub decimals: u8,
    /// False when every endpoint failed and this is a placeholder zero.
    pub reliable: bool,
    /// Endpoint that answered, if any.
    pub endpoint: Option<String>,
}

impl BalanceResult {
    fn degraded(address: &str, chain_id: u64, symbol: &str, decimals: u8) -> Self {
        Self {
            address: address.to_string(),
            chain_id,
            amount: 0,
            formatted: "0".into(),
            symbol: symbol.to_string(),
            decimals,
            reliable: false,
            endpoint: None,
        }
    }
}

#[derive(Clone)]
pub struct BalanceResolver {
    registry: Arc<ChainRegistry>,
    transport: Arc<dyn RpcTransport>,
}

impl BalanceResolver {
    pub fn new(registry: Arc<ChainRegistry>, transport: Arc<dyn RpcTransport>) -> Self {
        Self { registry, transport }
    }

    /// Resolver over HTTPS with the configured per-request timeout.
    #[cfg(feature = "native")]
    pub fn http(registry: Arc<ChainRegistry>, timeout: std::time::Duration) -> Result<Self, RpcError> {
        Ok(Self::new(registry, Arc::new(HttpTransport::new(timeout)?)))
    }

    pub fn registry(&self) -> &ChainRegistry { &self.registry }

    pub fn shared_registry(&self) -> Arc<ChainRegistry> { self.registry.clone() }

    pub async fn resolve(&self, address: &str, chain_id: u64) -> BalanceResult {
        let chain = match self.registry.describe(chain_id) {
            Ok(chain) => chain,
            Err(e) => {
                warn!(chain_id, "balance requested for {e}");
                return BalanceResult::degraded(address, chain_id, "", 0);
            }
        };
        let currency = &chain.currency;

        for url in &chain.rpc_urls {
            let request = JsonRpcRequest::new(GET_BALANCE, json!([address, "latest"]));
            match self.transport.call(url, &request).await.and_then(parse_balance) {
                Ok(amount) => {
                    debug!(chain_id, url = %url, "balance resolved");
                    return BalanceResult {
                        address: address.to_string(),
                        chain_id,
                        amount,
                        formatted: units::format_units(amount, currency.decimals),
                        symbol: currency.symbol.clone(),
                        decimals: currency.decimals,
                        reliable: true,
                        endpoint: Some(url.clone()),
                    };
                }
                Err(e) => warn!(chain_id, url = %url, "balance endpoint failed: {e}"),
            }
        }

        warn!(chain_id, "all RPC endpoints failed; reporting degraded balance");
        BalanceResult::degraded(address, chain_id, &currency.symbol, currency.decimals)
    }
}

fn parse_balance(result: Value) -> Result<u128, RpcError> {
    let raw = result
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex string, got {result}")))?;
    units::parse_quantity(raw).ok_or_else(|| RpcError::Malformed(format!("bad quantity '{raw}'")))
}
