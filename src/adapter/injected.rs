//! Injected browser-extension wallet over the EIP-1193 request/event surface.

use super::{lock, normalize_accounts, AccountInfo, AccountsCallback, AdapterKind, EventHub, ListenerId, ProviderAdapter, SessionEndedCallback};
use crate::chain::{parse_chain_id, ChainRegistry};
use crate::error::{WalletError, WalletResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const REQUEST_PENDING: i64 = -32002;

    pub fn new(code: i64, message: impl Into<String>) -> Self { Self { code, message: message.into() } }
}

impl From<ProviderRpcError> for WalletError {
    fn from(e: ProviderRpcError) -> Self {
        match e.code {
            ProviderRpcError::USER_REJECTED | ProviderRpcError::UNAUTHORIZED => WalletError::UserRejected,
            ProviderRpcError::UNSUPPORTED_METHOD => WalletError::NotAvailable(format!("Wallet method ({})", e.message)),
            ProviderRpcError::DISCONNECTED | ProviderRpcError::CHAIN_DISCONNECTED => WalletError::Network(e.message),
            ProviderRpcError::REQUEST_PENDING => WalletError::Unknown(format!("request already pending: {}", e.message)),
            _ => WalletError::Unknown(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    /// Hex chain id as emitted by the provider.
    ChainChanged(String),
    Disconnect(ProviderRpcError),
}

pub type ProviderEventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Replaces any previously installed handler.
    fn set_event_handler(&self, handler: ProviderEventHandler);
}

pub struct InjectedAdapter {
    provider: Option<Arc<dyn Eip1193Provider>>,
    registry: Arc<ChainRegistry>,
    approval_timeout: Duration,
    hub: Arc<EventHub>,
    cached: Arc<Mutex<Option<AccountInfo>>>,
}

impl InjectedAdapter {
    /// `provider` is `None` when no extension is installed.
    pub fn new(provider: Option<Arc<dyn Eip1193Provider>>, registry: Arc<ChainRegistry>, approval_timeout: Duration) -> Self {
        let hub = Arc::new(EventHub::new());
        let cached: Arc<Mutex<Option<AccountInfo>>> = Arc::new(Mutex::new(None));

        if let Some(provider) = &provider {
            let hub = hub.clone();
            let cached = cached.clone();
            provider.set_event_handler(Arc::new(move |event| handle_event(&hub, &cached, event)));
        }

        Self { provider, registry, approval_timeout, hub, cached }
    }

    pub fn is_installed(&self) -> bool { self.provider.is_some() }

    fn provider(&self) -> WalletResult<&Arc<dyn Eip1193Provider>> {
        self.provider.as_ref().ok_or_else(|| WalletError::NotAvailable("Browser wallet".into()))
    }

    async fn request(&self, method: &str, params: Value) -> WalletResult<Value> {
        let provider = self.provider()?;
        match tokio::time::timeout(self.approval_timeout, provider.request(method, params)).await {
            Ok(result) => result.map_err(WalletError::from),
            Err(_) => Err(WalletError::Timeout(self.approval_timeout)),
        }
    }

    async fn add_chain(&self, chain_id: u64) -> WalletResult<()> {
        let chain = self.registry.describe(chain_id).map_err(|e| WalletError::UnsupportedChain(e.0))?;
        let params = json!([{
            "chainId": chain.hex_id(),
            "chainName": chain.name,
            "nativeCurrency": {
                "name": chain.currency.name,
                "symbol": chain.currency.symbol,
                "decimals": chain.currency.decimals,
            },
            "rpcUrls": chain.rpc_urls,
            "blockExplorerUrls": [chain.explorer_url],
        }]);
        info!(chain_id, "adding chain to injected wallet");
        self.request("wallet_addEthereumChain", params).await.map(|_| ())
    }
}

fn handle_event(hub: &EventHub, cached: &Mutex<Option<AccountInfo>>, event: ProviderEvent) {
    match event {
        ProviderEvent::AccountsChanged(raw) => {
            let accounts = normalize_accounts(&raw);
            let snapshot = {
                let mut cached = lock(cached);
                let chain_id = cached.as_ref().and_then(|c| c.chain_id);
                let info = AccountInfo::new(accounts, chain_id);
                *cached = (!info.is_empty()).then(|| info.clone());
                info
            };
            debug!(accounts = snapshot.accounts.len(), "injected accountsChanged");
            hub.emit_accounts(snapshot);
        }
        ProviderEvent::ChainChanged(raw) => {
            let Some(chain_id) = parse_chain_id(&raw) else {
                warn!(raw = %raw, "injected chainChanged with unparsable id");
                return;
            };
            let snapshot = {
                let mut cached = lock(cached);
                match cached.as_mut() {
                    Some(info) => {
                        info.chain_id = Some(chain_id);
                        Some(info.clone())
                    }
                    None => None,
                }
            };
            match snapshot {
                Some(info) => hub.emit_accounts(info),
                None => debug!(chain_id, "injected chainChanged while not connected"),
            }
        }
        ProviderEvent::Disconnect(e) => {
            info!("injected provider disconnected: {e}");
            *lock(cached) = None;
            hub.emit_session_ended();
        }
    }
}

#[async_trait]
impl ProviderAdapter for InjectedAdapter {
    fn kind(&self) -> AdapterKind { AdapterKind::Injected }

    async fn connect(&self) -> WalletResult<AccountInfo> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        let raw: Vec<String> = serde_json::from_value(value)
            .map_err(|e| WalletError::Unknown(format!("eth_requestAccounts returned {e}")))?;
        let accounts = normalize_accounts(&raw);
        if accounts.is_empty() {
            return Err(WalletError::Unknown("wallet returned no accounts".into()));
        }

        let chain_id = match self.request("eth_chainId", json!([])).await {
            Ok(value) => value.as_str().and_then(parse_chain_id),
            Err(e) => {
                debug!("eth_chainId failed: {e}");
                None
            }
        };
        let chain_id = chain_id.unwrap_or_else(|| {
            debug!("provider did not report a chain; assuming primary");
            self.registry.primary().id
        });

        let info = AccountInfo::new(accounts, Some(chain_id));
        *lock(&self.cached) = Some(info.clone());
        info!(chain_id, "injected wallet connected");
        Ok(info)
    }

    async fn disconnect(&self) {
        let was_connected = lock(&self.cached).take().is_some();
        if !was_connected {
            return;
        }
        // Not every extension implements revocation.
        if let Err(e) = self.request("wallet_revokePermissions", json!([{ "eth_accounts": {} }])).await {
            debug!("permission revoke skipped: {e}");
        }
    }

    fn get_accounts(&self) -> Option<AccountInfo> { lock(&self.cached).clone() }

    async fn switch_chain(&self, chain_id: u64) -> WalletResult<()> {
        let chain = self.registry.describe(chain_id).map_err(|e| WalletError::UnsupportedChain(e.0))?;
        let params = json!([{ "chainId": chain.hex_id() }]);

        let provider = self.provider()?;
        let first = tokio::time::timeout(self.approval_timeout, provider.request("wallet_switchEthereumChain", params.clone())).await;
        match first {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.code == ProviderRpcError::UNRECOGNIZED_CHAIN => {
                self.add_chain(chain_id).await?;
                self.request("wallet_switchEthereumChain", params).await?;
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(WalletError::Timeout(self.approval_timeout)),
        }

        if let Some(info) = lock(&self.cached).as_mut() {
            info.chain_id = Some(chain_id);
        }
        Ok(())
    }

    fn on_accounts_changed(&self, callback: AccountsCallback) -> ListenerId { self.hub.on_accounts_changed(callback) }
    fn on_session_ended(&self, callback: SessionEndedCallback) -> ListenerId { self.hub.on_session_ended(callback) }
    fn remove_listener(&self, id: ListenerId) { self.hub.remove(id) }
}
