//! Relay-paired remote wallet (QR code / deep link).
//!
//! The relay client owns the transport and pairing UI. This adapter builds the
//! proposal, waits for approval, tracks the session topic and turns CAIP-10
//! accounts into [`AccountInfo`].

use super::{lock, normalize_address, AccountInfo, AccountsCallback, AdapterKind, EventHub, ListenerId, ProviderAdapter, SessionEndedCallback};
use crate::chain::ChainRegistry;
use crate::config::{AppMetadata, WalletConfig};
use crate::error::{WalletError, WalletResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const EIP155_METHODS: [&str; 4] = ["eth_sendTransaction", "personal_sign", "eth_signTypedData_v4", "wallet_switchEthereumChain"];
pub const EIP155_EVENTS: [&str; 2] = ["accountsChanged", "chainChanged"];

/// Session request sent to the remote wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingProposal {
    pub project_id: String,
    pub metadata: AppMetadata,
    pub required_chains: Vec<u64>,
    pub optional_chains: Vec<u64>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Approved session. Accounts are CAIP-10 (`eip155:<chain>:<address>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySession {
    pub topic: String,
    pub accounts: Vec<String>,
    pub peer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    AccountsChanged { topic: String, accounts: Vec<String> },
    ChainChanged { topic: String, chain_id: u64 },
    SessionDeleted { topic: String },
    SessionExpired { topic: String },
}

pub type RelayEventHandler = Arc<dyn Fn(RelayEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("rejected by peer ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("proposal expired")]
    Expired,
    #[error("relay transport: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Resolves once the remote wallet approves the proposal.
    async fn pair(&self, proposal: PairingProposal) -> Result<RelaySession, RelayError>;
    async fn request(&self, topic: &str, chain_id: u64, method: &str, params: Value) -> Result<Value, RelayError>;
    async fn disconnect(&self, topic: &str) -> Result<(), RelayError>;
    /// Session the client restored from its own storage, if any.
    fn restored_session(&self) -> Option<RelaySession>;
    fn set_event_handler(&self, handler: RelayEventHandler);
}

/// Split `eip155:<chain>:<address>`. Plain addresses pass through without a chain.
pub fn parse_caip10(account: &str) -> Option<(Option<u64>, String)> {
    let mut parts = account.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("eip155"), Some(chain), Some(address), None) => {
            let chain_id = chain.parse::<u64>().ok()?;
            Some((Some(chain_id), normalize_address(address)?))
        }
        (Some(address), None, None, None) => Some((None, normalize_address(address)?)),
        _ => None,
    }
}

fn accounts_from_caip10(raw: &[String]) -> AccountInfo {
    let mut info = AccountInfo::empty();
    for account in raw {
        match parse_caip10(account) {
            Some((chain_id, address)) => {
                if info.chain_id.is_none() {
                    info.chain_id = chain_id;
                }
                if !info.accounts.contains(&address) {
                    info.accounts.push(address);
                }
            }
            None => debug!(account = %account, "ignoring unparsable CAIP-10 account"),
        }
    }
    info
}

struct Tracked {
    topic: String,
    info: AccountInfo,
}

pub struct RelayAdapter {
    client: Arc<dyn RelayClient>,
    config: WalletConfig,
    registry: Arc<ChainRegistry>,
    hub: Arc<EventHub>,
    session: Arc<Mutex<Option<Tracked>>>,
}

impl RelayAdapter {
    pub fn new(client: Arc<dyn RelayClient>, config: WalletConfig, registry: Arc<ChainRegistry>) -> Self {
        let hub = Arc::new(EventHub::new());
        let session: Arc<Mutex<Option<Tracked>>> = Arc::new(Mutex::new(None));
        {
            let hub = hub.clone();
            let session = session.clone();
            client.set_event_handler(Arc::new(move |event| handle_event(&hub, &session, event)));
        }
        Self { client, config, registry, hub, session }
    }

    pub fn proposal(&self, project_id: &str) -> PairingProposal {
        PairingProposal {
            project_id: project_id.to_string(),
            metadata: self.config.metadata.clone(),
            required_chains: vec![self.registry.primary().id],
            optional_chains: self.registry.ids().into_iter().skip(1).collect(),
            methods: EIP155_METHODS.iter().map(|m| m.to_string()).collect(),
            events: EIP155_EVENTS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn topic(&self) -> Option<String> { lock(&self.session).as_ref().map(|s| s.topic.clone()) }

    fn track(&self, session: RelaySession) -> WalletResult<AccountInfo> {
        let mut info = accounts_from_caip10(&session.accounts);
        if info.is_empty() {
            return Err(WalletError::Unknown("relay session has no accounts".into()));
        }
        if info.chain_id.is_none() {
            info.chain_id = Some(self.registry.primary().id);
        }
        info!(topic = %session.topic, peer = session.peer_name.as_deref().unwrap_or("unknown"), "relay session established");
        *lock(&self.session) = Some(Tracked { topic: session.topic, info: info.clone() });
        Ok(info)
    }
}

impl From<RelayError> for WalletError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Rejected { .. } => WalletError::UserRejected,
            RelayError::Expired => WalletError::Unknown("pairing proposal expired".into()),
            RelayError::Transport(msg) => WalletError::Network(msg),
            RelayError::Other(msg) => WalletError::Unknown(msg),
        }
    }
}

fn handle_event(hub: &EventHub, session: &Mutex<Option<Tracked>>, event: RelayEvent) {
    let topic = match &event {
        RelayEvent::AccountsChanged { topic, .. }
        | RelayEvent::ChainChanged { topic, .. }
        | RelayEvent::SessionDeleted { topic }
        | RelayEvent::SessionExpired { topic } => topic.clone(),
    };

    let snapshot = {
        let mut guard = lock(session);
        let Some(tracked) = guard.as_mut().filter(|t| t.topic == topic) else {
            debug!(topic = %topic, "relay event for untracked topic");
            return;
        };
        match event {
            RelayEvent::AccountsChanged { accounts, .. } => {
                let incoming = accounts_from_caip10(&accounts);
                if incoming.is_empty() {
                    // Stop tracking so the next connect pairs afresh.
                    info!(topic = %topic, "relay wallet removed all accounts");
                    *guard = None;
                    Some(AccountInfo::empty())
                } else {
                    tracked.info.accounts = incoming.accounts;
                    if incoming.chain_id.is_some() {
                        tracked.info.chain_id = incoming.chain_id;
                    }
                    Some(tracked.info.clone())
                }
            }
            RelayEvent::ChainChanged { chain_id, .. } => {
                tracked.info.chain_id = Some(chain_id);
                Some(tracked.info.clone())
            }
            RelayEvent::SessionDeleted { .. } | RelayEvent::SessionExpired { .. } => {
                *guard = None;
                None
            }
        }
    };

    match snapshot {
        Some(info) => hub.emit_accounts(info),
        None => {
            info!(topic = %topic, "relay session ended by peer");
            hub.emit_session_ended();
        }
    }
}

#[async_trait]
impl ProviderAdapter for RelayAdapter {
    fn kind(&self) -> AdapterKind { AdapterKind::Relay }

    async fn initialize(&self) -> WalletResult<()> {
        self.config.project_id()?;
        if let Some(restored) = self.client.restored_session() {
            if lock(&self.session).is_none() {
                if let Err(e) = self.track(restored) {
                    debug!("restored relay session unusable: {e}");
                }
            }
        }
        Ok(())
    }

    async fn connect(&self) -> WalletResult<AccountInfo> {
        let project_id = self.config.project_id()?.to_string();
        if let Some(info) = self.get_accounts() {
            return Ok(info);
        }

        let timeout = self.config.approval_timeout;
        let session = match tokio::time::timeout(timeout, self.client.pair(self.proposal(&project_id))).await {
            Ok(result) => result?,
            Err(_) => return Err(WalletError::Timeout(timeout)),
        };
        self.track(session)
    }

    async fn disconnect(&self) {
        let Some(tracked) = lock(&self.session).take() else { return };
        if let Err(e) = self.client.disconnect(&tracked.topic).await {
            warn!(topic = %tracked.topic, "relay disconnect failed: {e}");
        }
    }

    fn get_accounts(&self) -> Option<AccountInfo> {
        lock(&self.session).as_ref().map(|s| s.info.clone()).filter(|info| !info.is_empty())
    }

    async fn switch_chain(&self, chain_id: u64) -> WalletResult<()> {
        let chain = self.registry.describe(chain_id).map_err(|e| WalletError::UnsupportedChain(e.0))?;
        let (topic, current) = {
            let guard = lock(&self.session);
            let tracked = guard.as_ref().ok_or(WalletError::NotConnected)?;
            (tracked.topic.clone(), tracked.info.chain_id.unwrap_or(self.registry.primary().id))
        };

        let timeout = self.config.approval_timeout;
        let params = json!([{ "chainId": chain.hex_id() }]);
        match tokio::time::timeout(timeout, self.client.request(&topic, current, "wallet_switchEthereumChain", params)).await {
            Ok(result) => result?,
            Err(_) => return Err(WalletError::Timeout(timeout)),
        };

        if let Some(tracked) = lock(&self.session).as_mut().filter(|t| t.topic == topic) {
            tracked.info.chain_id = Some(chain_id);
        }
        Ok(())
    }

    fn on_accounts_changed(&self, callback: AccountsCallback) -> ListenerId { self.hub.on_accounts_changed(callback) }
    fn on_session_ended(&self, callback: SessionEndedCallback) -> ListenerId { self.hub.on_session_ended(callback) }
    fn remove_listener(&self, id: ListenerId) { self.hub.remove(id) }
}
