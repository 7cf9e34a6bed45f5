//! Multi-connector aggregator: one modal, many underlying connectors.
//!
//! The modal backend is initialised through an [`InitGuard`] so it happens
//! once per process no matter how many adapters share the guard. Connector
//! wiring and session restore run once per adapter instance. Only events from
//! the connector the user picked are forwarded.

use super::{lock, AccountInfo, AccountsCallback, AdapterKind, EventHub, InitGuard, ListenerId, ProviderAdapter, SessionEndedCallback};
use crate::chain::ChainRegistry;
use crate::config::WalletConfig;
use crate::error::{WalletError, WalletResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorOption {
    pub id: String,
    pub name: String,
    pub kind: AdapterKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModalError {
    #[error("modal dismissed")]
    Dismissed,
    #[error("modal blocked: {0}")]
    Blocked(String),
    #[error("modal failed: {0}")]
    Failed(String),
}

impl From<ModalError> for WalletError {
    fn from(e: ModalError) -> Self {
        match e {
            ModalError::Dismissed => WalletError::UserRejected,
            ModalError::Blocked(_) => WalletError::NotAvailable("Wallet selector".into()),
            ModalError::Failed(msg) => WalletError::Unknown(msg),
        }
    }
}

#[async_trait]
pub trait ConnectorModal: Send + Sync {
    async fn init(&self, project_id: &str, chains: &[u64]) -> Result<(), ModalError>;
    /// Index into `options` of the connector the user picked.
    async fn select(&self, options: &[ConnectorOption]) -> Result<usize, ModalError>;
    async fn close(&self) {}
}

struct Connector {
    option: ConnectorOption,
    adapter: Arc<dyn ProviderAdapter>,
}

pub struct AggregatorAdapter {
    modal: Arc<dyn ConnectorModal>,
    connectors: Vec<Connector>,
    config: WalletConfig,
    registry: Arc<ChainRegistry>,
    guard: InitGuard,
    wired: OnceCell<()>,
    hub: Arc<EventHub>,
    active: Arc<Mutex<Option<usize>>>,
}

impl AggregatorAdapter {
    pub fn new(modal: Arc<dyn ConnectorModal>, config: WalletConfig, registry: Arc<ChainRegistry>) -> Self {
        Self {
            modal,
            connectors: Vec::new(),
            config,
            registry,
            guard: InitGuard::new(),
            wired: OnceCell::new(),
            hub: Arc::new(EventHub::new()),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Share an init guard owned by the composition root.
    pub fn with_guard(mut self, guard: InitGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_connector(mut self, id: impl Into<String>, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let option = ConnectorOption { id: id.into(), name: name.into(), kind: adapter.kind() };
        self.connectors.push(Connector { option, adapter });
        self
    }

    pub fn options(&self) -> Vec<ConnectorOption> { self.connectors.iter().map(|c| c.option.clone()).collect() }

    pub fn guard(&self) -> &InitGuard { &self.guard }

    pub fn active_connector(&self) -> Option<ConnectorOption> {
        let active = *lock(&self.active);
        active.and_then(|i| self.connectors.get(i)).map(|c| c.option.clone())
    }

    fn active_adapter(&self) -> Option<Arc<dyn ProviderAdapter>> {
        let active = *lock(&self.active);
        active.and_then(|i| self.connectors.get(i)).map(|c| c.adapter.clone())
    }

    pub async fn ensure_initialized(&self) -> WalletResult<()> {
        // Fail fast: never hand an invalid ID to the modal backend.
        let project_id = self.config.project_id()?.to_string();
        let chains = self.registry.ids();

        self.guard
            .ensure(|| async move {
                self.modal.init(&project_id, &chains).await.map_err(WalletError::from)?;
                info!("wallet modal initialised");
                Ok::<(), WalletError>(())
            })
            .await?;

        self.wired
            .get_or_init(|| async {
                for (index, connector) in self.connectors.iter().enumerate() {
                    if let Err(e) = connector.adapter.initialize().await {
                        warn!(connector = %connector.option.id, "connector unavailable: {e}");
                    }
                    self.wire(index);
                }
                self.restore();
                debug!(connectors = self.connectors.len(), "aggregator connectors wired");
            })
            .await;
        Ok(())
    }

    fn wire(&self, index: usize) {
        let connector = &self.connectors[index];

        let hub = self.hub.clone();
        let active = self.active.clone();
        connector.adapter.on_accounts_changed(Arc::new(move |info: AccountInfo| {
            let forward = {
                let mut active = lock(&active);
                match *active {
                    Some(current) => current == index,
                    None if !info.is_empty() => {
                        *active = Some(index);
                        true
                    }
                    None => false,
                }
            };
            if forward {
                hub.emit_accounts(info.first_only());
            }
        }));

        let hub = self.hub.clone();
        let active = self.active.clone();
        connector.adapter.on_session_ended(Arc::new(move || {
            let was_active = {
                let mut active = lock(&active);
                if *active == Some(index) {
                    *active = None;
                    true
                } else {
                    false
                }
            };
            if was_active {
                hub.emit_session_ended();
            }
        }));
    }

    fn restore(&self) {
        let restored = self
            .connectors
            .iter()
            .position(|c| c.adapter.get_accounts().is_some_and(|info| !info.is_empty()));
        if let Some(index) = restored {
            info!(connector = %self.connectors[index].option.id, "aggregator restored a session");
            *lock(&self.active) = Some(index);
        }
    }
}

#[async_trait]
impl ProviderAdapter for AggregatorAdapter {
    fn kind(&self) -> AdapterKind { AdapterKind::Aggregator }

    async fn initialize(&self) -> WalletResult<()> { self.ensure_initialized().await }

    async fn connect(&self) -> WalletResult<AccountInfo> {
        self.ensure_initialized().await?;
        if let Some(info) = self.get_accounts() {
            return Ok(info);
        }

        let options = self.options();
        if options.is_empty() {
            return Err(WalletError::NotAvailable("Wallet connectors".into()));
        }
        let index = self.modal.select(&options).await?;
        let connector = self
            .connectors
            .get(index)
            .ok_or_else(|| WalletError::Unknown(format!("modal picked connector {index} of {}", options.len())))?;

        *lock(&self.active) = Some(index);
        debug!(connector = %connector.option.id, "connecting through aggregator");
        let result = connector.adapter.connect().await;
        self.modal.close().await;

        match result {
            Ok(info) => Ok(info.first_only()),
            Err(e) => {
                let mut active = lock(&self.active);
                if *active == Some(index) {
                    *active = None;
                }
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        let index = lock(&self.active).take();
        if let Some(connector) = index.and_then(|i| self.connectors.get(i)) {
            connector.adapter.disconnect().await;
        }
    }

    fn get_accounts(&self) -> Option<AccountInfo> {
        self.active_adapter()
            .and_then(|adapter| adapter.get_accounts())
            .filter(|info| !info.is_empty())
            .map(AccountInfo::first_only)
    }

    async fn switch_chain(&self, chain_id: u64) -> WalletResult<()> {
        let adapter = self.active_adapter().ok_or(WalletError::NotConnected)?;
        adapter.switch_chain(chain_id).await
    }

    fn on_accounts_changed(&self, callback: AccountsCallback) -> ListenerId { self.hub.on_accounts_changed(callback) }
    fn on_session_ended(&self, callback: SessionEndedCallback) -> ListenerId { self.hub.on_session_ended(callback) }
    fn remove_listener(&self, id: ListenerId) { self.hub.remove(id) }
}
