//! Provider Adapters - interchangeable connection backends
//!
//! # Architecture
//!
//! ```text
//! SessionController (generic over dyn ProviderAdapter)
//!     │
//!     ├── InjectedAdapter ──▶ Eip1193Provider   (browser extension)
//!     │
//!     ├── RelayAdapter ─────▶ RelayClient       (QR / deep-link pairing)
//!     │
//!     └── AggregatorAdapter ─▶ ConnectorModal   (one modal, many connectors)
//!               │
//!               └── connectors: [dyn ProviderAdapter]   (may include the two above)
//! ```
//!
//! # Capability contract
//!
//! | Method | Description |
//! |--------|-------------|
//! | `connect` | Start a connection; may wait on user approval |
//! | `disconnect` | Tear down the adapter's own session; idempotent, never fails |
//! | `get_accounts` | Cached snapshot, used to reconcile restored sessions |
//! | `on_accounts_changed` / `on_session_ended` | Register reconciliation callbacks |
//! | `switch_chain` | Ask the wallet to move to another registry chain |
//!
//! Each adapter delivers at most one callback invocation per underlying
//! event, in arrival order. There is no ordering across adapters.

mod aggregator;
mod events;
mod guard;
mod injected;
mod relay;

pub use aggregator::{AggregatorAdapter, ConnectorModal, ConnectorOption, ModalError};
pub use events::{AccountsCallback, EventHub, ListenerId, SessionEndedCallback};
pub use guard::InitGuard;
pub use injected::{Eip1193Provider, InjectedAdapter, ProviderEvent, ProviderEventHandler, ProviderRpcError};
pub use relay::{PairingProposal, RelayAdapter, RelayClient, RelayError, RelayEvent, RelayEventHandler, RelaySession};

use crate::error::{WalletError, WalletResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Injected,
    Relay,
    Aggregator,
}

impl AdapterKind {

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Injected => "injected",
            AdapterKind::Relay => "relay",
            AdapterKind::Aggregator => "aggregator",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Accounts as reported by a backend. The first entry is the active account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub accounts: Vec<String>,
    pub chain_id: Option<u64>,
}

impl AccountInfo {
    pub fn new(accounts: Vec<String>, chain_id: Option<u64>) -> Self { Self { accounts, chain_id } }

    pub fn single(address: impl Into<String>, chain_id: u64) -> Self {
        Self { accounts: vec![address.into()], chain_id: Some(chain_id) }
    }

    pub fn empty() -> Self { Self::default() }

    pub fn address(&self) -> Option<&str> { self.accounts.first().map(String::as_str) }

    pub fn is_empty(&self) -> bool { self.accounts.is_empty() }

    /// Keep only the first account.
    pub fn first_only(mut self) -> Self {
        self.accounts.truncate(1);
        self
    }
}

/// Event delivered to the controller by an adapter callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Accounts(AccountInfo),
    SessionEnded,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    /// One-time backend setup. Adapters without setup succeed immediately.
    async fn initialize(&self) -> WalletResult<()> { Ok(()) }

    async fn connect(&self) -> WalletResult<AccountInfo>;

    /// Idempotent; remote failures are logged, never returned.
    async fn disconnect(&self);

    fn get_accounts(&self) -> Option<AccountInfo>;

    async fn switch_chain(&self, chain_id: u64) -> WalletResult<()> {
        let _ = chain_id;
        Err(WalletError::NotAvailable(format!("Network switching through the {} backend", self.kind())))
    }

    fn on_accounts_changed(&self, callback: AccountsCallback) -> ListenerId;
    fn on_session_ended(&self, callback: SessionEndedCallback) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
}

/// Lowercase `0x` + 40 hex address, or `None` when malformed.
pub fn normalize_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let hex = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex.to_ascii_lowercase()))
}

/// Normalize a wallet-reported account list, dropping malformed entries.
pub fn normalize_accounts<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .filter_map(|a| {
            let normalized = normalize_address(a.as_ref());
            if normalized.is_none() {
                tracing::debug!(account = a.as_ref(), "dropping malformed account");
            }
            normalized
        })
        .collect()
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
