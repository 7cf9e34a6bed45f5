//! Error taxonomy shared by adapters, the resolver and the controller.
//!
//! Capability errors (EIP-1193 provider errors, relay errors) are translated
//! into [`WalletError`] at the adapter boundary. Nothing else reaches
//! subscribers.

use crate::adapter::AdapterKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// Missing or placeholder project identifier. Fatal to the relay-backed paths only.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("request rejected by the user")]
    UserRejected,
    #[error("not available: {0}")]
    NotAvailable(String),
    #[error("wallet did not respond within {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected wallet error: {0}")]
    Unknown(String),

    // Controller refusals. These never land in `Session::last_error`.
    #[error("a {0} connection attempt is already in progress")]
    ConnectInProgress(AdapterKind),
    #[error("no wallet connected")]
    NotConnected,
    #[error("unsupported chain {0}")]
    UnsupportedChain(u64),
    #[error("connection attempt cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    UserRejected,
    NotAvailable,
    Timeout,
    Network,
    Unknown,
    ConnectInProgress,
    NotConnected,
    UnsupportedChain,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::NotAvailable => "not_available",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Unknown => "unknown",
            ErrorKind::ConnectInProgress => "connect_in_progress",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::UnsupportedChain => "unsupported_chain",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Configuration(_) => ErrorKind::Configuration,
            WalletError::UserRejected => ErrorKind::UserRejected,
            WalletError::NotAvailable(_) => ErrorKind::NotAvailable,
            WalletError::Timeout(_) => ErrorKind::Timeout,
            WalletError::Network(_) => ErrorKind::Network,
            WalletError::Unknown(_) => ErrorKind::Unknown,
            WalletError::ConnectInProgress(_) => ErrorKind::ConnectInProgress,
            WalletError::NotConnected => ErrorKind::NotConnected,
            WalletError::UnsupportedChain(_) => ErrorKind::UnsupportedChain,
            WalletError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for the controller-level refusals that leave the Session untouched.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            WalletError::ConnectInProgress(_)
                | WalletError::NotConnected
                | WalletError::UnsupportedChain(_)
                | WalletError::Cancelled
        )
    }

    /// One message per kind, suitable for display. `Unknown` detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            WalletError::Configuration(_) => {
                "Wallet connection is not configured. Set a valid project ID.".into()
            }
            WalletError::UserRejected => "Connection request was rejected in the wallet.".into(),
            WalletError::NotAvailable(what) => format!("{what} is not available. Try another connection method."),
            WalletError::Timeout(_) => "The wallet did not respond in time.".into(),
            WalletError::Network(_) => "Network request failed.".into(),
            WalletError::Unknown(_) => "Failed to connect wallet.".into(),
            WalletError::ConnectInProgress(_) => "A connection attempt is already in progress.".into(),
            WalletError::NotConnected => "No wallet is connected.".into(),
            WalletError::UnsupportedChain(id) => format!("Unsupported network (chain {id})."),
            WalletError::Cancelled => "Connection attempt was cancelled.".into(),
        }
    }
}
