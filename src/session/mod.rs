//! Session - the single observable snapshot of wallet connection state

use crate::adapter::AdapterKind;
use crate::balance::{units, BalanceResult};
use crate::error::{ErrorKind, WalletError};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Decimal places shown by [`Balance::display`].
pub const DISPLAY_DECIMALS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceFreshness {
    Fresh,
    /// A refresh is in flight; the amount is the previous reading.
    Stale,
    /// Every endpoint failed; the amount is a placeholder zero.
    Unreliable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    #[serde(serialize_with = "as_decimal_string")]
    pub amount: u128,
    pub formatted: String,
    pub symbol: String,
    pub freshness: BalanceFreshness,
    pub fetched_at: DateTime<Utc>,
}

fn as_decimal_string<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl Balance {
    pub fn from_result(result: &BalanceResult, fetched_at: DateTime<Utc>) -> Self {
        Self {
            amount: result.amount,
            formatted: result.formatted.clone(),
            symbol: result.symbol.clone(),
            freshness: if result.reliable { BalanceFreshness::Fresh } else { BalanceFreshness::Unreliable },
            fetched_at,
        }
    }

    pub fn is_reliable(&self) -> bool { self.freshness != BalanceFreshness::Unreliable }

    /// "1.2345 ETH": four places, truncated rather than rounded.
    pub fn display(&self) -> String {
        format!("{} {}", units::truncate_decimal(&self.formatted, DISPLAY_DECIMALS), self.symbol)
    }
}

pub fn short_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    match (address.get(..6), address.get(address.len() - 4..)) {
        (Some(head), Some(tail)) => format!("{head}...{tail}"),
        _ => address.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&WalletError> for LastError {
    fn from(e: &WalletError) -> Self { Self { kind: e.kind(), message: e.user_message() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub status: SessionStatus,
    pub address: Option<String>,
    pub chain_id: Option<u64>,
    pub balance: Option<Balance>,
    pub last_error: Option<LastError>,
    pub active_adapter: Option<AdapterKind>,
    /// Chain the wallet reported that the registry does not know.
    pub unsupported_chain: Option<u64>,
}

impl Default for Session {
    fn default() -> Self { Self::disconnected() }
}

impl Session {
    pub fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            address: None,
            chain_id: None,
            balance: None,
            last_error: None,
            active_adapter: None,
            unsupported_chain: None,
        }
    }

    pub fn is_connected(&self) -> bool { self.status == SessionStatus::Connected }

    /// `0x1234...abcd` form of the connected address.
    pub fn short_address(&self) -> Option<String> { self.address.as_deref().map(short_address) }

    /// Drop everything tied to a live connection, keeping `last_error`.
    pub(crate) fn clear_connection(&mut self) {
        self.address = None;
        self.chain_id = None;
        self.balance = None;
        self.active_adapter = None;
        self.unsupported_chain = None;
    }

    /// Structural invariants every published snapshot satisfies.
    pub fn is_consistent(&self) -> bool {
        let has_identity = self.address.is_some() && self.chain_id.is_some();
        match self.status {
            SessionStatus::Connected => has_identity && self.active_adapter.is_some(),
            SessionStatus::Disconnected => {
                self.address.is_none() && self.chain_id.is_none() && self.balance.is_none() && self.active_adapter.is_none()
            }
            SessionStatus::Connecting | SessionStatus::Error => {
                self.address.is_none() && self.chain_id.is_none() && self.balance.is_none()
            }
        }
    }
}
