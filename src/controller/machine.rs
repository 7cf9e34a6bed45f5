//! Session state machine
//!
//! Pure transition logic. Inputs are method calls, outputs are the updated
//! [`Session`] plus a queue of [`Effect`]s the driver executes. Results of
//! effects come back in as further method calls tagged with the attempt,
//! ticket or sequence number they were issued with, so late results from
//! superseded work are recognised and dropped.
//!
//! ```text
//!              connect                 connect_finished(ok)
//! Disconnected ───────▶ Connecting ───────────────────────▶ Connected
//!      ▲                  │    │                                │
//!      │   disconnect     │    │ connect_finished(err)          │ accounts [] /
//!      ├──────────────────┘    ▼                                │ session ended /
//!      │                     Error ◀── (persists until next op) │ disconnect
//!      └────────────────────────────────────────────────────────┘
//! ```

use crate::adapter::{normalize_address, AccountInfo, AdapterEvent, AdapterKind};
use crate::balance::BalanceResult;
use crate::chain::ChainRegistry;
use crate::error::{ErrorKind, WalletError, WalletResult};
use crate::session::{Balance, BalanceFreshness, LastError, Session, SessionStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Register session listeners on the adapter.
    Attach(AdapterKind),
    Detach(AdapterKind),
    Connect { kind: AdapterKind, attempt: u64 },
    Disconnect(AdapterKind),
    SwitchChain { kind: AdapterKind, chain_id: u64, ticket: u64, epoch: u64 },
    ResolveBalance { seq: u64, address: String, chain_id: u64 },
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectDecision {
    Started(u64),
    /// Same backend already connecting; wait on that attempt.
    Joined(u64),
    /// Already connected through this backend.
    Current(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchDecision {
    Started(u64),
    Current(Session),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingConnect {
    attempt: u64,
    kind: AdapterKind,
}

pub struct SessionMachine {
    registry: Arc<ChainRegistry>,
    session: Session,
    pending: Option<PendingConnect>,
    attached: BTreeSet<AdapterKind>,
    next_attempt: u64,
    next_ticket: u64,
    /// Bumped whenever the connection identity is replaced or torn down.
    epoch: u64,
    balance_seq: u64,
    effects: Vec<Effect>,
}

impl SessionMachine {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            session: Session::disconnected(),
            pending: None,
            attached: BTreeSet::new(),
            next_attempt: 0,
            next_ticket: 0,
            epoch: 0,
            balance_seq: 0,
            effects: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session { &self.session }

    pub fn registry(&self) -> &ChainRegistry { &self.registry }

    pub fn pending_connect(&self) -> Option<(u64, AdapterKind)> { self.pending.map(|p| (p.attempt, p.kind)) }

    pub fn is_attached(&self, kind: AdapterKind) -> bool { self.attached.contains(&kind) }

    pub fn take_effects(&mut self) -> Vec<Effect> { std::mem::take(&mut self.effects) }

    // ---- inputs ------------------------------------------------------------

    /// A backend finished initialising and can deliver events.
    pub fn adapter_ready(&mut self, kind: AdapterKind) {
        match self.owner() {
            Some(owner) if owner != kind => debug!(%kind, %owner, "adapter ready while another owns the session"),
            _ => self.attach(kind),
        }
    }

    pub fn connect(&mut self, kind: AdapterKind) -> WalletResult<ConnectDecision> {
        if let Some(pending) = self.pending {
            if pending.kind == kind {
                return Ok(ConnectDecision::Joined(pending.attempt));
            }
            return Err(WalletError::ConnectInProgress(pending.kind));
        }
        if self.session.is_connected() && self.session.active_adapter == Some(kind) {
            return Ok(ConnectDecision::Current(self.session.clone()));
        }

        let before = self.session.clone();
        if let Some(previous) = self.session.active_adapter {
            info!(from = %previous, to = %kind, "replacing active adapter");
            self.effects.push(Effect::Disconnect(previous));
        }
        self.detach_others(kind);
        self.attach(kind);

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        self.pending = Some(PendingConnect { attempt, kind });
        self.invalidate();
        self.session.clear_connection();
        self.session.status = SessionStatus::Connecting;
        self.session.last_error = None;

        self.effects.push(Effect::Connect { kind, attempt });
        self.publish_if_changed(&before);
        Ok(ConnectDecision::Started(attempt))
    }

    pub fn connect_finished(&mut self, kind: AdapterKind, attempt: u64, result: WalletResult<AccountInfo>) -> WalletResult<Session> {
        if !matches!(self.pending, Some(p) if p.attempt == attempt) {
            let involved = self.owner() == Some(kind);
            if result.is_ok() && !involved {
                info!(%kind, attempt, "tearing down connection from abandoned attempt");
                self.effects.push(Effect::Disconnect(kind));
            }
            return Err(WalletError::Cancelled);
        }
        self.pending = None;

        let before = self.session.clone();
        let outcome = match result {
            Ok(info) if info.address().and_then(normalize_address).is_some() => {
                self.apply_accounts(kind, &info);
                Ok(self.session.clone())
            }
            Ok(_) => Err(WalletError::Unknown("wallet returned no accounts".into())),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            warn!(%kind, attempt, "connection failed: {e}");
            self.invalidate();
            self.session.clear_connection();
            self.session.status = SessionStatus::Error;
            self.session.last_error = Some(LastError::from(e));
        }
        self.publish_if_changed(&before);
        outcome
    }

    /// Returns the attempt number of a connect that was cancelled by this call.
    pub fn disconnect(&mut self) -> Option<u64> {
        let before = self.session.clone();
        let cancelled = self.pending.take();
        let target = self.session.active_adapter.or(cancelled.map(|p| p.kind));

        if let Some(kind) = target {
            self.effects.push(Effect::Disconnect(kind));
            self.detach(kind);
        }
        if let Some(p) = cancelled {
            info!(attempt = p.attempt, kind = %p.kind, "pending connect cancelled");
        }
        if self.session != Session::disconnected() {
            self.reset();
        }
        self.publish_if_changed(&before);
        cancelled.map(|p| p.attempt)
    }

    pub fn adapter_event(&mut self, source: AdapterKind, event: AdapterEvent) {
        if !self.accepts(source) {
            debug!(%source, "ignoring event from inactive adapter");
            return;
        }
        let before = self.session.clone();
        match event {
            AdapterEvent::Accounts(info) if !info.is_empty() => self.apply_accounts(source, &info),
            AdapterEvent::Accounts(_) | AdapterEvent::SessionEnded => self.end_session(source),
        }
        self.publish_if_changed(&before);
    }

    pub fn switch_chain(&mut self, chain_id: u64) -> WalletResult<SwitchDecision> {
        if let Some(pending) = self.pending {
            return Err(WalletError::ConnectInProgress(pending.kind));
        }
        if !self.session.is_connected() {
            return Err(WalletError::NotConnected);
        }
        if !self.registry.is_supported(chain_id) {
            return Err(WalletError::UnsupportedChain(chain_id));
        }
        if self.session.chain_id == Some(chain_id) && self.session.unsupported_chain.is_none() {
            return Ok(SwitchDecision::Current(self.session.clone()));
        }
        let kind = self.session.active_adapter.ok_or(WalletError::NotConnected)?;

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.effects.push(Effect::SwitchChain { kind, chain_id, ticket, epoch: self.epoch });
        Ok(SwitchDecision::Started(ticket))
    }

    pub fn switch_finished(&mut self, epoch: u64, chain_id: u64, result: WalletResult<()>) -> WalletResult<Session> {
        if epoch != self.epoch || !self.session.is_connected() {
            debug!(chain_id, "switch result for a replaced session");
            return result.and(Err(WalletError::Cancelled));
        }

        let before = self.session.clone();
        let outcome = match result {
            Ok(()) => {
                if self.session.chain_id != Some(chain_id) || self.session.unsupported_chain.is_some() {
                    self.session.chain_id = Some(chain_id);
                    self.session.unsupported_chain = None;
                    self.session.balance = None;
                    self.request_balance();
                }
                self.session.last_error = None;
                info!(chain_id, "switched network");
                Ok(self.session.clone())
            }
            Err(e) => {
                warn!(chain_id, "network switch failed: {e}");
                self.session.last_error = Some(LastError::from(&e));
                Err(e)
            }
        };
        self.publish_if_changed(&before);
        outcome
    }

    /// Returns whether the result was applied.
    pub fn balance_resolved(&mut self, seq: u64, result: &BalanceResult, now: DateTime<Utc>) -> bool {
        let current = seq == self.balance_seq
            && self.session.is_connected()
            && self.session.unsupported_chain.is_none()
            && self.session.address.as_deref() == Some(result.address.as_str())
            && self.session.chain_id == Some(result.chain_id);
        if !current {
            debug!(seq, latest = self.balance_seq, "discarding stale balance");
            return false;
        }
        let before = self.session.clone();
        self.session.balance = Some(Balance::from_result(result, now));
        self.publish_if_changed(&before);
        true
    }

    pub fn refresh_balance(&mut self) -> WalletResult<()> {
        if !self.session.is_connected() {
            return Err(WalletError::NotConnected);
        }
        if let Some(chain_id) = self.session.unsupported_chain {
            return Err(WalletError::UnsupportedChain(chain_id));
        }
        let before = self.session.clone();
        if let Some(balance) = self.session.balance.as_mut() {
            balance.freshness = BalanceFreshness::Stale;
        }
        self.request_balance();
        self.publish_if_changed(&before);
        Ok(())
    }

    // ---- transitions -------------------------------------------------------

    fn apply_accounts(&mut self, source: AdapterKind, info: &AccountInfo) {
        let Some(address) = info.address().and_then(normalize_address) else {
            self.end_session(source);
            return;
        };

        let was_connected = self.session.is_connected();
        let was_unsupported = self.session.unsupported_chain.is_some();
        let previous_chain = if was_connected { self.session.chain_id } else { None };
        let fallback = previous_chain.unwrap_or_else(|| self.registry.primary().id);

        let chain_id = match info.chain_id {
            Some(id) if self.registry.is_supported(id) => {
                self.session.unsupported_chain = None;
                id
            }
            Some(id) => {
                warn!(chain_id = id, "wallet is on an unsupported network");
                self.session.unsupported_chain = Some(id);
                self.session.last_error = Some(LastError::from(&WalletError::UnsupportedChain(id)));
                fallback
            }
            None => {
                debug!(chain_id = fallback, "wallet reported no chain");
                fallback
            }
        };

        let identity_changed = !was_connected
            || self.session.address.as_deref() != Some(address.as_str())
            || previous_chain != Some(chain_id);

        if self.session.active_adapter != Some(source) {
            self.detach_others(source);
            self.attach(source);
        }
        self.session.status = SessionStatus::Connected;
        self.session.address = Some(address);
        self.session.chain_id = Some(chain_id);
        self.session.active_adapter = Some(source);

        if self.session.unsupported_chain.is_some() {
            self.balance_seq += 1;
            self.session.balance = None;
        } else {
            let stale_error = matches!(&self.session.last_error, Some(e) if e.kind == ErrorKind::UnsupportedChain);
            if identity_changed || stale_error {
                self.session.last_error = None;
            }
            if identity_changed || was_unsupported {
                self.session.balance = None;
                self.request_balance();
            }
        }
    }

    fn end_session(&mut self, source: AdapterKind) {
        match self.session.status {
            SessionStatus::Connected => {
                info!(%source, "session ended by wallet");
                self.reset();
            }
            SessionStatus::Connecting => debug!(%source, "end of session while connecting; attempt decides"),
            SessionStatus::Disconnected | SessionStatus::Error => {}
        }
    }

    fn reset(&mut self) {
        self.invalidate();
        self.session = Session::disconnected();
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
        self.balance_seq += 1;
    }

    fn request_balance(&mut self) {
        let (Some(address), Some(chain_id)) = (self.session.address.clone(), self.session.chain_id) else { return };
        self.balance_seq += 1;
        self.effects.push(Effect::ResolveBalance { seq: self.balance_seq, address, chain_id });
    }

    // ---- listener bookkeeping ---------------------------------------------

    fn owner(&self) -> Option<AdapterKind> { self.session.active_adapter.or(self.pending.map(|p| p.kind)) }

    fn accepts(&self, source: AdapterKind) -> bool {
        match (self.session.active_adapter, self.pending) {
            (Some(active), _) => active == source,
            (None, Some(pending)) => pending.kind == source,
            (None, None) => self.attached.contains(&source),
        }
    }

    fn attach(&mut self, kind: AdapterKind) {
        if self.attached.insert(kind) {
            self.effects.push(Effect::Attach(kind));
        }
    }

    fn detach(&mut self, kind: AdapterKind) {
        if self.attached.remove(&kind) {
            self.effects.push(Effect::Detach(kind));
        }
    }

    fn detach_others(&mut self, keep: AdapterKind) {
        let others: Vec<AdapterKind> = self.attached.iter().copied().filter(|k| *k != keep).collect();
        for kind in others {
            self.detach(kind);
        }
    }

    fn publish_if_changed(&mut self, before: &Session) {
        if &self.session != before {
            self.effects.push(Effect::Publish);
        }
    }
}
