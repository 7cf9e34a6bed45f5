//! Session Controller - owns the Session and serialises every transition
//!
//! # Architecture
//!
//! ```text
//! SessionController (cloneable handle)
//!     │ commands
//!     ▼
//! actor task ── SessionMachine (pure) ── effects ──▶ adapters / resolver (spawned)
//!     ▲                                                    │
//!     └─────────────────── results / events ───────────────┘
//!     │
//!     ├──▶ watch::Sender<Session>   (state(), watch())
//!     └──▶ subscribers              (subscribe())
//! ```
//!
//! All Session mutations happen on the actor task, one command at a time.
//! Adapter calls and balance lookups run on spawned tasks and report back
//! through the same queue, so their results interleave with user commands
//! in arrival order.

mod machine;
mod subscribers;

pub use machine::{ConnectDecision, Effect, SessionMachine, SwitchDecision};
pub use subscribers::{SessionListener, Subscription};

use crate::adapter::{AccountInfo, AdapterEvent, AdapterKind, ListenerId, ProviderAdapter};
use crate::balance::{BalanceResolver, BalanceResult};
use crate::chain::ChainRegistry;
use crate::error::{WalletError, WalletResult};
use crate::runtime::Shutdown;
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use subscribers::Subscribers;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Connect { kind: AdapterKind, reply: Reply<WalletResult<Session>> },
    ConnectFinished { kind: AdapterKind, attempt: u64, result: WalletResult<AccountInfo> },
    Disconnect { reply: Reply<Session> },
    SwitchChain { chain_id: u64, reply: Reply<WalletResult<Session>> },
    SwitchFinished { ticket: u64, epoch: u64, chain_id: u64, result: WalletResult<()> },
    RefreshBalance { reply: Reply<WalletResult<()>> },
    AdapterReady(AdapterKind),
    AdapterEvent { source: AdapterKind, event: AdapterEvent },
    BalanceResolved { seq: u64, result: BalanceResult },
}

type Inbox = mpsc::WeakUnboundedSender<Command>;

fn post(inbox: &Inbox, command: Command) {
    if let Some(tx) = inbox.upgrade() {
        let _ = tx.send(command);
    }
}

pub struct ControllerBuilder {
    resolver: BalanceResolver,
    adapters: HashMap<AdapterKind, Arc<dyn ProviderAdapter>>,
}

impl ControllerBuilder {
    pub fn new(resolver: BalanceResolver) -> Self { Self { resolver, adapters: HashMap::new() } }

    /// Register a backend. A later adapter of the same kind replaces the earlier one.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Start the controller task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> SessionController {
        let registry = self.resolver.shared_registry();
        let kinds: Vec<AdapterKind> = self.adapters.keys().copied().collect();
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Session::disconnected());
        let subscribers = Arc::new(Subscribers::default());
        let shutdown = Shutdown::new();

        for (kind, adapter) in &self.adapters {
            let (kind, adapter, inbox) = (*kind, adapter.clone(), commands.downgrade());
            tokio::spawn(async move {
                match adapter.initialize().await {
                    Ok(()) => post(&inbox, Command::AdapterReady(kind)),
                    Err(e) => warn!(%kind, "backend unavailable: {e}"),
                }
            });
        }

        let actor = Actor {
            machine: SessionMachine::new(registry.clone()),
            adapters: self.adapters,
            resolver: self.resolver,
            inbox: commands.downgrade(),
            listeners: HashMap::new(),
            connect_waiters: HashMap::new(),
            switch_waiters: HashMap::new(),
            state: state_tx,
            subscribers: subscribers.clone(),
        };
        tokio::spawn(actor.run(rx, shutdown.subscribe()));
        info!(adapters = ?kinds, "session controller started");

        SessionController { commands, state: state_rx, subscribers, shutdown, registry }
    }
}

#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Session>,
    subscribers: Arc<Subscribers>,
    shutdown: Shutdown,
    registry: Arc<ChainRegistry>,
}

impl SessionController {
    pub fn builder(resolver: BalanceResolver) -> ControllerBuilder { ControllerBuilder::new(resolver) }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> WalletResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).map_err(|_| WalletError::Cancelled)?;
        rx.await.map_err(|_| WalletError::Cancelled)
    }

    pub async fn connect(&self, kind: AdapterKind) -> WalletResult<Session> {
        self.request(|reply| Command::Connect { kind, reply }).await?
    }

    /// Open the multi-wallet modal.
    pub async fn connect_via_aggregator(&self) -> WalletResult<Session> { self.connect(AdapterKind::Aggregator).await }

    /// Connect straight to the injected browser wallet.
    pub async fn connect_direct(&self) -> WalletResult<Session> { self.connect(AdapterKind::Injected).await }

    /// Pair a remote wallet over the relay.
    pub async fn connect_via_relay(&self) -> WalletResult<Session> { self.connect(AdapterKind::Relay).await }

    pub async fn disconnect(&self) -> Session {
        match self.request(|reply| Command::Disconnect { reply }).await {
            Ok(session) => session,
            Err(_) => self.state(),
        }
    }

    pub async fn switch_chain(&self, chain_id: u64) -> WalletResult<Session> {
        self.request(|reply| Command::SwitchChain { chain_id, reply }).await?
    }

    /// Re-query the balance for the current address and chain.
    pub async fn refresh_balance(&self) -> WalletResult<()> {
        self.request(|reply| Command::RefreshBalance { reply }).await?
    }

    pub fn state(&self) -> Session { self.state.borrow().clone() }

    pub fn watch(&self) -> watch::Receiver<Session> { self.state.clone() }

    pub fn subscribe(&self, listener: impl Fn(&Session) + Send + Sync + 'static) -> Subscription {
        self.subscribers.add(Arc::new(listener))
    }

    pub fn registry(&self) -> &ChainRegistry { &self.registry }

    /// Block explorer page for the connected address.
    pub fn explorer_url(&self) -> Option<String> {
        let session = self.state();
        let chain = self.registry.describe(session.chain_id?).ok()?;
        Some(chain.address_url(session.address.as_deref()?))
    }

    /// Stop the controller task and release adapter listeners. Remote
    /// sessions are left as they are.
    pub fn shutdown(&self) { self.shutdown.trigger() }

    pub fn is_shut_down(&self) -> bool { self.shutdown.is_triggered() }
}

struct Actor {
    machine: SessionMachine,
    adapters: HashMap<AdapterKind, Arc<dyn ProviderAdapter>>,
    resolver: BalanceResolver,
    inbox: Inbox,
    listeners: HashMap<AdapterKind, Vec<ListenerId>>,
    connect_waiters: HashMap<u64, Vec<Reply<WalletResult<Session>>>>,
    switch_waiters: HashMap<u64, Reply<WalletResult<Session>>>,
    state: watch::Sender<Session>,
    subscribers: Arc<Subscribers>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        self.teardown();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { kind, reply } => {
                match self.machine.connect(kind) {
                    Ok(ConnectDecision::Started(attempt)) | Ok(ConnectDecision::Joined(attempt)) => {
                        self.connect_waiters.entry(attempt).or_default().push(reply);
                    }
                    Ok(ConnectDecision::Current(session)) => {
                        let _ = reply.send(Ok(session));
                    }
                    Err(e) => {
                        debug!(%kind, "connect refused: {e}");
                        let _ = reply.send(Err(e));
                    }
                }
                self.run_effects();
            }
            Command::ConnectFinished { kind, attempt, result } => {
                let outcome = self.machine.connect_finished(kind, attempt, result);
                self.run_effects();
                for waiter in self.connect_waiters.remove(&attempt).unwrap_or_default() {
                    let _ = waiter.send(outcome.clone());
                }
            }
            Command::Disconnect { reply } => {
                let cancelled = self.machine.disconnect();
                self.run_effects();
                if let Some(attempt) = cancelled {
                    for waiter in self.connect_waiters.remove(&attempt).unwrap_or_default() {
                        let _ = waiter.send(Err(WalletError::Cancelled));
                    }
                }
                let _ = reply.send(self.machine.session().clone());
            }
            Command::SwitchChain { chain_id, reply } => {
                match self.machine.switch_chain(chain_id) {
                    Ok(SwitchDecision::Started(ticket)) => {
                        self.switch_waiters.insert(ticket, reply);
                    }
                    Ok(SwitchDecision::Current(session)) => {
                        let _ = reply.send(Ok(session));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
                self.run_effects();
            }
            Command::SwitchFinished { ticket, epoch, chain_id, result } => {
                let outcome = self.machine.switch_finished(epoch, chain_id, result);
                self.run_effects();
                if let Some(waiter) = self.switch_waiters.remove(&ticket) {
                    let _ = waiter.send(outcome);
                }
            }
            Command::RefreshBalance { reply } => {
                let outcome = self.machine.refresh_balance();
                self.run_effects();
                let _ = reply.send(outcome);
            }
            Command::AdapterReady(kind) => {
                self.machine.adapter_ready(kind);
                self.run_effects();
                if !self.machine.is_attached(kind) {
                    return;
                }
                // Session the backend restored before we were listening.
                let snapshot = self.adapters.get(&kind).and_then(|a| a.get_accounts()).filter(|i| !i.is_empty());
                if let Some(info) = snapshot {
                    info!(%kind, "reconciling restored session");
                    self.machine.adapter_event(kind, AdapterEvent::Accounts(info));
                    self.run_effects();
                }
            }
            Command::AdapterEvent { source, event } => {
                self.machine.adapter_event(source, event);
                self.run_effects();
            }
            Command::BalanceResolved { seq, result } => {
                self.machine.balance_resolved(seq, &result, chrono::Utc::now());
                self.run_effects();
            }
        }
    }

    fn run_effects(&mut self) {
        for effect in self.machine.take_effects() {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Attach(kind) => self.attach(kind),
            Effect::Detach(kind) => self.detach(kind),
            Effect::Connect { kind, attempt } => {
                let inbox = self.inbox.clone();
                let Some(adapter) = self.adapters.get(&kind).cloned() else {
                    let result = Err(WalletError::NotAvailable(format!("The {kind} backend")));
                    post(&inbox, Command::ConnectFinished { kind, attempt, result });
                    return;
                };
                tokio::spawn(async move {
                    let result = adapter.connect().await;
                    post(&inbox, Command::ConnectFinished { kind, attempt, result });
                });
            }
            Effect::Disconnect(kind) => {
                if let Some(adapter) = self.adapters.get(&kind).cloned() {
                    tokio::spawn(async move { adapter.disconnect().await });
                }
            }
            Effect::SwitchChain { kind, chain_id, ticket, epoch } => {
                let inbox = self.inbox.clone();
                let Some(adapter) = self.adapters.get(&kind).cloned() else {
                    let result = Err(WalletError::NotAvailable(format!("The {kind} backend")));
                    post(&inbox, Command::SwitchFinished { ticket, epoch, chain_id, result });
                    return;
                };
                tokio::spawn(async move {
                    let result = adapter.switch_chain(chain_id).await;
                    post(&inbox, Command::SwitchFinished { ticket, epoch, chain_id, result });
                });
            }
            Effect::ResolveBalance { seq, address, chain_id } => {
                let (inbox, resolver) = (self.inbox.clone(), self.resolver.clone());
                tokio::spawn(async move {
                    let result = resolver.resolve(&address, chain_id).await;
                    post(&inbox, Command::BalanceResolved { seq, result });
                });
            }
            Effect::Publish => {
                let session = self.machine.session().clone();
                debug!(status = %session.status, "session updated");
                self.state.send_replace(session.clone());
                self.subscribers.notify(&session);
            }
        }
    }

    fn attach(&mut self, kind: AdapterKind) {
        if self.listeners.contains_key(&kind) {
            return;
        }
        let Some(adapter) = self.adapters.get(&kind) else { return };

        let inbox = self.inbox.clone();
        let accounts = adapter.on_accounts_changed(Arc::new(move |info| {
            post(&inbox, Command::AdapterEvent { source: kind, event: AdapterEvent::Accounts(info) });
        }));
        let inbox = self.inbox.clone();
        let ended = adapter.on_session_ended(Arc::new(move || {
            post(&inbox, Command::AdapterEvent { source: kind, event: AdapterEvent::SessionEnded });
        }));
        self.listeners.insert(kind, vec![accounts, ended]);
        debug!(%kind, "listeners attached");
    }

    fn detach(&mut self, kind: AdapterKind) {
        let Some(ids) = self.listeners.remove(&kind) else { return };
        if let Some(adapter) = self.adapters.get(&kind) {
            for id in ids {
                adapter.remove_listener(id);
            }
        }
        debug!(%kind, "listeners detached");
    }

    fn teardown(&mut self) {
        let kinds: Vec<AdapterKind> = self.listeners.keys().copied().collect();
        for kind in kinds {
            self.detach(kind);
        }
        for (_, waiters) in self.connect_waiters.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(WalletError::Cancelled));
            }
        }
        for (_, waiter) in self.switch_waiters.drain() {
            let _ = waiter.send(Err(WalletError::Cancelled));
        }
        info!("session controller stopped");
    }
}
