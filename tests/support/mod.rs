//! In-memory fakes for the wallet capabilities and the RPC transport.

#![allow(dead_code)]

use async_trait::async_trait;
use baseconnect::adapter::{
    ConnectorModal, ConnectorOption, Eip1193Provider, ModalError, PairingProposal, ProviderEvent, ProviderEventHandler,
    ProviderRpcError, RelayClient, RelayError, RelayEvent, RelayEventHandler, RelaySession,
};
use baseconnect::balance::{JsonRpcRequest, RpcError, RpcTransport};
use baseconnect::{BalanceResolver, ChainRegistry, Session, SessionController};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const WAIT: Duration = Duration::from_secs(5);
pub const PROJECT_ID: &str = "3fcc6bba6f1de962d911bb5b5c3dba68";

pub const BASE_PRIMARY_RPC: &str = "https://mainnet.base.org";
pub const BASE_SECONDARY_RPC: &str = "https://base-rpc.publicnode.com";
pub const SEPOLIA_PRIMARY_RPC: &str = "https://sepolia.base.org";

pub const ALICE: &str = "0xabcd00000000000000000000000000000000abcd";
pub const ALICE_CHECKSUM: &str = "0xABCD00000000000000000000000000000000ABCD";
pub const BOB: &str = "0x00000000000000000000000000000000000b0b0b";

// =============================================================================
// RPC transport
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub url: String,
    pub method: String,
    pub params: Value,
}

impl RecordedCall {
    pub fn address(&self) -> Option<&str> { self.params.get(0).and_then(Value::as_str) }
}

/// Answers `eth_getBalance` from a per-address table. URLs can be marked
/// failing or malformed; addresses can be held until released.
#[derive(Default)]
pub struct FakeTransport {
    balances: Mutex<HashMap<String, u128>>,
    failing: Mutex<HashSet<String>>,
    malformed: Mutex<HashSet<String>>,
    held: Mutex<HashSet<String>>,
    released: Notify,
    calls: Mutex<Vec<RecordedCall>>,
    called: Notify,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn set_balance(&self, address: &str, wei: u128) { self.balances.lock().unwrap().insert(address.to_string(), wei); }

    pub fn fail(&self, url: &str) { self.failing.lock().unwrap().insert(url.to_string()); }

    pub fn malform(&self, url: &str) { self.malformed.lock().unwrap().insert(url.to_string()); }

    pub fn hold(&self, address: &str) { self.held.lock().unwrap().insert(address.to_string()); }

    pub fn release(&self, address: &str) {
        self.held.lock().unwrap().remove(address);
        self.released.notify_waiters();
    }

    pub fn calls(&self) -> Vec<RecordedCall> { self.calls.lock().unwrap().clone() }

    pub async fn wait_for_calls(&self, count: usize) -> Vec<RecordedCall> {
        tokio::time::timeout(WAIT, async {
            loop {
                let notified = self.called.notified();
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for RPC calls")
    }

    pub fn resolver(self: &Arc<Self>) -> BalanceResolver {
        BalanceResolver::new(Arc::new(ChainRegistry::default()), self.clone())
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    async fn call(&self, url: &str, request: &JsonRpcRequest) -> Result<Value, RpcError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            method: request.method.clone(),
            params: request.params.clone(),
        });
        self.called.notify_waiters();

        let address = request.params.get(0).and_then(Value::as_str).unwrap_or_default().to_string();
        loop {
            let released = self.released.notified();
            if !self.held.lock().unwrap().contains(&address) {
                break;
            }
            released.await;
        }

        if self.failing.lock().unwrap().contains(url) {
            return Err(RpcError::Transport(format!("connection refused: {url}")));
        }
        if self.malformed.lock().unwrap().contains(url) {
            return Ok(json!({ "unexpected": true }));
        }
        let wei = self.balances.lock().unwrap().get(&address).copied().unwrap_or(0);
        Ok(json!(format!("{wei:#x}")))
    }
}

// =============================================================================
// EIP-1193 provider
// =============================================================================

pub struct FakeProvider {
    accounts: Mutex<Vec<String>>,
    chain_hex: Mutex<Option<String>>,
    reject: Mutex<Option<ProviderRpcError>>,
    switch_error: Mutex<Option<ProviderRpcError>>,
    handler: Mutex<Option<ProviderEventHandler>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(accounts: &[&str], chain_hex: &str) -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(accounts.iter().map(|a| a.to_string()).collect()),
            chain_hex: Mutex::new(Some(chain_hex.to_string())),
            reject: Mutex::new(None),
            switch_error: Mutex::new(None),
            handler: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn reject_next(&self, error: ProviderRpcError) { *self.reject.lock().unwrap() = Some(error); }

    pub fn fail_switch(&self, error: ProviderRpcError) { *self.switch_error.lock().unwrap() = Some(error); }

    pub fn emit(&self, event: ProviderEvent) {
        let handler = self.handler.lock().unwrap().clone().expect("adapter installed a handler");
        handler(event);
    }

    pub fn count(&self, method: &str) -> usize { self.calls.lock().unwrap().iter().filter(|m| *m == method).count() }
}

#[async_trait]
impl Eip1193Provider for FakeProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.calls.lock().unwrap().push(method.to_string());
        match method {
            "eth_requestAccounts" => match self.reject.lock().unwrap().take() {
                Some(error) => Err(error),
                None => Ok(json!(self.accounts.lock().unwrap().clone())),
            },
            "eth_chainId" => match self.chain_hex.lock().unwrap().clone() {
                Some(hex) => Ok(json!(hex)),
                None => Err(ProviderRpcError::new(ProviderRpcError::UNSUPPORTED_METHOD, "eth_chainId")),
            },
            "wallet_switchEthereumChain" => match self.switch_error.lock().unwrap().take() {
                Some(error) => Err(error),
                None => {
                    let hex = params[0]["chainId"].as_str().map(str::to_string);
                    *self.chain_hex.lock().unwrap() = hex;
                    Ok(Value::Null)
                }
            },
            "wallet_revokePermissions" => Ok(Value::Null),
            other => Err(ProviderRpcError::new(ProviderRpcError::UNSUPPORTED_METHOD, other)),
        }
    }

    fn set_event_handler(&self, handler: ProviderEventHandler) { *self.handler.lock().unwrap() = Some(handler); }
}

// =============================================================================
// Relay client
// =============================================================================

#[derive(Default)]
pub struct FakeRelay {
    pub session: Mutex<Option<RelaySession>>,
    pub restored: Mutex<Option<RelaySession>>,
    pub pairings: AtomicUsize,
    pub disconnects: Mutex<Vec<String>>,
    handler: Mutex<Option<RelayEventHandler>>,
}

impl FakeRelay {
    pub fn approving(topic: &str, caip10: &[String]) -> Arc<Self> {
        let relay = Self::default();
        *relay.session.lock().unwrap() = Some(RelaySession {
            topic: topic.to_string(),
            accounts: caip10.to_vec(),
            peer_name: Some("Fake Mobile Wallet".into()),
        });
        Arc::new(relay)
    }

    pub fn restoring(topic: &str, caip10: &[String]) -> Arc<Self> {
        let relay = Self::default();
        *relay.restored.lock().unwrap() = Some(RelaySession {
            topic: topic.to_string(),
            accounts: caip10.to_vec(),
            peer_name: None,
        });
        Arc::new(relay)
    }

    pub fn emit(&self, event: RelayEvent) {
        let handler = self.handler.lock().unwrap().clone().expect("adapter installed a handler");
        handler(event);
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn pair(&self, _proposal: PairingProposal) -> Result<RelaySession, RelayError> {
        self.pairings.fetch_add(1, Ordering::SeqCst);
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or(RelayError::Rejected { code: 5000, message: "User rejected.".into() })
    }

    async fn request(&self, _topic: &str, _chain_id: u64, _method: &str, _params: Value) -> Result<Value, RelayError> {
        Ok(Value::Null)
    }

    async fn disconnect(&self, topic: &str) -> Result<(), RelayError> {
        self.disconnects.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    fn restored_session(&self) -> Option<RelaySession> { self.restored.lock().unwrap().clone() }

    fn set_event_handler(&self, handler: RelayEventHandler) { *self.handler.lock().unwrap() = Some(handler); }
}

// =============================================================================
// Aggregator modal
// =============================================================================

/// Picks a fixed connector. When gated, `select` waits for `open_gate`.
pub struct FakeModal {
    pub inits: AtomicUsize,
    pub selects: AtomicUsize,
    pick: Result<usize, ModalError>,
    gate: Option<Semaphore>,
}

impl FakeModal {
    pub fn picking(index: usize) -> Arc<Self> {
        Arc::new(Self { inits: AtomicUsize::new(0), selects: AtomicUsize::new(0), pick: Ok(index), gate: None })
    }

    pub fn gated(index: usize) -> Arc<Self> {
        Arc::new(Self { inits: AtomicUsize::new(0), selects: AtomicUsize::new(0), pick: Ok(index), gate: Some(Semaphore::new(0)) })
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl ConnectorModal for FakeModal {
    async fn init(&self, _project_id: &str, _chains: &[u64]) -> Result<(), ModalError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn select(&self, _options: &[ConnectorOption]) -> Result<usize, ModalError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.pick.clone()
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn caip10(chain_id: u64, address: &str) -> String { format!("eip155:{chain_id}:{address}") }

/// Poll `condition` until it holds.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held")
}

/// Wait until the published Session satisfies `predicate`.
pub async fn wait_for(controller: &SessionController, predicate: impl Fn(&Session) -> bool) -> Session {
    let mut rx = controller.watch();
    tokio::time::timeout(WAIT, async {
        loop {
            let session = rx.borrow_and_update().clone();
            if predicate(&session) {
                return session;
            }
            rx.changed().await.expect("controller stopped");
        }
    })
    .await
    .expect("timed out waiting for session state")
}
