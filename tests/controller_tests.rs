//! Controller tests against in-memory wallet backends.
//!
//! Run with: cargo test --test controller_tests

mod support;

use baseconnect::adapter::{ProviderEvent, ProviderRpcError, RelayEvent};
use baseconnect::{
    AdapterKind, AggregatorAdapter, ChainRegistry, ErrorKind, InitGuard, InjectedAdapter, RelayAdapter, Session, SessionController,
    SessionStatus, WalletConfig, WalletError, BASE_MAINNET, BASE_SEPOLIA,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::*;

const APPROVAL: Duration = Duration::from_secs(2);
const ETH: u128 = 1_000_000_000_000_000_000;

fn registry() -> Arc<ChainRegistry> { Arc::new(ChainRegistry::default()) }

fn config() -> WalletConfig { WalletConfig::new("baseconnect-tests").with_project_id(PROJECT_ID).with_approval_timeout(APPROVAL) }

fn injected(provider: &Arc<FakeProvider>) -> Arc<InjectedAdapter> {
    Arc::new(InjectedAdapter::new(Some(provider.clone()), registry(), APPROVAL))
}

fn direct_controller(transport: &Arc<FakeTransport>, provider: &Arc<FakeProvider>) -> SessionController {
    SessionController::builder(transport.resolver()).with_adapter(injected(provider)).spawn()
}

fn aggregator_controller(transport: &Arc<FakeTransport>, modal: &Arc<FakeModal>, provider: &Arc<FakeProvider>) -> SessionController {
    let aggregator = AggregatorAdapter::new(modal.clone(), config(), registry()).with_connector(
        "injected",
        "Browser Wallet",
        injected(provider),
    );
    SessionController::builder(transport.resolver()).with_adapter(Arc::new(aggregator)).spawn()
}

fn relay_controller(transport: &Arc<FakeTransport>, relay: &Arc<FakeRelay>) -> SessionController {
    let adapter = RelayAdapter::new(relay.clone(), config(), registry());
    SessionController::builder(transport.resolver()).with_adapter(Arc::new(adapter)).spawn()
}

// =============================================================================
// Connect
// =============================================================================

/// Test: direct connect without an installed extension surfaces NotAvailable
#[tokio::test]
async fn direct_connect_without_extension_reports_not_available() {
    let transport = FakeTransport::new();
    let adapter = InjectedAdapter::new(None, registry(), APPROVAL);
    let controller = SessionController::builder(transport.resolver()).with_adapter(Arc::new(adapter)).spawn();

    let err = controller.connect_direct().await.expect_err("no provider installed");
    assert!(matches!(err, WalletError::NotAvailable(_)), "got {err:?}");

    let session = controller.state();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.last_error.as_ref().expect("error recorded").kind, ErrorKind::NotAvailable);
    assert!(session.address.is_none());
    assert!(transport.calls().is_empty());
}

/// Test: aggregator connect lowercases the address and fetches the balance
#[tokio::test]
async fn aggregator_connect_normalizes_address_and_fetches_balance() {
    let transport = FakeTransport::new();
    transport.set_balance(ALICE, 3 * ETH / 2);
    let provider = FakeProvider::new(&[ALICE_CHECKSUM], "0x2105");
    let modal = FakeModal::picking(0);
    let controller = aggregator_controller(&transport, &modal, &provider);

    let session = controller.connect_via_aggregator().await.expect("connect succeeds");
    assert_eq!(session.status, SessionStatus::Connected);
    assert_eq!(session.address.as_deref(), Some(ALICE));
    assert_eq!(session.chain_id, Some(BASE_MAINNET));
    assert_eq!(session.active_adapter, Some(AdapterKind::Aggregator));

    let calls = transport.wait_for_calls(1).await;
    assert_eq!(calls[0].method, "eth_getBalance");
    assert_eq!(calls[0].url, BASE_PRIMARY_RPC);
    assert_eq!(calls[0].address(), Some(ALICE));

    let session = wait_for(&controller, |s| s.balance.is_some()).await;
    let balance = session.balance.clone().expect("balance set");
    assert_eq!(balance.amount, 3 * ETH / 2);
    assert_eq!(balance.display(), "1.5000 ETH");
    assert!(balance.is_reliable());
}

/// Test: concurrent aggregator connects share one init and one modal
#[tokio::test]
async fn concurrent_aggregator_connects_share_one_attempt() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let modal = FakeModal::gated(0);
    let controller = aggregator_controller(&transport, &modal, &provider);

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.connect_via_aggregator().await }
    });
    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.connect_via_aggregator().await }
    });

    eventually(|| modal.selects.load(Ordering::SeqCst) == 1).await;
    modal.open_gate();

    let first = first.await.expect("task").expect("first connect");
    let second = second.await.expect("task").expect("second connect");
    assert_eq!(first.address, second.address);
    assert_eq!(modal.inits.load(Ordering::SeqCst), 1);
    assert_eq!(modal.selects.load(Ordering::SeqCst), 1);
    assert_eq!(provider.count("eth_requestAccounts"), 1);
}

/// Test: a remounted aggregator sharing the init guard still follows wallet events
#[tokio::test]
async fn remounted_aggregator_follows_wallet_events() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let modal = FakeModal::picking(0);
    let guard = InitGuard::new();
    let connector = injected(&provider);
    let mount = |guard: &InitGuard| {
        let aggregator = AggregatorAdapter::new(modal.clone(), config(), registry())
            .with_guard(guard.clone())
            .with_connector("injected", "Browser Wallet", connector.clone());
        SessionController::builder(transport.resolver()).with_adapter(Arc::new(aggregator)).spawn()
    };

    let first = mount(&guard);
    eventually(|| guard.is_initialized()).await;
    first.shutdown();

    let second = mount(&guard);
    let session = second.connect_via_aggregator().await.expect("connect succeeds");
    assert_eq!(session.address.as_deref(), Some(ALICE));

    provider.emit(ProviderEvent::Disconnect(ProviderRpcError::new(4900, "wallet disconnected")));
    let session = wait_for(&second, |s| s.status == SessionStatus::Disconnected).await;
    assert!(session.active_adapter.is_none());
    assert_eq!(modal.inits.load(Ordering::SeqCst), 1);
    assert_eq!(guard.runs(), 1);
}

/// Test: a different backend is refused while a connect is pending
#[tokio::test]
async fn other_backend_refused_while_connecting() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let modal = FakeModal::gated(0);
    let aggregator = AggregatorAdapter::new(modal.clone(), config(), registry()).with_connector(
        "injected",
        "Browser Wallet",
        injected(&provider),
    );
    let controller = SessionController::builder(transport.resolver())
        .with_adapter(Arc::new(aggregator))
        .with_adapter(injected(&provider))
        .spawn();

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.connect_via_aggregator().await }
    });
    eventually(|| modal.selects.load(Ordering::SeqCst) == 1).await;

    let err = controller.connect_direct().await.expect_err("refused");
    assert_eq!(err, WalletError::ConnectInProgress(AdapterKind::Aggregator));
    assert_eq!(controller.state().status, SessionStatus::Connecting);
    assert!(controller.state().last_error.is_none());

    modal.open_gate();
    pending.await.expect("task").expect("aggregator connect");
}

/// Test: user rejection lands in lastError with the user_rejected kind
#[tokio::test]
async fn rejected_connect_records_error() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    provider.reject_next(ProviderRpcError::new(ProviderRpcError::USER_REJECTED, "User rejected the request."));
    let controller = direct_controller(&transport, &provider);

    let err = controller.connect_direct().await.expect_err("rejected");
    assert_eq!(err, WalletError::UserRejected);
    let session = controller.state();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.last_error.as_ref().expect("error recorded").kind, ErrorKind::UserRejected);

    // A retry clears the error.
    let session = controller.connect_direct().await.expect("second attempt");
    assert!(session.is_connected());
    assert!(session.last_error.is_none());
}

/// Test: relay connect without a project id surfaces a configuration error
#[tokio::test]
async fn relay_connect_without_project_id_fails() {
    let transport = FakeTransport::new();
    let relay = FakeRelay::approving("topic-1", &[caip10(BASE_MAINNET, ALICE)]);
    let config = WalletConfig::new("baseconnect-tests");
    let adapter = RelayAdapter::new(relay.clone(), config, registry());
    let controller = SessionController::builder(transport.resolver()).with_adapter(Arc::new(adapter)).spawn();

    let err = controller.connect_via_relay().await.expect_err("invalid project id");
    assert!(matches!(err, WalletError::Configuration(_)), "got {err:?}");
    assert_eq!(relay.pairings.load(Ordering::SeqCst), 0);
    assert_eq!(controller.state().last_error.clone().expect("error").kind, ErrorKind::Configuration);
}

/// Test: a backend restored before start-up is adopted without a new pairing
#[tokio::test]
async fn restored_relay_session_is_adopted() {
    let transport = FakeTransport::new();
    let relay = FakeRelay::restoring("topic-restored", &[caip10(BASE_SEPOLIA, ALICE)]);
    let controller = relay_controller(&transport, &relay);

    let session = wait_for(&controller, |s| s.is_connected()).await;
    assert_eq!(session.address.as_deref(), Some(ALICE));
    assert_eq!(session.chain_id, Some(BASE_SEPOLIA));
    assert_eq!(session.active_adapter, Some(AdapterKind::Relay));
    assert_eq!(relay.pairings.load(Ordering::SeqCst), 0);

    let calls = transport.wait_for_calls(1).await;
    assert_eq!(calls[0].url, SEPOLIA_PRIMARY_RPC);

    // Connecting again returns the live session.
    let again = controller.connect_via_relay().await.expect("current session");
    assert_eq!(again.address.as_deref(), Some(ALICE));
    assert_eq!(relay.pairings.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Disconnect and wallet-side events
// =============================================================================

/// Test: relay session deletion by the peer disconnects the Session
#[tokio::test]
async fn relay_session_deleted_disconnects() {
    let transport = FakeTransport::new();
    let relay = FakeRelay::approving("topic-1", &[caip10(BASE_MAINNET, ALICE)]);
    let controller = relay_controller(&transport, &relay);

    let session = controller.connect_via_relay().await.expect("paired");
    assert!(session.is_connected());
    assert_eq!(relay.pairings.load(Ordering::SeqCst), 1);

    // Events for other topics are ignored.
    relay.emit(RelayEvent::SessionDeleted { topic: "someone-else".into() });
    relay.emit(RelayEvent::SessionDeleted { topic: "topic-1".into() });

    let session = wait_for(&controller, |s| s.status == SessionStatus::Disconnected).await;
    assert!(session.address.is_none());
    assert!(session.chain_id.is_none());
    assert!(session.balance.is_none());
    assert!(session.active_adapter.is_none());
}

/// Test: after the relay wallet drops every account, connecting pairs again
#[tokio::test]
async fn relay_reconnects_after_accounts_removed() {
    let transport = FakeTransport::new();
    let relay = FakeRelay::approving("topic-1", &[caip10(BASE_MAINNET, ALICE)]);
    let controller = relay_controller(&transport, &relay);
    controller.connect_via_relay().await.expect("paired");

    relay.emit(RelayEvent::AccountsChanged { topic: "topic-1".into(), accounts: vec![] });
    wait_for(&controller, |s| s.status == SessionStatus::Disconnected).await;

    let session = controller.connect_via_relay().await.expect("paired again");
    assert!(session.is_connected());
    assert_eq!(session.address.as_deref(), Some(ALICE));
    assert_eq!(relay.pairings.load(Ordering::SeqCst), 2);
}

/// Test: disconnect twice tears the backend down exactly once
#[tokio::test]
async fn disconnect_is_idempotent() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");

    let first = controller.disconnect().await;
    let second = controller.disconnect().await;
    assert_eq!(first, second);
    assert_eq!(first.status, SessionStatus::Disconnected);

    eventually(|| provider.count("wallet_revokePermissions") == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.count("wallet_revokePermissions"), 1);
}

/// Test: disconnect cancels a pending connect and a late approval is torn down
#[tokio::test]
async fn disconnect_cancels_pending_connect() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let modal = FakeModal::gated(0);
    let controller = aggregator_controller(&transport, &modal, &provider);

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.connect_via_aggregator().await }
    });
    eventually(|| modal.selects.load(Ordering::SeqCst) == 1).await;

    let session = controller.disconnect().await;
    assert_eq!(session.status, SessionStatus::Disconnected);
    assert_eq!(pending.await.expect("task"), Err(WalletError::Cancelled));
    // Let the cancelled attempt's teardown run before the modal returns.
    tokio::time::sleep(Duration::from_millis(20)).await;

    modal.open_gate();
    eventually(|| provider.count("wallet_revokePermissions") == 1).await;
    assert_eq!(controller.state().status, SessionStatus::Disconnected);
    assert!(controller.state().address.is_none());
}

/// Test: empty accountsChanged from the wallet ends the session
#[tokio::test]
async fn empty_accounts_event_disconnects() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");

    provider.emit(ProviderEvent::AccountsChanged(vec![]));
    let session = wait_for(&controller, |s| s.status == SessionStatus::Disconnected).await;
    assert!(session.address.is_none());
}

/// Test: a balance for a replaced address is discarded
#[tokio::test]
async fn stale_balance_is_discarded_after_account_change() {
    let transport = FakeTransport::new();
    transport.set_balance(ALICE, 7 * ETH);
    transport.set_balance(BOB, 2 * ETH);
    transport.hold(ALICE);
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);

    controller.connect_direct().await.expect("connect");
    transport.wait_for_calls(1).await;

    provider.emit(ProviderEvent::AccountsChanged(vec![BOB.to_string()]));
    let session = wait_for(&controller, |s| s.balance.is_some()).await;
    assert_eq!(session.address.as_deref(), Some(BOB));
    assert_eq!(session.balance.as_ref().expect("balance").amount, 2 * ETH);

    transport.release(ALICE);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = controller.state();
    assert_eq!(session.address.as_deref(), Some(BOB));
    assert_eq!(session.balance.as_ref().expect("balance").amount, 2 * ETH);
}

/// Test: all endpoints failing yields an unreliable zero balance
#[tokio::test]
async fn failing_endpoints_mark_balance_unreliable() {
    let transport = FakeTransport::new();
    transport.fail(BASE_PRIMARY_RPC);
    transport.fail(BASE_SECONDARY_RPC);
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);

    controller.connect_direct().await.expect("connect");
    let session = wait_for(&controller, |s| s.balance.is_some()).await;
    let balance = session.balance.clone().expect("balance");
    assert_eq!(balance.amount, 0);
    assert!(!balance.is_reliable());
    assert!(session.is_connected());
    assert!(session.last_error.is_none());
}

// =============================================================================
// Network switching
// =============================================================================

/// Test: switching to Base Sepolia updates the chain and re-fetches the balance
#[tokio::test]
async fn switch_chain_updates_network_and_balance() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");
    wait_for(&controller, |s| s.balance.is_some()).await;

    let session = controller.switch_chain(BASE_SEPOLIA).await.expect("switch");
    assert_eq!(session.chain_id, Some(BASE_SEPOLIA));
    assert_eq!(session.address.as_deref(), Some(ALICE));

    let calls = transport.wait_for_calls(2).await;
    assert_eq!(calls[1].url, SEPOLIA_PRIMARY_RPC);
    assert_eq!(calls[1].address(), Some(ALICE));
    assert_eq!(provider.count("wallet_switchEthereumChain"), 1);

    let explorer = controller.explorer_url().expect("connected");
    assert_eq!(explorer, format!("https://sepolia.basescan.org/address/{ALICE}"));
}

/// Test: a rejected switch keeps the chain and records the error
#[tokio::test]
async fn rejected_switch_keeps_chain() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    provider.fail_switch(ProviderRpcError::new(ProviderRpcError::USER_REJECTED, "User rejected the request."));
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");

    let err = controller.switch_chain(BASE_SEPOLIA).await.expect_err("rejected");
    assert_eq!(err, WalletError::UserRejected);

    let session = controller.state();
    assert_eq!(session.status, SessionStatus::Connected);
    assert_eq!(session.chain_id, Some(BASE_MAINNET));
    assert_eq!(session.last_error.as_ref().expect("error recorded").kind, ErrorKind::UserRejected);
}

/// Test: switching to a chain outside the registry is refused without side effects
#[tokio::test]
async fn switch_to_unknown_chain_refused() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);

    assert_eq!(controller.switch_chain(BASE_SEPOLIA).await, Err(WalletError::NotConnected));

    controller.connect_direct().await.expect("connect");
    let before = controller.state();
    assert_eq!(controller.switch_chain(1).await, Err(WalletError::UnsupportedChain(1)));
    assert_eq!(controller.state(), before);
    assert_eq!(provider.count("wallet_switchEthereumChain"), 0);
}

/// Test: a wallet moving to an unsupported network is flagged, not adopted
#[tokio::test]
async fn wallet_on_unsupported_network_is_flagged() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");

    provider.emit(ProviderEvent::ChainChanged("0x1".into()));
    let session = wait_for(&controller, |s| s.unsupported_chain.is_some()).await;
    assert_eq!(session.unsupported_chain, Some(1));
    assert_eq!(session.chain_id, Some(BASE_MAINNET));
    assert!(session.balance.is_none());
    assert_eq!(session.last_error.as_ref().expect("error").kind, ErrorKind::UnsupportedChain);
    assert_eq!(controller.refresh_balance().await, Err(WalletError::UnsupportedChain(1)));

    // Switching back to a registry chain clears the flag.
    let session = controller.switch_chain(BASE_MAINNET).await.expect("switch back");
    assert!(session.unsupported_chain.is_none());
    assert!(session.last_error.is_none());
}

// =============================================================================
// Observation and lifecycle
// =============================================================================

/// Test: subscribers see every published state until they unsubscribe
#[tokio::test]
async fn subscribers_follow_transitions() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);

    let seen: Arc<Mutex<Vec<SessionStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let subscription = controller.subscribe({
        let seen = seen.clone();
        move |session: &Session| seen.lock().unwrap().push(session.status)
    });

    controller.connect_direct().await.expect("connect");
    {
        let seen = seen.lock().unwrap();
        assert_eq!(&seen[..2], &[SessionStatus::Connecting, SessionStatus::Connected]);
    }

    subscription.unsubscribe();
    let count = seen.lock().unwrap().len();
    controller.disconnect().await;
    assert_eq!(seen.lock().unwrap().len(), count);
    assert_eq!(controller.state().status, SessionStatus::Disconnected);
}

/// Test: refresh marks the balance stale and resolves it again
#[tokio::test]
async fn refresh_balance_requeries() {
    let transport = FakeTransport::new();
    transport.set_balance(ALICE, ETH);
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);

    assert_eq!(controller.refresh_balance().await, Err(WalletError::NotConnected));

    controller.connect_direct().await.expect("connect");
    wait_for(&controller, |s| s.balance.is_some()).await;

    transport.set_balance(ALICE, 4 * ETH);
    controller.refresh_balance().await.expect("refresh");
    let session = wait_for(&controller, |s| s.balance.as_ref().is_some_and(|b| b.amount == 4 * ETH)).await;
    assert_eq!(session.balance.as_ref().expect("balance").display(), "4.0000 ETH");
    assert_eq!(transport.calls().len(), 2);
}

/// Test: after shutdown commands are cancelled and wallet events are ignored
#[tokio::test]
async fn shutdown_stops_controller() {
    let transport = FakeTransport::new();
    let provider = FakeProvider::new(&[ALICE], "0x2105");
    let controller = direct_controller(&transport, &provider);
    controller.connect_direct().await.expect("connect");

    controller.shutdown();
    assert!(controller.is_shut_down());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(controller.connect_direct().await, Err(WalletError::Cancelled));
    provider.emit(ProviderEvent::AccountsChanged(vec![]));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(controller.state().is_connected());
}
