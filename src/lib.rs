//! BaseConnect: wallet session controller for the Base network.
//!
//! # Architecture
//!
//! ```text
//! SessionController (entry point)
//!   │
//!   ├── SessionMachine (pure transitions, emits effects)
//!   │
//!   ├── ProviderAdapter backends
//!   │     ├── InjectedAdapter   → EIP-1193 browser extension
//!   │     ├── RelayAdapter      → QR / deep-link remote wallet
//!   │     └── AggregatorAdapter → modal over many connectors (InitGuard)
//!   │
//!   ├── BalanceResolver (JSON-RPC eth_getBalance, endpoint fallback)
//!   │
//!   └── ChainRegistry (Base mainnet + Base Sepolia)
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | connect | `connect_via_aggregator()` / `connect_direct()` / `connect_via_relay()` | Start a session through one backend |
//! | disconnect | `disconnect()` | Tear down; idempotent |
//! | switch | `switch_chain(id)` | Move the wallet to another registry chain |
//! | observe | `state()` / `subscribe(f)` / `watch()` | Current snapshot and change notifications |
//!
//! # Features
//!
//! - `native` - HTTP transport (reqwest), logging setup, signal handling, CLI
//!
//! # Usage
//!
//! ```ignore
//! use baseconnect::{BalanceResolver, ChainRegistry, InjectedAdapter, SessionController, WalletConfig};
//!
//! let config = WalletConfig::from_env("myapp");
//! let registry = Arc::new(ChainRegistry::from_config(&config));
//! let resolver = BalanceResolver::http(registry.clone(), config.rpc_timeout)?;
//!
//! let controller = SessionController::builder(resolver)
//!     .with_adapter(Arc::new(InjectedAdapter::new(provider, registry, config.approval_timeout)))
//!     .spawn();
//!
//! let session = controller.connect_direct().await?;
//! println!("{} on {}", session.address.unwrap(), controller.registry().display_name(session.chain_id.unwrap()));
//! ```

// =============================================================================
// Shared modules
// =============================================================================
pub mod adapter;
pub mod balance;
pub mod chain;
pub mod config;
pub mod controller;
pub mod error;
pub mod runtime;
pub mod session;

// =============================================================================
// Native-only modules (subscriber setup)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;

// =============================================================================
// Re-exports
// =============================================================================
pub use adapter::{
    AccountInfo, AdapterKind, AggregatorAdapter, ConnectorModal, Eip1193Provider, InitGuard, InjectedAdapter,
    ProviderAdapter, RelayAdapter, RelayClient,
};
pub use balance::{BalanceResolver, BalanceResult, RpcTransport};
pub use chain::{ChainDescriptor, ChainRegistry, BASE_MAINNET, BASE_SEPOLIA};
pub use config::{AppMetadata, WalletConfig};
pub use controller::{ControllerBuilder, SessionController, Subscription};
pub use error::{ErrorKind, WalletError, WalletResult};
pub use runtime::Shutdown;
pub use session::{Balance, BalanceFreshness, LastError, Session, SessionStatus};

#[cfg(feature = "native")]
pub use balance::HttpTransport;
#[cfg(feature = "native")]
pub use runtime::install_signal_handlers;
