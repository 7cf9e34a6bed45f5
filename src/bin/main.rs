//! BaseConnect CLI - chain registry and balance lookups
//!
//! Wallet connections need a browser or a relay client, so the CLI covers the
//! parts that work headless:
//!   baseconnect chains                      → supported networks
//!   baseconnect balance <address>           → native balance with RPC fallback
//!   baseconnect explorer <address>          → block explorer link
//!   baseconnect watch <address>             → re-query until Ctrl+C
//!   baseconnect config                      → effective configuration
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context};
use baseconnect::adapter::normalize_address;
use baseconnect::chain::parse_chain_id;
use baseconnect::logging::init_logging;
use baseconnect::session::Balance;
use baseconnect::{install_signal_handlers, BalanceResolver, ChainRegistry, Shutdown, WalletConfig};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_WATCH_INTERVAL_SECS: u64 = 15;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("baseconnect {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = WalletConfig::from_env(opts.app.clone().unwrap_or_else(|| "baseconnect".into()));
    let result = match opts.command.as_deref() {
        Some("chains") => cmd_chains(&config),
        Some("balance") => cmd_balance(&opts, &config),
        Some("explorer") => cmd_explorer(&opts, &config),
        Some("watch") => cmd_watch(&opts, &config),
        Some("config") => cmd_config(&config),
        Some(cmd) => Err(anyhow!("Unknown command: {cmd}")),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({ "error": format!("{e:#}") }), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    address: Option<String>,
    app: Option<String>,
    chain: Option<String>,
    interval: Option<u64>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--app" | "-a" => {
                    if i + 1 < args.len() {
                        opts.app = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--chain" | "-c" => {
                    if i + 1 < args.len() {
                        opts.chain = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--interval" | "-i" => {
                    if i + 1 < args.len() {
                        opts.interval = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.address = Some(positional.remove(0));
        }
        if opts.app.is_none() {
            opts.app = env::var("BASECONNECT_APP").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn address(&self) -> anyhow::Result<String> {
        let raw = self.address.as_deref().context("address required")?;
        normalize_address(raw).ok_or_else(|| anyhow!("'{raw}' is not a 0x-prefixed 20-byte address"))
    }

    fn chain_id(&self, registry: &ChainRegistry) -> anyhow::Result<u64> {
        let Some(raw) = self.chain.as_deref() else { return Ok(registry.primary().id) };
        let id = parse_chain_id(raw).ok_or_else(|| anyhow!("unparsable chain id '{raw}'"))?;
        if !registry.is_supported(id) {
            bail!("unsupported chain {id}; run `baseconnect chains`");
        }
        Ok(id)
    }
}

fn print_usage() {
    println!(
        r#"baseconnect - Base network wallet tooling

USAGE:
    baseconnect <command> [address] [options]

COMMANDS:
    chains                  List supported networks
    balance <address>       Native balance (falls back across RPC endpoints)
    explorer <address>      Block explorer URL for an address
    watch <address>         Re-query the balance until Ctrl+C
    config                  Show effective configuration

OPTIONS:
    --chain, -c <id>        Chain id (decimal, 0x hex or eip155:<id>; default: Base)
    --interval, -i <secs>   Watch interval (default: {DEFAULT_WATCH_INTERVAL_SECS})
    --app, -a <name>        Application name (env: BASECONNECT_APP)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

ENVIRONMENT:
    BASECONNECT_PROJECT_ID              Relay project ID (32 hex chars)
    BASECONNECT_BASE_RPC_URL            Override Base mainnet RPC
    BASECONNECT_BASE_SEPOLIA_RPC_URL    Override Base Sepolia RPC
    BASECONNECT_APPROVAL_TIMEOUT_SECS   Wallet approval timeout (default: 120)
    BASECONNECT_RPC_TIMEOUT_SECS        Per-request RPC timeout (default: 10)
    BASECONNECT_LOG_JSON=1              JSON log lines on stderr
    RUST_LOG                            Log filter (default: info)

EXAMPLES:
    baseconnect balance 0x4200000000000000000000000000000000000006
    baseconnect balance 0x4200000000000000000000000000000000000006 --chain 84532
    baseconnect explorer 0x4200000000000000000000000000000000000006 --json
"#
    );
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create runtime")
}

fn resolver(config: &WalletConfig) -> anyhow::Result<(Arc<ChainRegistry>, BalanceResolver)> {
    let registry = Arc::new(ChainRegistry::from_config(config));
    let resolver = BalanceResolver::http(registry.clone(), config.rpc_timeout).context("Failed to build RPC transport")?;
    Ok((registry, resolver))
}

fn balance_json(result: &baseconnect::BalanceResult, registry: &ChainRegistry) -> Value {
    let balance = Balance::from_result(result, chrono::Utc::now());
    json!({
        "address": result.address,
        "chain_id": result.chain_id,
        "network": registry.display_name(result.chain_id),
        "wei": result.amount.to_string(),
        "formatted": result.formatted,
        "display": balance.display(),
        "reliable": result.reliable,
        "endpoint": result.endpoint,
        "fetched_at": balance.fetched_at.to_rfc3339(),
    })
}

fn cmd_chains(config: &WalletConfig) -> anyhow::Result<Value> {
    let registry = ChainRegistry::from_config(config);
    let primary = registry.primary().id;
    let chains: Vec<Value> = registry
        .iter()
        .map(|chain| {
            json!({
                "id": chain.id,
                "hex": chain.hex_id(),
                "name": chain.name,
                "symbol": chain.currency.symbol,
                "rpc_urls": chain.rpc_urls,
                "explorer": chain.explorer_url,
                "testnet": chain.testnet,
                "primary": chain.id == primary,
            })
        })
        .collect();
    Ok(json!({ "chains": chains }))
}

fn cmd_balance(opts: &ParsedArgs, config: &WalletConfig) -> anyhow::Result<Value> {
    let address = opts.address()?;
    let (registry, resolver) = resolver(config)?;
    let chain_id = opts.chain_id(&registry)?;

    let rt = runtime()?;
    let result = rt.block_on(resolver.resolve(&address, chain_id));
    debug!(reliable = result.reliable, "balance lookup finished");
    Ok(balance_json(&result, &registry))
}

fn cmd_explorer(opts: &ParsedArgs, config: &WalletConfig) -> anyhow::Result<Value> {
    let address = opts.address()?;
    let registry = ChainRegistry::from_config(config);
    let chain_id = opts.chain_id(&registry)?;
    let chain = registry.describe(chain_id)?;
    Ok(json!({ "address": address, "chain_id": chain_id, "url": chain.address_url(&address) }))
}

fn cmd_watch(opts: &ParsedArgs, config: &WalletConfig) -> anyhow::Result<Value> {
    let address = opts.address()?;
    let (registry, resolver) = resolver(config)?;
    let chain_id = opts.chain_id(&registry)?;
    let interval = Duration::from_secs(opts.interval.unwrap_or(DEFAULT_WATCH_INTERVAL_SECS).max(1));
    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());

    let rt = runtime()?;
    let polls = rt.block_on(async {
        let shutdown = Shutdown::new();
        install_signal_handlers(&shutdown);
        info!(%address, chain_id, ?interval, "watching balance");

        let mut polls = 0u64;
        loop {
            let result = resolver.resolve(&address, chain_id).await;
            println!("{}", render(&balance_json(&result, &registry), pretty));
            polls += 1;

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        polls
    });
    Ok(json!({ "stopped": true, "polls": polls }))
}

fn cmd_config(config: &WalletConfig) -> anyhow::Result<Value> {
    let project_id = match config.project_id() {
        Ok(id) => json!({ "valid": true, "value": format!("{}...", &id[..6]) }),
        Err(e) => json!({ "valid": false, "error": e.to_string() }),
    };
    let overrides: serde_json::Map<String, Value> = config
        .rpc_overrides
        .iter()
        .map(|(chain, url)| (chain.to_string(), json!(url)))
        .collect();
    Ok(json!({
        "app": {
            "name": config.metadata.name,
            "description": config.metadata.description,
            "url": config.metadata.url,
        },
        "project_id": project_id,
        "rpc_overrides": overrides,
        "approval_timeout_secs": config.approval_timeout.as_secs(),
        "rpc_timeout_secs": config.rpc_timeout.as_secs(),
    }))
}
