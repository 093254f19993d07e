// # mtsyncd - address list sync daemon
//
// Thin integration layer: reads the environment, builds the collaborators
// and hands them to `mtsync_core::SyncEngine`. No reconciliation logic lives
// here.
//
// ## Configuration
//
// ### Router
// - `ROUTER_IP`: RouterOS address (default `192.168.88.1`)
// - `ROUTER_PORT`: API port (default `8728`)
// - `USERNAME`: login user (default `admin`)
// - `PASSWORD`: login password (required)
// - `ROUTER_TIMEOUT_SECS`: per-call timeout (default `10`)
//
// ### Cloudflare ranges
// - `UPDATE_CLOUDFLARE`: `true` to manage `cloudflarev4`/`cloudflarev6` (default `true`)
// - `CLOUDFLARE_API_URL`: ranges endpoint
// - `HTTP_TIMEOUT_SECS`: request timeout (default `10`)
// - `SKIP_EMPTY_RANGES`: `true` to leave a bucket alone on an empty response
//
// ### Interface
// - `IFNAME`: interface whose global IPv6 address is tracked (unset: disabled)
// - `IF_LIST_NAME`: IPv6 address list for it (default `proxyv6`)
// - `V6DNS_LIST`: comma-separated hostnames kept as AAAA records
//
// ### Engine
// - `CHECK_INTERVAL`: seconds between cycles (default `3600`)
// - `LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ## Example
//
// ```bash
// export ROUTER_IP=192.168.88.1
// export PASSWORD=secret
// export IFNAME=eth0
// export V6DNS_LIST=home.example.com,nas.example.com
//
// mtsyncd
// ```

use anyhow::{Context, Result};
use mtsync_core::config::{
    CloudflareConfig, EngineConfig, InterfaceConfig, RouterConfig, SyncConfig,
    parse_hostname_list,
};
use mtsync_core::{EngineEvent, InterfaceName, MemorySnapshotStore, SyncEngine};
use mtsync_source_cloudflare::CloudflareRangeSource;
use mtsync_source_iproute::IprouteSource;
use mtsync_store_routeros::RouterOsStore;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Lower bound on how long the engine gets to stop after a shutdown signal
const MIN_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Router calls a single in-flight cycle is allowed to still make
const SHUTDOWN_STORE_CALLS: u32 = 32;

/// How long a cycle already in flight may take to finish
///
/// Every collaborator call carries its own timeout, so this is the sum of
/// both source lookups plus a budget of router calls.
fn shutdown_grace(config: &SyncConfig) -> Duration {
    let sources = config.cloudflare.timeout() + mtsync_source_iproute::COMMAND_TIMEOUT;
    let store = config.router.timeout() * SHUTDOWN_STORE_CALLS;
    (sources + store).max(MIN_SHUTDOWN_GRACE)
}

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    /// Clean shutdown after SIGTERM/SIGINT
    CleanShutdown = 0,
    /// Bad configuration, nothing to do, or router unreachable at startup
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    sync: SyncConfig,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Passwords are taken byte for byte
        let mut router = RouterConfig::new(lookup("PASSWORD").unwrap_or_default());
        if let Some(host) = var("ROUTER_IP") {
            router.host = host;
        }
        if let Some(username) = var("USERNAME") {
            router.username = username;
        }
        router.port = parse_or(&var, "ROUTER_PORT", router.port)?;
        router.timeout_secs = parse_or(&var, "ROUTER_TIMEOUT_SECS", router.timeout_secs)?;

        let mut cloudflare = CloudflareConfig::default();
        cloudflare.enabled = flag(&lookup, "UPDATE_CLOUDFLARE", true);
        cloudflare.skip_empty = flag(&lookup, "SKIP_EMPTY_RANGES", false);
        cloudflare.timeout_secs = parse_or(&var, "HTTP_TIMEOUT_SECS", cloudflare.timeout_secs)?;
        if let Some(url) = var("CLOUDFLARE_API_URL") {
            cloudflare.api_url = url;
        }

        let interface = match var("IFNAME") {
            Some(raw) => {
                let name = InterfaceName::parse(&raw)
                    .map_err(|e| anyhow::anyhow!("IFNAME is not usable: {}", e))?;
                let mut interface = InterfaceConfig::new(name).with_dns_hostnames(
                    parse_hostname_list(&var("V6DNS_LIST").unwrap_or_default()),
                );
                if let Some(list) = var("IF_LIST_NAME") {
                    interface = interface.with_list_name(list);
                }
                Some(interface)
            }
            None => None,
        };

        let mut engine = EngineConfig::default();
        engine.check_interval_secs = parse_or(&var, "CHECK_INTERVAL", engine.check_interval_secs)?;

        let log_level = match var("LOG_LEVEL") {
            Some(level) => Level::from_str(&level).map_err(|_| {
                anyhow::anyhow!(
                    "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                    level
                )
            })?,
            None => Level::INFO,
        };

        Ok(Self {
            sync: SyncConfig {
                router,
                cloudflare,
                interface,
                engine,
            },
            log_level,
        })
    }

    /// Validate everything except "is there anything to do"
    ///
    /// The no-feature case is reported separately, after logging is up.
    fn validate(&self) -> Result<()> {
        if self.sync.router.password.is_empty() {
            anyhow::bail!("PASSWORD is required. Set it via: export PASSWORD=your_password");
        }
        if self.sync.engine.check_interval_secs == 0 {
            anyhow::bail!("CHECK_INTERVAL must be greater than 0");
        }
        if !self.sync.cloudflare.api_url.starts_with("https://")
            && !self.sync.cloudflare.api_url.starts_with("http://")
        {
            anyhow::bail!(
                "CLOUDFLARE_API_URL must use HTTP or HTTPS scheme. Got: {}",
                self.sync.cloudflare.api_url
            );
        }

        self.sync.router.validate()?;
        self.sync.engine.validate()?;
        if let Some(interface) = &self.sync.interface {
            interface.validate()?;
        }
        Ok(())
    }
}

/// Parse an optional numeric variable
fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

/// `true` (any case) enables; any other value, including an empty one, disables.
/// Only an unset variable takes the default.
fn flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting mtsyncd daemon");
    log_features(&config.sync);

    if !config.sync.any_feature_enabled() {
        error!("Nothing to do: enable UPDATE_CLOUDFLARE or set IFNAME");
        return SyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let (engine, events) = match start(&config.sync).await {
            Ok(started) => started,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return SyncExitCode::ConfigError;
            }
        };

        match serve(engine, events, shutdown_grace(&config.sync)).await {
            Ok(()) => SyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                SyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

fn log_features(config: &SyncConfig) {
    if config.cloudflare.enabled {
        info!(
            "Cloudflare ranges: enabled ({}, {})",
            config.cloudflare.v4_bucket(),
            config.cloudflare.v6_bucket()
        );
    } else {
        info!("Cloudflare ranges: disabled");
    }

    match &config.interface {
        Some(interface) => {
            info!(
                "Interface tracking: enabled ({} -> {})",
                interface.name,
                interface.bucket()
            );
            if interface.dns_hostnames.is_empty() {
                info!("AAAA records: none configured");
            } else {
                info!("AAAA records: {}", interface.dns_hostnames.join(", "));
            }
        }
        None => info!("Interface tracking: disabled"),
    }
}

/// Build collaborators and the engine; any failure here is a startup error
async fn start(config: &SyncConfig) -> Result<(SyncEngine, mpsc::Receiver<EngineEvent>)> {
    info!(
        "Connecting to router {}:{} as {}",
        config.router.host, config.router.port, config.router.username
    );
    let store = RouterOsStore::connect(config.router.clone())
        .await
        .context("Failed to connect to router")?;
    info!("Connected to router");

    let ranges = if config.cloudflare.enabled {
        let source = CloudflareRangeSource::from_config(&config.cloudflare)?;
        Some(Box::new(source) as Box<dyn mtsync_core::RangeSource>)
    } else {
        None
    };

    let interface = config.interface.as_ref().map(|interface| {
        Box::new(IprouteSource::new(interface.name.clone()))
            as Box<dyn mtsync_core::InterfaceSource>
    });

    let started = SyncEngine::new(
        Box::new(store),
        Box::new(MemorySnapshotStore::new()),
        ranges,
        interface,
        config,
    )?;
    Ok(started)
}

/// Run the engine until a shutdown signal arrives
async fn serve(
    engine: SyncEngine,
    mut events: mpsc::Receiver<EngineEvent>,
    grace: Duration,
) -> Result<()> {
    let mut signals = ShutdownSignals::install()?;
    let shutdown = CancellationToken::new();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let mut engine_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { engine.run(shutdown).await })
    };

    tokio::select! {
        signal = signals.recv() => {
            info!("Received shutdown signal: {}", signal);
        }
        joined = &mut engine_task => {
            // The engine only returns once cancelled
            anyhow::bail!("Engine stopped unexpectedly: {:?}", joined);
        }
    }

    info!("Shutting down daemon");
    shutdown.cancel();

    match tokio::time::timeout(grace, &mut engine_task).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("Engine task failed: {}", e)),
        Err(_) => {
            // Shutdown was requested; an unfinished cycle is re-diffed on next start
            warn!("Engine did not stop within {:?}, abandoning the current cycle", grace);
            engine_task.abort();
            Ok(())
        }
    }
}

/// SIGTERM and SIGINT listeners
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// CTRL-C only on non-Unix platforms
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }
}
