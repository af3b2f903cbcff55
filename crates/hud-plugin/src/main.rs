//! HUD plugin entry point (headless).
//!
//! Loads the configuration, starts the director listener and the telemetry
//! pump, then runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- file, then CLI overrides
//!  └─ ConnectionManager::bind  -- TCP listener, accepting handshake
//!  └─ TelemetryRelay::run      -- simulator events -> active director
//!  └─ ConnectionManager::run   -- accept loop until shutdown
//! ```
//!
//! Inside the simulator the renderer implements [`WidgetHost`] and
//! [`ConfigurationSink`] and feeds the telemetry channel.  The headless
//! build logs overrides and keeps the last layout blob in memory.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hud_core::{AuthPolicy, CodeWidth, CommandSpace, EffectiveWidgetState};
use hud_plugin::application::dispatch_commands::{CommandDispatcher, ConfigurationSink};
use hud_plugin::application::telemetry_relay::{TelemetryEvent, TelemetryRelay};
use hud_plugin::application::widget_overrides::{OverrideStore, WidgetHost};
use hud_plugin::infrastructure::network::connection_manager::{ConnectionManager, ListenerConfig};
use hud_plugin::infrastructure::storage::config::{self, PluginConfig};

const TELEMETRY_CAPACITY: usize = 1024;

// ── Headless collaborators ────────────────────────────────────────────────────

struct LoggingWidgetHost;

impl WidgetHost for LoggingWidgetHost {
    fn apply_override(&self, state: &EffectiveWidgetState) {
        info!(
            widget = %state.widget_name,
            start = state.window_start,
            end = state.window_end,
            x = state.pos_x,
            y = state.pos_y,
            for_driver = state.for_driver_id,
            "override"
        );
    }

    fn clear_overrides(&self) {
        info!("overrides cleared");
    }
}

#[derive(Default)]
struct MemoryConfigurationSink {
    layout: std::sync::RwLock<Vec<u8>>,
}

impl ConfigurationSink for MemoryConfigurationSink {
    fn load_configuration(&self, blob: &[u8]) -> std::io::Result<()> {
        let mut layout = self
            .layout
            .write()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "layout lock poisoned"))?;
        *layout = blob.to_vec();
        info!(bytes = blob.len(), "layout stored");
        Ok(())
    }
}

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WidthArg {
    Byte,
    Short,
}

impl From<WidthArg> for CodeWidth {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::Byte => CodeWidth::Byte,
            WidthArg::Short => CodeWidth::Short,
        }
    }
}

/// HUD plugin, headless.
///
/// Every flag overrides the matching value from the configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "hud-plugin",
    about = "Accepts the race director and applies its widget overrides",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "HUD_PLUGIN_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "HUD_PLUGIN_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "HUD_PLUGIN_PORT")]
    port: Option<u16>,

    /// Password the director must present.
    #[arg(long, env = "HUD_PLUGIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Command code width.
    #[arg(long, value_enum)]
    code_width: Option<WidthArg>,

    /// Do not require the identity token.
    #[arg(long)]
    no_identity_check: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, mut cfg: PluginConfig) -> PluginConfig {
        if let Some(bind) = &self.bind {
            cfg.network.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(password) = &self.password {
            cfg.auth.password = Some(password.clone());
        }
        if let Some(width) = self.code_width {
            cfg.protocol.code_width = width.into();
        }
        if self.no_identity_check {
            cfg.auth.identity_check = false;
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
        }
        cfg
    }

    fn load(&self) -> anyhow::Result<PluginConfig> {
        let cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => config::load_config().context("loading default config")?,
        };
        Ok(self.apply(cfg))
    }
}

fn listener_config(cfg: &PluginConfig) -> anyhow::Result<ListenerConfig> {
    let bind_addr = cfg
        .network
        .listen_addr()
        .with_context(|| format!("invalid bind address '{}'", cfg.network.bind_address))?;
    Ok(ListenerConfig {
        bind_addr,
        space: CommandSpace::for_width(cfg.protocol.code_width),
        policy: AuthPolicy::new(cfg.auth.password.as_deref(), cfg.auth.identity_check),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    info!("HUD plugin starting");

    // ── Application services ──────────────────────────────────────────────────
    let overrides = Arc::new(Mutex::new(OverrideStore::new(Arc::new(LoggingWidgetHost))));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&overrides),
        Arc::new(MemoryConfigurationSink::default()),
    ));
    let relay = Arc::new(TelemetryRelay::new());

    // ── Listener ──────────────────────────────────────────────────────────────
    let manager =
        ConnectionManager::bind(listener_config(&cfg)?, Arc::clone(&relay), dispatcher).await?;
    let active = manager.active();

    // ── Telemetry pump ────────────────────────────────────────────────────────
    // The simulator binding owns `telemetry_tx`; headless, nothing is sent.
    let (telemetry_tx, telemetry_rx) = mpsc::channel::<TelemetryEvent>(TELEMETRY_CAPACITY);
    let pump_relay = Arc::clone(&relay);
    let pump_active = Arc::clone(&active);
    tokio::spawn(async move {
        pump_relay.run(telemetry_rx, pump_active.as_ref()).await;
    });

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    manager.run(running).await;
    drop(telemetry_tx);

    info!(overrides = overrides.lock().await.len(), "HUD plugin stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
