//! HUD race director entry point.
//!
//! Loads the TOML configuration, connects to the plugin and runs the event
//! loop until the connection closes or Ctrl-C is pressed.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- file, then CLI overrides
//!  └─ WidgetVisibilityEngine     -- roster + clock + widget registry
//!  └─ connect()                  -- TCP + handshake, read loop task
//!  └─ event loop
//!       ├─ ConnectionEvent   -> Director::on_connection_event
//!       ├─ DirectorEvent     -> Director::on_director_event
//!       └─ Ctrl-C            -> close the connection
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use hud_core::{
    CodeWidth, CommandSpace, ConnectionEvent, Credentials, DriverRoster, FrameSink, SessionClock,
    StaticWidgetRegistry,
};
use hud_director::application::director::{
    ConfigurationSerializer, Director, FileConfigurationSerializer, StaticConfiguration,
};
use hud_director::application::dispatch_events::{DirectorEvent, EventDispatcher};
use hud_director::application::visibility_engine::WidgetVisibilityEngine;
use hud_director::infrastructure::network::{connect, DirectorConnection};
use hud_director::infrastructure::storage::config::{self, DirectorConfig};

const DIRECTOR_EVENT_CAPACITY: usize = 256;

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

/// HUD race director.
///
/// Every flag overrides the matching value from the configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "hud-director",
    about = "Remote control for the in-simulator HUD overlay",
    version
)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "HUD_DIRECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// `host:port` of the plugin.
    #[arg(long, env = "HUD_DIRECTOR_TARGET")]
    target: Option<String>,

    /// Connection password.
    #[arg(long, env = "HUD_DIRECTOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Command code width: `byte` for the standalone plugin, `short` when
    /// embedded in the host protocol.
    #[arg(long, value_enum)]
    code_width: Option<WidthArg>,

    /// Skip sending the identity token.
    #[arg(long)]
    no_identity_check: bool,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies the command-line overrides on top of `cfg`.
    fn apply(&self, mut cfg: DirectorConfig) -> DirectorConfig {
        if let Some(target) = &self.target {
            cfg.connection.target = target.clone();
        }
        if let Some(password) = &self.password {
            cfg.connection.password = Some(password.clone());
        }
        if let Some(width) = self.code_width {
            cfg.connection.code_width = width.into();
        }
        if self.no_identity_check {
            cfg.connection.identity_check = false;
        }
        if let Some(level) = &self.log_level {
            cfg.logging.level = level.clone();
        }
        cfg
    }

    fn load(&self) -> anyhow::Result<DirectorConfig> {
        let cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => config::load_config().context("loading default config")?,
        };
        Ok(self.apply(cfg))
    }
}

fn serializer_for(cfg: &DirectorConfig) -> Arc<dyn ConfigurationSerializer> {
    match &cfg.layout.blob_path {
        Some(path) => Arc::new(FileConfigurationSerializer::new(path)),
        None => Arc::new(StaticConfiguration::default()),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load()?;

    // Level from the config file, overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    info!(target = %cfg.connection.target, "HUD race director starting");

    // ── Domain state ──────────────────────────────────────────────────────────
    let roster = Arc::new(Mutex::new(DriverRoster::new()));
    let clock = Arc::new(SessionClock::new());
    let registry = Arc::new(StaticWidgetRegistry::new(cfg.widgets.clone()));
    let engine = Arc::new(WidgetVisibilityEngine::new(
        Arc::clone(&roster),
        Arc::clone(&clock),
        registry,
    ));
    engine.set_widget_states(cfg.widget_states.clone()).await;

    let (director_tx, mut director_rx) = mpsc::channel(DIRECTOR_EVENT_CAPACITY);
    let dispatcher = Arc::new(EventDispatcher::new(
        roster,
        clock,
        Arc::clone(&engine),
        director_tx,
    ));

    // ── Connection ────────────────────────────────────────────────────────────
    let credentials = Credentials::new(
        cfg.connection.password.as_deref(),
        cfg.connection.identity_check,
    );
    let space = CommandSpace::for_width(cfg.connection.code_width);
    let DirectorConnection {
        connection,
        mut events,
        read_loop,
    } = connect(&cfg.connection.target, space, credentials, dispatcher).await?;

    let sink: Arc<dyn FrameSink> = Arc::new(connection.clone());
    let director = Director::new(engine, serializer_for(&cfg), sink);

    // ── Event loop ────────────────────────────────────────────────────────────
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    error!("failed to listen for Ctrl-C: {e}");
                }
                info!("shutdown signal received");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    ConnectionEvent::Established { in_driving } => {
                        info!(in_driving, "connection established");
                    }
                    ConnectionEvent::Refused { message } => {
                        error!("plugin refused the connection: {message}");
                    }
                    ConnectionEvent::Fault(reason) => warn!("connection fault: {reason}"),
                    ConnectionEvent::Closed => {
                        info!("connection closed");
                        break;
                    }
                }
                if let Err(e) = director.on_connection_event(&event).await {
                    warn!("could not push configuration: {e}");
                }
            }
            Some(event) = director_rx.recv() => {
                log_director_event(&event);
                if let Err(e) = director.on_director_event(&event).await {
                    warn!("could not push configuration: {e}");
                }
            }
        }
    }

    connection.close().await;
    if let Err(e) = read_loop.await {
        warn!("read loop ended abnormally: {e}");
    }

    info!("HUD race director stopped");
    Ok(())
}

fn log_director_event(event: &DirectorEvent) {
    match event {
        DirectorEvent::DriversChanged { drivers } => {
            info!(drivers = drivers.len().saturating_sub(1), "driver list changed");
        }
        DirectorEvent::PositionsChanged { drivers } => {
            debug!(drivers = drivers.len().saturating_sub(1), "positions changed");
        }
        DirectorEvent::Session(frame) => debug!(command = ?frame.command(), "session event"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
