//! ConnectionManager: accepts director connections and keeps the active one.
//!
//! Every accepted socket gets its own read loop and handshake.  Only once the
//! handshake succeeds does the connection become the *active* director; the
//! one it replaces is closed.  A peer that fails authentication never
//! disturbs an established director.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hud_core::{
    spawn_connection, AuthPolicy, CommandSpace, Connection, ConnectionError, ConnectionEvent,
    Frame, FrameHandler, FrameSink, Role,
};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::telemetry_relay::TelemetryRelay;

/// Default TCP port the plugin listens on.
pub const DEFAULT_PORT: u16 = 5397;

/// How often the accept loop checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Error type for the listener.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    pub space: CommandSpace,
    pub policy: AuthPolicy,
}

// ── Active director slot ──────────────────────────────────────────────────────

/// The established director connection, if any.
///
/// Implements [`FrameSink`]: writes go to the current director and fail with
/// [`ConnectionError::Closed`] while there is none.
#[derive(Debug, Default)]
pub struct ActiveDirector {
    slot: Mutex<Option<Connection>>,
}

impl ActiveDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Connection> {
        self.slot.lock().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Makes `conn` the active director, returning the one it displaced.
    async fn promote(&self, conn: Connection) -> Option<Connection> {
        self.slot.lock().await.replace(conn)
    }

    /// Empties the slot if it still holds `conn`.
    async fn release(&self, conn: &Connection) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.as_ref() {
            Some(active) if active.id() == conn.id() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Closes the active director connection, if any.
    pub async fn disconnect(&self) {
        let active = self.slot.lock().await.take();
        if let Some(conn) = active {
            info!(conn = %conn.id(), "disconnecting director");
            conn.close().await;
        }
    }

    async fn require(&self) -> Result<Connection, ConnectionError> {
        self.current().await.ok_or(ConnectionError::Closed)
    }
}

#[async_trait]
impl FrameSink for ActiveDirector {
    async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        self.require().await?.send(frame).await
    }

    async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError> {
        self.require().await?.send_batch(frames).await
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Accepts director connections.
pub struct ConnectionManager {
    listener: TcpListener,
    config: ListenerConfig,
    relay: Arc<TelemetryRelay>,
    handler: Arc<dyn FrameHandler>,
    active: Arc<ActiveDirector>,
}

impl ConnectionManager {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address is unavailable.
    pub async fn bind(
        config: ListenerConfig,
        relay: Arc<TelemetryRelay>,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<Self, NetworkError> {
        let listener =
            TcpListener::bind(config.bind_addr)
                .await
                .map_err(|source| NetworkError::BindFailed {
                    addr: config.bind_addr,
                    source,
                })?;

        Ok(Self {
            listener,
            config,
            relay,
            handler,
            active: Arc::new(ActiveDirector::new()),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The active-director slot, shared with the telemetry pump.
    pub fn active(&self) -> Arc<ActiveDirector> {
        Arc::clone(&self.active)
    }

    /// Accepts connections until `running` is cleared, then closes the
    /// active director.
    pub async fn run(self, running: Arc<AtomicBool>) {
        match self.local_addr() {
            Ok(addr) => info!("listening for director on {addr}"),
            Err(e) => warn!("listening for director (address unknown: {e})"),
        }

        while running.load(Ordering::Relaxed) {
            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => self.adopt(stream, peer),
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }

        info!("accept loop stopped");
        self.active.disconnect().await;
    }

    fn adopt(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle for {peer}: {e}");
        }

        let role = Role::Accepting {
            policy: self.config.policy.clone(),
            in_driving: self.relay.in_driving(),
        };
        let (conn, events, _read_loop) =
            spawn_connection(stream, self.config.space, role, Arc::clone(&self.handler));
        info!(conn = %conn.id(), %peer, "director connecting");

        tokio::spawn(supervise(
            conn,
            events,
            Arc::clone(&self.relay),
            Arc::clone(&self.active),
        ));
    }
}

/// Follows one connection's lifecycle: promotion, replay, release.
async fn supervise(
    conn: Connection,
    mut events: mpsc::Receiver<ConnectionEvent>,
    relay: Arc<TelemetryRelay>,
    active: Arc<ActiveDirector>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Established { in_driving } => {
                info!(conn = %conn.id(), in_driving, "director established");
                let slot = Arc::clone(&active);
                let next = conn.clone();
                let promoted = relay
                    .replay_then(&conn, move || async move { slot.promote(next).await })
                    .await;
                match promoted {
                    Ok((_, Some(previous))) => {
                        info!(old = %previous.id(), new = %conn.id(), "director replaced");
                        previous.close().await;
                    }
                    Ok((_, None)) => {}
                    Err(e) => {
                        warn!(conn = %conn.id(), "session replay failed: {e}");
                        conn.close().await;
                    }
                }
            }
            ConnectionEvent::Refused { message } => {
                warn!(conn = %conn.id(), "director refused: {message}");
            }
            ConnectionEvent::Fault(reason) => {
                error!(conn = %conn.id(), "director connection fault: {reason}");
            }
            ConnectionEvent::Closed => {
                if active.release(&conn).await {
                    info!(conn = %conn.id(), "director disconnected");
                } else {
                    debug!(conn = %conn.id(), "inactive connection closed");
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
