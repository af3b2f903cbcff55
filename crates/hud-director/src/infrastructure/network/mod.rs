//! Network infrastructure for the director.
//!
//! Opens the TCP stream to the plugin and hands it to the shared connection
//! machinery in `hud_core::connection`, which performs the handshake and runs
//! the read loop.  A failure here, before any byte has been exchanged, is
//! reported as [`ConnectError`] and is distinct from the faults a live
//! connection reports through `ConnectionEvent::Fault`.
//!
//! There is no reconnect loop: when the connection closes, the operator
//! decides whether to connect again.

use std::sync::Arc;
use std::time::Duration;

use hud_core::{
    spawn_connection, CommandSpace, Connection, ConnectionEvent, Credentials, FrameHandler, Role,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How long to wait for the TCP connection to be accepted.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while opening the connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The target is not of the form `host:port`.
    #[error("invalid target '{0}': expected host:port")]
    InvalidTarget(String),

    /// The TCP connection could not be opened.
    #[error("failed to connect to plugin at {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The plugin did not accept the connection in time.
    #[error("timed out connecting to plugin at {target}")]
    Timeout { target: String },
}

/// A started director connection.
pub struct DirectorConnection {
    pub connection: Connection,
    pub events: mpsc::Receiver<ConnectionEvent>,
    pub read_loop: JoinHandle<()>,
}

/// Splits `host:port` and validates the port.
///
/// IPv6 literals must be bracketed (`[::1]:5397`).
pub fn parse_target(target: &str) -> Result<(String, u16), ConnectError> {
    let invalid = || ConnectError::InvalidTarget(target.to_string());
    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Connects to the plugin at `target` and starts the read loop.
///
/// # Errors
///
/// Returns [`ConnectError`] if the target is malformed, the connection is
/// refused at the TCP level, or it is not accepted within
/// [`CONNECT_TIMEOUT`].  Handshake refusals arrive later as
/// `ConnectionEvent::Refused`.
pub async fn connect(
    target: &str,
    space: CommandSpace,
    credentials: Credentials,
    handler: Arc<dyn FrameHandler>,
) -> Result<DirectorConnection, ConnectError> {
    let (host, port) = parse_target(target)?;

    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| ConnectError::Timeout {
            target: target.to_string(),
        })?
        .map_err(|source| ConnectError::Connect {
            target: target.to_string(),
            source,
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not disable Nagle on {target}: {e}");
    }

    let (connection, events, read_loop) =
        spawn_connection(stream, space, Role::Connecting(credentials), handler);
    info!(conn = %connection.id(), %target, "connected to plugin");

    Ok(DirectorConnection {
        connection,
        events,
        read_loop,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
