//! Connection handshake for both ends of the director protocol.
//!
//! ```text
//! connecting side                      accepting side
//! ───────────────                      ──────────────
//! IDENTITY(token)        ──────────▶   compare token      (if identity check)
//!                        ◀──────────   PASSWORD_REQUEST   (if a password is set)
//! PASSWORD_DIGEST(md5)   ──────────▶   compare digest
//!                        ◀──────────   CONNECTION_ESTABLISHED(in_driving)
//!                                  or  CONNECTION_REFUSED(message)
//! ```
//!
//! Both comparisons are byte-for-byte.  A refusal is final: the accepting
//! side closes the connection right after sending it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionError, FrameReader, FrameSink};
use crate::protocol::auth::{protocol_identity, AuthPolicy, Credentials};
use crate::protocol::messages::Frame;

/// Refusal message for an identity token mismatch.
pub const IDENTITY_MISMATCH: &str = "Identity mismatch";

/// Refusal message for a wrong password.
pub const WRONG_PASSWORD: &str = "Wrong password";

/// Which side of the handshake this end plays.
#[derive(Debug, Clone)]
pub enum Role {
    /// The director: presents credentials.
    Connecting(Credentials),
    /// The plugin: checks credentials and reports the driving context.
    Accepting {
        policy: AuthPolicy,
        in_driving: Arc<AtomicBool>,
    },
}

impl Role {
    pub fn is_accepting(&self) -> bool {
        matches!(self, Role::Accepting { .. })
    }
}

/// Runs the handshake and returns the in-driving flag carried by
/// CONNECTION_ESTABLISHED.
///
/// # Errors
///
/// [`ConnectionError::Refused`] if either side refused;
/// [`ConnectionError::Protocol`] if the peer sent a frame that does not
/// belong in the handshake; I/O and decode errors as usual.
pub async fn perform<R>(
    role: &Role,
    conn: &Connection,
    reader: &mut FrameReader<R>,
) -> Result<bool, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    match role {
        Role::Connecting(credentials) => connect(credentials, conn, reader).await,
        Role::Accepting { policy, in_driving } => {
            accept(policy, in_driving.load(Ordering::Acquire), conn, reader).await
        }
    }
}

async fn next_handshake_frame<R>(reader: &mut FrameReader<R>) -> Result<Frame, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    reader.next_frame().await?.ok_or(ConnectionError::Closed)
}

async fn connect<R>(
    credentials: &Credentials,
    conn: &Connection,
    reader: &mut FrameReader<R>,
) -> Result<bool, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    if credentials.identity_check {
        conn.send(&Frame::Identity(protocol_identity())).await?;
    }

    loop {
        match next_handshake_frame(reader).await? {
            Frame::PasswordRequest => {
                debug!(conn = %conn.id(), "password requested");
                conn.send(&Frame::PasswordDigest(credentials.password_digest))
                    .await?;
            }
            Frame::ConnectionEstablished { in_driving } => return Ok(in_driving),
            Frame::ConnectionRefused { message } => {
                return Err(ConnectionError::Refused { message })
            }
            other => {
                return Err(ConnectionError::Protocol(format!(
                    "unexpected {:?} during handshake",
                    other.command()
                )))
            }
        }
    }
}

async fn accept<R>(
    policy: &AuthPolicy,
    in_driving: bool,
    conn: &Connection,
    reader: &mut FrameReader<R>,
) -> Result<bool, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    if policy.identity_check {
        match next_handshake_frame(reader).await? {
            Frame::Identity(token) if token == protocol_identity() => {}
            Frame::Identity(_) => return refuse(conn, IDENTITY_MISMATCH).await,
            other => {
                warn!(conn = %conn.id(), command = ?other.command(), "expected identity");
                return refuse(conn, IDENTITY_MISMATCH).await;
            }
        }
    }

    if let Some(expected) = policy.password_digest {
        conn.send(&Frame::PasswordRequest).await?;
        match next_handshake_frame(reader).await? {
            Frame::PasswordDigest(digest) if digest == expected => {}
            Frame::PasswordDigest(_) => return refuse(conn, WRONG_PASSWORD).await,
            other => {
                return Err(ConnectionError::Protocol(format!(
                    "expected password digest, got {:?}",
                    other.command()
                )))
            }
        }
    }

    conn.send(&Frame::ConnectionEstablished { in_driving }).await?;
    Ok(in_driving)
}

async fn refuse(conn: &Connection, message: &str) -> Result<bool, ConnectionError> {
    conn.send(&Frame::ConnectionRefused {
        message: message.to_string(),
    })
    .await?;
    Err(ConnectionError::Refused {
        message: message.to_string(),
    })
}
