//! Connection lifecycle shared by the director and the plugin.
//!
//! One [`Connection`] wraps one bidirectional byte stream:
//!
//! - A dedicated read-loop task (started by [`spawn_connection`]) runs the
//!   handshake, then decodes frames one at a time and hands each to a
//!   [`FrameHandler`].  Any decode error, handler error or I/O error is fatal:
//!   the stream has no resynchronisation marker.
//! - Writes from any task go through a single write lock.  A command is
//!   composed inside a [`CommandWriter`] transaction (`begin_command` …
//!   `end_command`), so two writers never interleave their bytes.
//! - Lifecycle notifications ([`ConnectionEvent`]) are delivered on an
//!   `mpsc` channel.  `Closed` is sent exactly once, when the read loop ends.
//!
//! # Why one implementation for both sides? (for beginners)
//!
//! The director and the plugin speak the same framing and differ only in
//! the handshake role and the command code width.  Both are plain values
//! ([`Role`] and [`CommandSpace`]) passed in at start-up, so the lifecycle
//! code below is written once.

pub mod frame_reader;
pub mod handshake;

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::codec::{write_payload, FieldWriter, FrameError};
use crate::protocol::messages::{Command, CommandSpace, Frame};

pub use frame_reader::FrameReader;
pub use handshake::Role;

/// Capacity of the per-connection notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors raised by a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Reading from or writing to the stream failed.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound byte stream could not be decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The connection has been closed; no more frames can be sent.
    #[error("connection closed")]
    Closed,

    /// The handshake failed.
    #[error("connection refused: {message}")]
    Refused { message: String },

    /// A well-formed frame arrived where it is not allowed.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Lifecycle notifications for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake succeeded.
    Established { in_driving: bool },
    /// The handshake failed; `Closed` follows.
    Refused { message: String },
    /// A read or write failed.  The connection is unusable.
    Fault(String),
    /// The read loop has ended.  Sent exactly once.
    Closed,
}

/// Outbound half of a connection, as seen by application code.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Writes one frame atomically.
    async fn send(&self, frame: &Frame) -> Result<(), ConnectionError>;

    /// Writes several frames back to back under one write lock.
    async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError>;
}

/// Receives every frame decoded after the handshake.
///
/// Called on the read-loop task, so frames are handled strictly in arrival
/// order and decoding stalls until the handler returns.  Returning an error
/// closes the connection.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, sink: &dyn FrameSink, frame: Frame) -> Result<(), ConnectionError>;
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Inner {
    id: Uuid,
    space: CommandSpace,
    writer: Mutex<Option<BoxedWriter>>,
    established: AtomicBool,
    closed: AtomicBool,
    events: mpsc::Sender<ConnectionEvent>,
    shutdown: Notify,
}

/// Cloneable handle to one live connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("space", &self.inner.space)
            .field("established", &self.is_established())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    fn new<W>(writer: W, space: CommandSpace) -> (Self, mpsc::Receiver<ConnectionEvent>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Inner {
            id: Uuid::new_v4(),
            space,
            writer: Mutex::new(Some(Box::new(writer))),
            established: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events: tx,
            shutdown: Notify::new(),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Identifier used in log lines.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn space(&self) -> CommandSpace {
        self.inner.space
    }

    /// `true` once the handshake has succeeded.
    pub fn is_established(&self) -> bool {
        self.inner.established.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Opens a write transaction for `command`.
    ///
    /// The returned [`CommandWriter`] holds the connection's write lock until
    /// it is finished with [`CommandWriter::end_command`] or dropped.
    /// Dropping it without ending discards the command.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] if the connection has been closed.
    pub async fn begin_command(&self, command: Command) -> Result<CommandWriter<'_>, ConnectionError> {
        let guard = self.inner.writer.lock().await;
        if guard.is_none() {
            return Err(ConnectionError::Closed);
        }
        let mut fields = FieldWriter::with_capacity(64);
        fields.put_command(self.inner.space, command);
        Ok(CommandWriter {
            conn: self,
            guard,
            fields,
        })
    }

    /// Closes the connection.  Idempotent.
    ///
    /// Pending and future writes fail with [`ConnectionError::Closed`]; the
    /// read loop stops and emits [`ConnectionEvent::Closed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.notify_one();
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(conn = %self.inner.id, "shutdown of write half failed: {e}");
            }
        }
        info!(conn = %self.inner.id, "connection closed");
    }

    /// Reports a write failure on the notification channel.
    fn report_fault(&self, err: &ConnectionError) {
        error!(conn = %self.inner.id, "write failed: {err}");
        if self
            .inner
            .events
            .try_send(ConnectionEvent::Fault(err.to_string()))
            .is_err()
        {
            warn!(conn = %self.inner.id, "fault notification dropped");
        }
    }

    async fn notify(&self, event: ConnectionEvent) {
        if self.inner.events.send(event).await.is_err() {
            debug!(conn = %self.inner.id, "event receiver dropped");
        }
    }

    async fn write_locked(
        &self,
        guard: &mut MutexGuard<'_, Option<BoxedWriter>>,
        bytes: &[u8],
    ) -> Result<(), ConnectionError> {
        let writer = match &mut **guard {
            Some(writer) => writer,
            None => return Err(ConnectionError::Closed),
        };
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        result.map_err(|e| {
            let err = ConnectionError::Io(e);
            self.report_fault(&err);
            err
        })
    }
}

#[async_trait]
impl FrameSink for Connection {
    async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
        let mut cmd = self.begin_command(frame.command()).await?;
        write_payload(&mut cmd, frame)?;
        cmd.end_command().await
    }

    async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError> {
        if frames.is_empty() {
            return Ok(());
        }
        let mut fields = FieldWriter::with_capacity(64 * frames.len());
        for frame in frames {
            fields.put_command(self.inner.space, frame.command());
            write_payload(&mut fields, frame)?;
        }
        let mut guard = self.inner.writer.lock().await;
        self.write_locked(&mut guard, fields.as_slice()).await
    }
}

// ── Write transaction ─────────────────────────────────────────────────────────

/// One command being composed under the connection's write lock.
///
/// Dereferences to [`FieldWriter`], so fields are appended with the usual
/// `put_*` methods.
pub struct CommandWriter<'a> {
    conn: &'a Connection,
    guard: MutexGuard<'a, Option<BoxedWriter>>,
    fields: FieldWriter,
}

impl CommandWriter<'_> {
    /// Writes and flushes the command, then releases the write lock.
    pub async fn end_command(mut self) -> Result<(), ConnectionError> {
        let bytes = std::mem::take(&mut self.fields);
        self.conn
            .write_locked(&mut self.guard, bytes.as_slice())
            .await
    }
}

impl Deref for CommandWriter<'_> {
    type Target = FieldWriter;

    fn deref(&self) -> &FieldWriter {
        &self.fields
    }
}

impl DerefMut for CommandWriter<'_> {
    fn deref_mut(&mut self) -> &mut FieldWriter {
        &mut self.fields
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

/// Splits `stream`, starts the read loop and returns the connection handle,
/// its notification receiver and the read-loop task.
///
/// The read loop performs the handshake for `role` first; frames are only
/// passed to `handler` after [`ConnectionEvent::Established`].
pub fn spawn_connection<S>(
    stream: S,
    space: CommandSpace,
    role: Role,
    handler: Arc<dyn FrameHandler>,
) -> (Connection, mpsc::Receiver<ConnectionEvent>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (conn, events) = Connection::new(write_half, space);
    let reader = FrameReader::new(read_half, space);

    let task_conn = conn.clone();
    let task = tokio::spawn(async move {
        read_loop(task_conn, reader, role, handler).await;
    });

    (conn, events, task)
}

async fn read_loop<R>(
    conn: Connection,
    mut reader: FrameReader<R>,
    role: Role,
    handler: Arc<dyn FrameHandler>,
) where
    R: AsyncRead + Unpin,
{
    let id = conn.id();
    info!(conn = %id, accepting = role.is_accepting(), "connection started");

    let outcome = tokio::select! {
        _ = conn.inner.shutdown.notified() => Ok(()),
        result = drive(&conn, &mut reader, &role, handler.as_ref()) => result,
    };

    match outcome {
        Ok(()) => info!(conn = %id, "read loop finished"),
        Err(ConnectionError::Refused { message }) => {
            warn!(conn = %id, "handshake refused: {message}");
        }
        Err(e) => {
            error!(conn = %id, "connection failed: {e}");
            conn.notify(ConnectionEvent::Fault(e.to_string())).await;
        }
    }

    conn.close().await;
    conn.notify(ConnectionEvent::Closed).await;
}

async fn drive<R>(
    conn: &Connection,
    reader: &mut FrameReader<R>,
    role: &Role,
    handler: &dyn FrameHandler,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let in_driving = match handshake::perform(role, conn, reader).await {
        Ok(flag) => flag,
        Err(ConnectionError::Refused { message }) => {
            conn.notify(ConnectionEvent::Refused {
                message: message.clone(),
            })
            .await;
            return Err(ConnectionError::Refused { message });
        }
        Err(e) => return Err(e),
    };

    conn.inner.established.store(true, Ordering::Release);
    info!(conn = %conn.id(), in_driving, "connection established");
    conn.notify(ConnectionEvent::Established { in_driving }).await;

    while let Some(frame) = reader.next_frame().await? {
        debug!(conn = %conn.id(), command = ?frame.command(), "frame received");
        if frame.is_handshake() {
            return Err(ConnectionError::Protocol(format!(
                "{:?} after handshake",
                frame.command()
            )));
        }
        handler.handle_frame(conn, frame).await?;
    }
    Ok(())
}
