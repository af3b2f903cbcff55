//! CommandDispatcher: routes director commands on the plugin's read loop.
//!
//! The director only ever sends the widget layout and widget states.  The
//! layout blob goes to the [`ConfigurationSink`] untouched; widget states go
//! to the [`OverrideStore`].  Anything else from the director is a protocol
//! violation and ends the connection.

use std::sync::Arc;

use async_trait::async_trait;
use hud_core::protocol::messages::Command;
use hud_core::{ConnectionError, Frame, FrameHandler, FrameSink};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::widget_overrides::OverrideStore;

/// Error type for frame dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The director sent a frame only the plugin may send.
    #[error("unexpected {0:?} from director")]
    UnexpectedFrame(Command),
}

impl From<DispatchError> for ConnectionError {
    fn from(err: DispatchError) -> Self {
        ConnectionError::Protocol(err.to_string())
    }
}

/// Receives the opaque widget layout.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigurationSink: Send + Sync {
    fn load_configuration(&self, blob: &[u8]) -> std::io::Result<()>;
}

/// Plugin-side [`FrameHandler`].
pub struct CommandDispatcher {
    overrides: Arc<Mutex<OverrideStore>>,
    configuration: Arc<dyn ConfigurationSink>,
}

impl CommandDispatcher {
    pub fn new(overrides: Arc<Mutex<OverrideStore>>, configuration: Arc<dyn ConfigurationSink>) -> Self {
        Self {
            overrides,
            configuration,
        }
    }
}

#[async_trait]
impl FrameHandler for CommandDispatcher {
    async fn handle_frame(&self, _sink: &dyn FrameSink, frame: Frame) -> Result<(), ConnectionError> {
        match frame {
            Frame::WidgetsConfiguration(blob) => {
                // A layout the host cannot load leaves the previous one in place.
                match self.configuration.load_configuration(&blob) {
                    Ok(()) => debug!(bytes = blob.len(), "widget configuration loaded"),
                    Err(e) => warn!(bytes = blob.len(), "widget configuration rejected: {e}"),
                }
            }
            Frame::ResetWidgetStates => self.overrides.lock().await.reset(),
            Frame::WidgetState(state) => self.overrides.lock().await.apply(state),
            other => return Err(DispatchError::UnexpectedFrame(other.command()).into()),
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
