//! Director: the entry point the hosting application calls.
//!
//! Holds the outbound side of the connection together with the visibility
//! engine and the configuration serializer, and decides when a full push
//! (configuration blob followed by all widget states) is due:
//!
//! - when the connection is established while the plugin is in a driving
//!   context, and
//! - whenever the plugin reports that it entered the driving context.

use std::path::PathBuf;
use std::sync::Arc;

use hud_core::{ConnectionError, ConnectionEvent, Frame, FrameSink};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::dispatch_events::DirectorEvent;
use crate::application::visibility_engine::{EngineError, WidgetVisibilityEngine};

/// Error type for director operations.
#[derive(Debug, Error)]
pub enum DirectorError {
    /// The configuration blob could not be produced.
    #[error("failed to serialize widget configuration: {0}")]
    Configuration(#[source] std::io::Error),

    /// Sending to the plugin failed.
    #[error("transmit error: {0}")]
    Transmit(#[from] ConnectionError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Produces the opaque WIDGETS_CONFIGURATION blob.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigurationSerializer: Send + Sync {
    fn serialize(&self) -> std::io::Result<Vec<u8>>;
}

/// Reads the blob from a file each time it is needed.
#[derive(Debug, Clone)]
pub struct FileConfigurationSerializer {
    path: PathBuf,
}

impl FileConfigurationSerializer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigurationSerializer for FileConfigurationSerializer {
    fn serialize(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// A fixed blob, e.g. when no layout file is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticConfiguration(pub Vec<u8>);

impl ConfigurationSerializer for StaticConfiguration {
    fn serialize(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Narrow facade over the director's protocol behaviour.
pub struct Director {
    engine: Arc<WidgetVisibilityEngine>,
    serializer: Arc<dyn ConfigurationSerializer>,
    sink: Arc<dyn FrameSink>,
}

impl Director {
    pub fn new(
        engine: Arc<WidgetVisibilityEngine>,
        serializer: Arc<dyn ConfigurationSerializer>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            engine,
            serializer,
            sink,
        }
    }

    /// Sends the current widget layout as WIDGETS_CONFIGURATION.
    pub async fn send_configuration(&self) -> Result<(), DirectorError> {
        let blob = self
            .serializer
            .serialize()
            .map_err(DirectorError::Configuration)?;
        let len = blob.len();
        self.sink.send(&Frame::WidgetsConfiguration(blob)).await?;
        debug!(bytes = len, "widget configuration sent");
        Ok(())
    }

    /// Sends every effective widget state as one batch.
    pub async fn apply_widget_states(&self) -> Result<usize, DirectorError> {
        Ok(self.engine.apply_all(self.sink.as_ref()).await?)
    }

    /// Configuration first, then widget states.
    pub async fn push_all(&self) -> Result<(), DirectorError> {
        self.send_configuration().await?;
        let count = self.apply_widget_states().await?;
        info!(widget_states = count, "full configuration pushed");
        Ok(())
    }

    /// Reacts to a connection lifecycle notification.
    pub async fn on_connection_event(&self, event: &ConnectionEvent) -> Result<(), DirectorError> {
        match event {
            ConnectionEvent::Established { in_driving: true } => self.push_all().await,
            ConnectionEvent::Established { in_driving: false } => {
                info!("plugin not in a driving context; waiting before pushing configuration");
                Ok(())
            }
            ConnectionEvent::Refused { .. } | ConnectionEvent::Fault(_) | ConnectionEvent::Closed => {
                Ok(())
            }
        }
    }

    /// Reacts to a notification from the dispatcher.
    pub async fn on_director_event(&self, event: &DirectorEvent) -> Result<(), DirectorError> {
        match event {
            DirectorEvent::Session(Frame::RealtimeEntered) => self.push_all().await,
            _ => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
