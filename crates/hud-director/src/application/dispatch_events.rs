//! EventDispatcher: routes plugin frames on the director's read loop.
//!
//! Runs on the connection's read-loop task, so every handler here is short:
//! roster and clock updates are in-memory, and the only write (a NEXT_LAP
//! trigger) is a handful of small frames.  Everything the hosting
//! application may want to react to is forwarded as a [`DirectorEvent`] on a
//! bounded channel without waiting for the receiver.

use std::sync::Arc;

use async_trait::async_trait;
use hud_core::protocol::messages::Command;
use hud_core::{
    ConnectionError, Driver, DriverRoster, Frame, FrameHandler, FrameSink, SessionClock,
};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::application::visibility_engine::WidgetVisibilityEngine;

/// Error type for frame dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The plugin sent a frame only the director may send.
    #[error("unexpected {0:?} from plugin")]
    UnexpectedFrame(Command),
}

impl From<DispatchError> for ConnectionError {
    fn from(err: DispatchError) -> Self {
        ConnectionError::Protocol(err.to_string())
    }
}

/// Notifications for the hosting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorEvent {
    /// The roster was replaced or a driver joined or left.
    DriversChanged { drivers: Vec<Driver> },
    /// The running order changed.
    PositionsChanged { drivers: Vec<Driver> },
    /// A session or telemetry notification, passed through unchanged.
    Session(Frame),
}

/// Director-side [`FrameHandler`].
pub struct EventDispatcher {
    roster: Arc<Mutex<DriverRoster>>,
    clock: Arc<SessionClock>,
    engine: Arc<WidgetVisibilityEngine>,
    events: mpsc::Sender<DirectorEvent>,
}

impl EventDispatcher {
    pub fn new(
        roster: Arc<Mutex<DriverRoster>>,
        clock: Arc<SessionClock>,
        engine: Arc<WidgetVisibilityEngine>,
        events: mpsc::Sender<DirectorEvent>,
    ) -> Self {
        Self {
            roster,
            clock,
            engine,
            events,
        }
    }

    fn publish(&self, event: DirectorEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("director event dropped: {e}");
        }
    }

    async fn update_roster(&self, update: impl FnOnce(&mut DriverRoster)) -> Vec<Driver> {
        let mut roster = self.roster.lock().await;
        update(&mut roster);
        roster.drivers().to_vec()
    }
}

#[async_trait]
impl FrameHandler for EventDispatcher {
    async fn handle_frame(&self, sink: &dyn FrameSink, frame: Frame) -> Result<(), ConnectionError> {
        match frame {
            // ── Roster ────────────────────────────────────────────────────────
            Frame::DriversList(drivers) => {
                let drivers = self.update_roster(|r| r.full_replace(drivers)).await;
                debug!(count = drivers.len() - 1, "drivers list replaced");
                self.publish(DirectorEvent::DriversChanged { drivers });
            }
            Frame::DriversPositions(ids) => {
                let drivers = self.update_roster(|r| r.reorder(&ids)).await;
                self.publish(DirectorEvent::PositionsChanged { drivers });
            }
            Frame::PlayerJoined(ref joined) => {
                let driver = Driver::new(joined.driver_id, joined.name.clone());
                let place = joined.place;
                let drivers = self.update_roster(|r| r.join(driver, place)).await;
                self.publish(DirectorEvent::DriversChanged { drivers });
                self.publish(DirectorEvent::Session(frame));
            }
            Frame::PlayerLeft(ref left) => {
                let id = left.driver_id;
                let drivers = self
                    .update_roster(|r| {
                        r.leave(id);
                    })
                    .await;
                self.publish(DirectorEvent::DriversChanged { drivers });
                self.publish(DirectorEvent::Session(frame));
            }

            // ── Clock and camera ──────────────────────────────────────────────
            Frame::SessionTime(time) => {
                self.clock.tick(time);
                self.publish(DirectorEvent::Session(frame));
            }
            Frame::VehicleControlChanged { driver_id } => {
                self.clock.set_viewed_driver(driver_id);
                self.publish(DirectorEvent::Session(frame));
            }

            // ── Lap starts drive NEXT_LAP triggers ────────────────────────────
            Frame::LapStarted(lap) => {
                if let Err(e) = self.engine.on_lap_started(sink, lap.driver_id, lap.lap).await {
                    warn!(driver_id = lap.driver_id, "next-lap trigger not sent: {e}");
                }
                self.publish(DirectorEvent::Session(frame));
            }

            // ── Pass-through notifications ────────────────────────────────────
            Frame::SessionStarted(_)
            | Frame::SessionEnded
            | Frame::RealtimeEntered
            | Frame::RealtimeExited
            | Frame::PitEntered { .. }
            | Frame::PitExited { .. }
            | Frame::GarageEntered
            | Frame::GarageExited
            | Frame::PauseToggled { .. } => self.publish(DirectorEvent::Session(frame)),

            // ── Frames the plugin never sends ─────────────────────────────────
            Frame::Identity(_)
            | Frame::PasswordRequest
            | Frame::PasswordDigest(_)
            | Frame::ConnectionRefused { .. }
            | Frame::ConnectionEstablished { .. }
            | Frame::WidgetsConfiguration(_)
            | Frame::ResetWidgetStates
            | Frame::WidgetState(_) => {
                return Err(DispatchError::UnexpectedFrame(frame.command()).into())
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
