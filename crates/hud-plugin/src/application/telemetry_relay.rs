//! TelemetryRelay: forwards simulator events to the director.
//!
//! The simulator binding produces [`TelemetryEvent`]s whether or not a
//! director is connected.  The relay keeps the state a director needs on
//! arrival (the roster, the last session time and the driving-context flag
//! carried in CONNECTION_ESTABLISHED) and turns each event into its frame.
//!
//! # Replay (for beginners)
//!
//! A director that connects mid-session has missed the last DRIVERS_LIST.
//! Without it every `for_driver` id would resolve to "auto".  Right after the
//! handshake the connection manager calls [`TelemetryRelay::replay_then`],
//! which sends the current roster and session time as one batch and then
//! promotes the connection.  Live events are published under the same
//! snapshot lock, so none of them can reach the new director ahead of the
//! replay.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hud_core::protocol::messages::{
    LapStartedMessage, PlayerJoinedMessage, PlayerLeftMessage, SessionType,
};
use hud_core::{ConnectionError, Driver, DriverRoster, Frame, FrameSink};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// One notification from the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    SessionStarted(SessionType),
    SessionEnded,
    /// The player is now in a driving context (on track, not in menus).
    RealtimeEntered,
    RealtimeExited,
    DriversList(Vec<Driver>),
    DriversPositions(Vec<i32>),
    LapStarted { driver_id: i32, lap: i32 },
    PitEntered { driver_id: i32 },
    PitExited { driver_id: i32 },
    GarageEntered,
    GarageExited,
    /// The camera switched to another car.
    VehicleControlChanged { driver_id: i32 },
    PauseToggled { paused: bool },
    PlayerJoined { name: String, driver_id: i32, place: u16 },
    PlayerLeft { name: String, driver_id: i32 },
    /// Session clock in milliseconds.
    SessionTime(i64),
}

impl TelemetryEvent {
    /// The frame announcing this event to the director.
    pub fn to_frame(&self) -> Frame {
        match self.clone() {
            TelemetryEvent::SessionStarted(kind) => Frame::SessionStarted(kind),
            TelemetryEvent::SessionEnded => Frame::SessionEnded,
            TelemetryEvent::RealtimeEntered => Frame::RealtimeEntered,
            TelemetryEvent::RealtimeExited => Frame::RealtimeExited,
            TelemetryEvent::DriversList(drivers) => Frame::DriversList(drivers),
            TelemetryEvent::DriversPositions(ids) => Frame::DriversPositions(ids),
            TelemetryEvent::LapStarted { driver_id, lap } => {
                Frame::LapStarted(LapStartedMessage { driver_id, lap })
            }
            TelemetryEvent::PitEntered { driver_id } => Frame::PitEntered { driver_id },
            TelemetryEvent::PitExited { driver_id } => Frame::PitExited { driver_id },
            TelemetryEvent::GarageEntered => Frame::GarageEntered,
            TelemetryEvent::GarageExited => Frame::GarageExited,
            TelemetryEvent::VehicleControlChanged { driver_id } => {
                Frame::VehicleControlChanged { driver_id }
            }
            TelemetryEvent::PauseToggled { paused } => Frame::PauseToggled { paused },
            TelemetryEvent::PlayerJoined {
                name,
                driver_id,
                place,
            } => Frame::PlayerJoined(PlayerJoinedMessage {
                name,
                driver_id,
                place,
            }),
            TelemetryEvent::PlayerLeft { name, driver_id } => {
                Frame::PlayerLeft(PlayerLeftMessage { name, driver_id })
            }
            TelemetryEvent::SessionTime(time) => Frame::SessionTime(time),
        }
    }
}

#[derive(Debug, Default)]
struct SessionSnapshot {
    roster: DriverRoster,
    session_time: Option<i64>,
}

/// Turns simulator events into frames and remembers the session state.
pub struct TelemetryRelay {
    in_driving: Arc<AtomicBool>,
    snapshot: Mutex<SessionSnapshot>,
}

impl Default for TelemetryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRelay {
    pub fn new() -> Self {
        Self {
            in_driving: Arc::new(AtomicBool::new(false)),
            snapshot: Mutex::new(SessionSnapshot::default()),
        }
    }

    /// Shared driving-context flag, read by the accepting handshake.
    pub fn in_driving(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_driving)
    }

    pub fn is_in_driving(&self) -> bool {
        self.in_driving.load(Ordering::SeqCst)
    }

    /// Updates the snapshot from `event` and returns its frame.
    pub async fn observe(&self, event: &TelemetryEvent) -> Frame {
        let mut snapshot = self.snapshot.lock().await;
        self.record(&mut snapshot, event);
        event.to_frame()
    }

    fn record(&self, snapshot: &mut SessionSnapshot, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RealtimeEntered => self.in_driving.store(true, Ordering::SeqCst),
            TelemetryEvent::RealtimeExited | TelemetryEvent::SessionEnded => {
                self.in_driving.store(false, Ordering::SeqCst)
            }
            _ => {}
        }

        match event {
            TelemetryEvent::SessionStarted(_) => *snapshot = SessionSnapshot::default(),
            TelemetryEvent::DriversList(drivers) => snapshot.roster.full_replace(drivers.clone()),
            TelemetryEvent::DriversPositions(ids) => snapshot.roster.reorder(ids),
            TelemetryEvent::PlayerJoined {
                name,
                driver_id,
                place,
            } => snapshot
                .roster
                .join(Driver::new(*driver_id, name.clone()), *place),
            TelemetryEvent::PlayerLeft { driver_id, .. } => {
                snapshot.roster.leave(*driver_id);
            }
            TelemetryEvent::SessionTime(time) => snapshot.session_time = Some(*time),
            _ => {}
        }
    }

    /// Records `event` and sends its frame to `sink`.
    ///
    /// The snapshot stays locked until the frame is written.  Returns
    /// `Ok(false)` when no director is connected; the event is still recorded
    /// for the next replay.
    pub async fn publish(
        &self,
        event: &TelemetryEvent,
        sink: &dyn FrameSink,
    ) -> Result<bool, ConnectionError> {
        let mut snapshot = self.snapshot.lock().await;
        self.record(&mut snapshot, event);
        match sink.send(&event.to_frame()).await {
            Ok(()) => Ok(true),
            Err(ConnectionError::Closed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Frames that bring a newly established director up to date.
    pub async fn replay_frames(&self) -> Vec<Frame> {
        Self::frames_for(&*self.snapshot.lock().await)
    }

    fn frames_for(snapshot: &SessionSnapshot) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(2);
        if !snapshot.roster.is_empty() {
            frames.push(Frame::DriversList(snapshot.roster.announced()));
        }
        if let Some(time) = snapshot.session_time {
            frames.push(Frame::SessionTime(time));
        }
        frames
    }

    /// Sends [`replay_frames`](Self::replay_frames) as one batch.
    ///
    /// Returns the number of frames sent.
    pub async fn replay(&self, sink: &dyn FrameSink) -> Result<usize, ConnectionError> {
        self.replay_then(sink, || async {}).await.map(|(count, ())| count)
    }

    /// Sends the replay batch, then runs `then` before any live event can be
    /// published.
    ///
    /// `then` is skipped when the batch cannot be written.  Returns the
    /// number of frames sent together with the output of `then`.
    pub async fn replay_then<F, Fut, T>(
        &self,
        sink: &dyn FrameSink,
        then: F,
    ) -> Result<(usize, T), ConnectionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let snapshot = self.snapshot.lock().await;
        let frames = Self::frames_for(&snapshot);
        if !frames.is_empty() {
            sink.send_batch(&frames).await?;
            debug!(count = frames.len(), "session state replayed to director");
        }
        let output = then().await;
        drop(snapshot);
        Ok((frames.len(), output))
    }

    /// Publishes every event from `events` until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<TelemetryEvent>, sink: &dyn FrameSink) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.publish(&event, sink).await {
                warn!(?event, "telemetry not delivered: {e}");
            }
        }
        info!("telemetry source closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
