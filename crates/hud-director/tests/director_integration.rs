//! End-to-end tests: the director's dispatcher and facade on one side of an
//! in-memory stream, a plain accepting connection standing in for the plugin
//! on the other.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hud_core::protocol::messages::LapStartedMessage;
use hud_core::{
    spawn_connection, AuthPolicy, CommandSpace, Connection, ConnectionError, ConnectionEvent,
    Credentials, Driver, DriverRoster, Frame, FrameHandler, FrameSink, Role, SessionClock,
    StaticWidgetRegistry, VisibilityWindow, VisibleType, WidgetInstance, WidgetState,
    AUTO_DRIVER_ID,
};
use hud_director::application::director::{Director, StaticConfiguration};
use hud_director::application::dispatch_events::{DirectorEvent, EventDispatcher};
use hud_director::application::visibility_engine::WidgetVisibilityEngine;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Recorder {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl FrameHandler for Recorder {
    async fn handle_frame(&self, _sink: &dyn FrameSink, frame: Frame) -> Result<(), ConnectionError> {
        let _ = self.tx.send(frame);
        Ok(())
    }
}

struct Rig {
    director: Director,
    director_events: mpsc::Receiver<ConnectionEvent>,
    dispatched: mpsc::Receiver<DirectorEvent>,
    plugin: Connection,
    plugin_frames: mpsc::UnboundedReceiver<Frame>,
}

async fn rig(states: Vec<WidgetState>, widgets: Vec<WidgetInstance>, in_driving: bool) -> Rig {
    let roster = Arc::new(Mutex::new(DriverRoster::new()));
    let clock = Arc::new(SessionClock::new());
    let engine = Arc::new(WidgetVisibilityEngine::new(
        Arc::clone(&roster),
        Arc::clone(&clock),
        Arc::new(StaticWidgetRegistry::new(widgets)),
    ));
    engine.set_widget_states(states).await;
    let (tx, dispatched) = mpsc::channel(64);
    let dispatcher = Arc::new(EventDispatcher::new(roster, clock, Arc::clone(&engine), tx));

    let (director_io, plugin_io) = tokio::io::duplex(64 * 1024);
    let (connection, director_events, _) = spawn_connection(
        director_io,
        CommandSpace::STANDALONE,
        Role::Connecting(Credentials::new(Some("pit wall"), true)),
        dispatcher,
    );

    let (ptx, plugin_frames) = mpsc::unbounded_channel();
    let (plugin, _plugin_events, _) = spawn_connection(
        plugin_io,
        CommandSpace::STANDALONE,
        Role::Accepting {
            policy: AuthPolicy::new(Some("pit wall"), true),
            in_driving: Arc::new(AtomicBool::new(in_driving)),
        },
        Arc::new(Recorder { tx: ptx }),
    );

    let director = Director::new(
        engine,
        Arc::new(StaticConfiguration(vec![0xCA, 0xFE])),
        Arc::new(connection),
    );

    Rig {
        director,
        director_events,
        dispatched,
        plugin,
        plugin_frames,
    }
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
    timeout(WAIT, frames.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("frame channel closed")
}

async fn established(rig: &mut Rig) -> ConnectionEvent {
    let event = timeout(WAIT, rig.director_events.recv())
        .await
        .expect("timed out waiting for handshake")
        .expect("event channel closed");
    assert!(matches!(event, ConnectionEvent::Established { .. }));
    event
}

/// Waits until the dispatcher has processed frames up to a session time tick.
async fn wait_for_time(rig: &mut Rig, time: i64) {
    loop {
        let event = timeout(WAIT, rig.dispatched.recv())
            .await
            .expect("timed out waiting for dispatcher")
            .expect("dispatcher channel closed");
        if event == DirectorEvent::Session(Frame::SessionTime(time)) {
            return;
        }
    }
}

#[tokio::test]
async fn test_established_in_driving_pushes_configuration_then_states() {
    // Arrange
    let mut rig = rig(
        vec![
            WidgetState::new("Tower").with_type(VisibleType::Never),
            WidgetState::new("Speedo"),
        ],
        vec![],
        true,
    )
    .await;

    // Act
    let event = established(&mut rig).await;
    rig.director.on_connection_event(&event).await.unwrap();

    // Assert
    assert_eq!(
        next_frame(&mut rig.plugin_frames).await,
        Frame::WidgetsConfiguration(vec![0xCA, 0xFE])
    );
    assert_eq!(next_frame(&mut rig.plugin_frames).await, Frame::ResetWidgetStates);
    let Frame::WidgetState(tower) = next_frame(&mut rig.plugin_frames).await else {
        panic!("expected WIDGET_STATE");
    };
    assert_eq!(tower.widget_name, "Tower");
    assert_eq!(tower.window(), VisibilityWindow::NEVER);
    let Frame::WidgetState(speedo) = next_frame(&mut rig.plugin_frames).await else {
        panic!("expected WIDGET_STATE");
    };
    assert_eq!(speedo.widget_name, "Speedo");
    assert!(speedo.window().is_always());
}

#[tokio::test]
async fn test_established_outside_driving_waits_for_realtime_entered() {
    // Arrange
    let mut rig = rig(vec![WidgetState::new("Speedo")], vec![], false).await;
    let event = established(&mut rig).await;

    // Act: nothing is pushed yet
    rig.director.on_connection_event(&event).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.plugin_frames.try_recv().is_err());

    rig.plugin.send(&Frame::RealtimeEntered).await.unwrap();
    let dispatched = timeout(WAIT, rig.dispatched.recv()).await.unwrap().unwrap();
    rig.director.on_director_event(&dispatched).await.unwrap();

    // Assert
    assert!(matches!(
        next_frame(&mut rig.plugin_frames).await,
        Frame::WidgetsConfiguration(_)
    ));
    assert_eq!(next_frame(&mut rig.plugin_frames).await, Frame::ResetWidgetStates);
}

#[tokio::test]
async fn test_next_lap_widget_fires_for_viewed_driver_lap() {
    // Arrange
    let mut rig = rig(
        vec![WidgetState::new("(SpeedoWidget)")
            .with_type(VisibleType::NextLap)
            .with_timing(0, 5000)],
        vec![WidgetInstance::new("Speedo left", "hud.widgets.SpeedoWidget")],
        true,
    )
    .await;
    established(&mut rig).await;

    // Act
    rig.plugin
        .send_batch(&[
            Frame::DriversList(vec![Driver::new(7, "Alice"), Driver::new(9, "Bob")]),
            Frame::VehicleControlChanged { driver_id: 7 },
            Frame::SessionTime(120_000),
            Frame::LapStarted(LapStartedMessage {
                driver_id: 9,
                lap: 3,
            }),
            Frame::LapStarted(LapStartedMessage {
                driver_id: 7,
                lap: 4,
            }),
        ])
        .await
        .unwrap();

    // Assert: only the viewed driver's lap fires
    let Frame::WidgetState(state) = next_frame(&mut rig.plugin_frames).await else {
        panic!("expected WIDGET_STATE");
    };
    assert_eq!(state.widget_name, "Speedo left");
    assert_eq!(state.window_start, 120_000);
    assert_eq!(state.window_end, 125_000);
    assert_eq!(state.for_driver_id, AUTO_DRIVER_ID);
    assert_eq!(state.compare_driver_id, AUTO_DRIVER_ID);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.plugin_frames.try_recv().is_err());
}

#[tokio::test]
async fn test_roster_updates_reach_the_director() {
    // Arrange
    let mut rig = rig(vec![], vec![], true).await;
    established(&mut rig).await;

    // Act
    rig.plugin
        .send_batch(&[
            Frame::DriversList(vec![Driver::new(7, "Alice"), Driver::new(9, "Bob")]),
            Frame::DriversPositions(vec![9, 7]),
            Frame::SessionTime(1),
        ])
        .await
        .unwrap();

    // Assert
    let first = timeout(WAIT, rig.dispatched.recv()).await.unwrap().unwrap();
    let DirectorEvent::DriversChanged { drivers } = first else {
        panic!("expected DriversChanged, got {first:?}");
    };
    assert_eq!(drivers.len(), 3);
    let second = timeout(WAIT, rig.dispatched.recv()).await.unwrap().unwrap();
    let DirectorEvent::PositionsChanged { drivers } = second else {
        panic!("expected PositionsChanged, got {second:?}");
    };
    let ids: Vec<i32> = drivers.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![AUTO_DRIVER_ID, 9, 7]);
    wait_for_time(&mut rig, 1).await;
}
