//! Integration tests for the plugin listener over real TCP sockets.
//!
//! A bare `hud_core` connecting connection stands in for the director.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hud_core::{
    spawn_connection, AuthPolicy, CommandSpace, Connection, ConnectionError, ConnectionEvent,
    Credentials, Driver, EffectiveWidgetState, Frame, FrameHandler, FrameSink, Role,
};
use hud_plugin::application::dispatch_commands::{CommandDispatcher, ConfigurationSink};
use hud_plugin::application::telemetry_relay::{TelemetryEvent, TelemetryRelay};
use hud_plugin::application::widget_overrides::{OverrideStore, WidgetHost};
use hud_plugin::infrastructure::network::connection_manager::{
    ActiveDirector, ConnectionManager, ListenerConfig,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const PASSWORD: &str = "pit wall";

struct NullHost;

impl WidgetHost for NullHost {
    fn apply_override(&self, _: &EffectiveWidgetState) {}
    fn clear_overrides(&self) {}
}

struct NullLayout;

impl ConfigurationSink for NullLayout {
    fn load_configuration(&self, _: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

struct Recorder {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl FrameHandler for Recorder {
    async fn handle_frame(&self, _: &dyn FrameSink, frame: Frame) -> Result<(), ConnectionError> {
        let _ = self.tx.send(frame);
        Ok(())
    }
}

struct Plugin {
    addr: std::net::SocketAddr,
    relay: Arc<TelemetryRelay>,
    overrides: Arc<Mutex<OverrideStore>>,
    active: Arc<ActiveDirector>,
    running: Arc<AtomicBool>,
}

async fn start_plugin(relay: TelemetryRelay) -> Plugin {
    let overrides = Arc::new(Mutex::new(OverrideStore::new(Arc::new(NullHost))));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&overrides),
        Arc::new(NullLayout),
    ));
    let relay = Arc::new(relay);
    let manager = ConnectionManager::bind(
        ListenerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            space: CommandSpace::STANDALONE,
            policy: AuthPolicy::new(Some(PASSWORD), true),
        },
        Arc::clone(&relay),
        dispatcher,
    )
    .await
    .expect("bind");

    let plugin = Plugin {
        addr: manager.local_addr().unwrap(),
        relay,
        overrides,
        active: manager.active(),
        running: Arc::new(AtomicBool::new(true)),
    };
    tokio::spawn(manager.run(Arc::clone(&plugin.running)));
    plugin
}

struct Director {
    conn: Connection,
    events: mpsc::Receiver<ConnectionEvent>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

async fn connect_director(plugin: &Plugin, password: &str) -> Director {
    let stream = TcpStream::connect(plugin.addr).await.expect("connect");
    let (tx, frames) = mpsc::unbounded_channel();
    let (conn, events, _) = spawn_connection(
        stream,
        CommandSpace::STANDALONE,
        Role::Connecting(Credentials::new(Some(password), true)),
        Arc::new(Recorder { tx }),
    );
    Director {
        conn,
        events,
        frames,
    }
}

async fn next_event(director: &mut Director) -> ConnectionEvent {
    timeout(WAIT, director.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn next_frame(director: &mut Director) -> Frame {
    timeout(WAIT, director.frames.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("frame channel closed")
}

/// Polls until the plugin has promoted a director.
async fn wait_for_active(plugin: &Plugin) {
    for _ in 0..100 {
        if plugin.active.is_connected().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("director never became active");
}

#[tokio::test]
async fn test_new_director_receives_session_replay() {
    // Arrange
    let relay = TelemetryRelay::new();
    relay
        .observe(&TelemetryEvent::DriversList(vec![
            Driver::new(7, "Alice"),
            Driver::new(9, "Bob"),
        ]))
        .await;
    relay.observe(&TelemetryEvent::SessionTime(120_000)).await;
    relay.observe(&TelemetryEvent::RealtimeEntered).await;
    let plugin = start_plugin(relay).await;

    // Act
    let mut director = connect_director(&plugin, PASSWORD).await;

    // Assert
    assert_eq!(
        next_event(&mut director).await,
        ConnectionEvent::Established { in_driving: true }
    );
    assert_eq!(
        next_frame(&mut director).await,
        Frame::DriversList(vec![Driver::new(7, "Alice"), Driver::new(9, "Bob")])
    );
    assert_eq!(next_frame(&mut director).await, Frame::SessionTime(120_000));
    plugin.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_session_time_never_goes_backwards_while_director_connects() {
    // Arrange
    let relay = TelemetryRelay::new();
    relay.observe(&TelemetryEvent::SessionTime(1_000)).await;
    let plugin = start_plugin(relay).await;
    let pump = {
        let relay = Arc::clone(&plugin.relay);
        let active = Arc::clone(&plugin.active);
        tokio::spawn(async move {
            for tick in 1..=400 {
                let _ = relay
                    .publish(&TelemetryEvent::SessionTime(1_000 + tick), active.as_ref())
                    .await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    // Act
    let mut director = connect_director(&plugin, PASSWORD).await;
    next_event(&mut director).await;
    let mut times = Vec::new();
    for _ in 0..20 {
        if let Frame::SessionTime(time) = next_frame(&mut director).await {
            times.push(time);
        }
    }
    pump.abort();

    // Assert
    assert!(times.windows(2).all(|pair| pair[0] < pair[1]), "{times:?}");
    plugin.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_widget_states_from_director_reach_override_store() {
    // Arrange
    let plugin = start_plugin(TelemetryRelay::new()).await;
    let mut director = connect_director(&plugin, PASSWORD).await;
    next_event(&mut director).await;

    // Act
    director
        .conn
        .send_batch(&[
            Frame::ResetWidgetStates,
            Frame::WidgetState(EffectiveWidgetState {
                window_start: 120_000,
                window_end: 125_000,
                ..EffectiveWidgetState::always("Speedo left")
            }),
        ])
        .await
        .unwrap();

    // Assert
    let mut visible = None;
    for _ in 0..100 {
        visible = plugin.overrides.lock().await.is_visible("Speedo left", 124_999);
        if visible.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(visible, Some(true));
    plugin.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_telemetry_is_published_to_active_director() {
    // Arrange
    let plugin = start_plugin(TelemetryRelay::new()).await;
    let mut director = connect_director(&plugin, PASSWORD).await;
    next_event(&mut director).await;
    wait_for_active(&plugin).await;

    // Act
    let sent = plugin
        .relay
        .publish(
            &TelemetryEvent::LapStarted {
                driver_id: 7,
                lap: 3,
            },
            plugin.active.as_ref(),
        )
        .await
        .unwrap();

    // Assert
    assert!(sent);
    assert!(matches!(next_frame(&mut director).await, Frame::LapStarted(_)));
    plugin.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_second_director_replaces_first() {
    // Arrange
    let plugin = start_plugin(TelemetryRelay::new()).await;
    let mut first = connect_director(&plugin, PASSWORD).await;
    next_event(&mut first).await;
    wait_for_active(&plugin).await;

    // Act
    let mut second = connect_director(&plugin, PASSWORD).await;
    assert!(matches!(
        next_event(&mut second).await,
        ConnectionEvent::Established { .. }
    ));

    // Assert: the first director's stream is closed by the plugin
    let mut closed = false;
    while let Ok(Some(event)) = timeout(WAIT, first.events.recv()).await {
        if event == ConnectionEvent::Closed {
            closed = true;
            break;
        }
    }
    assert!(closed);
    plugin.running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_refused_director_does_not_displace_active_one() {
    // Arrange
    let plugin = start_plugin(TelemetryRelay::new()).await;
    let mut good = connect_director(&plugin, PASSWORD).await;
    next_event(&mut good).await;
    wait_for_active(&plugin).await;

    // Act
    let mut bad = connect_director(&plugin, "guess").await;

    // Assert
    assert!(matches!(
        next_event(&mut bad).await,
        ConnectionEvent::Refused { .. }
    ));
    let sent = plugin
        .relay
        .publish(&TelemetryEvent::GarageEntered, plugin.active.as_ref())
        .await
        .unwrap();
    assert!(sent);
    assert_eq!(next_frame(&mut good).await, Frame::GarageEntered);
    plugin.running.store(false, Ordering::Relaxed);
}
