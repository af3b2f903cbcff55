//! WidgetVisibilityEngine: turns declarative widget states into wire-ready
//! WIDGET_STATE frames.
//!
//! # State machine
//!
//! | `visible_type` | window sent on apply                        |
//! |----------------|---------------------------------------------|
//! | AUTO           | always (`MAX .. MIN`)                       |
//! | NEVER          | never (`MIN .. MIN + 1`)                    |
//! | MANUAL         | `[S, S+D)`, or `[S-D, S]` while rewinding   |
//! | NEXT_LAP       | never, until a matching lap start fires it  |
//!
//! A NEXT_LAP state fires when a lap starts for its `for_driver`, or, when
//! it targets the "(Auto)" driver, for the driver currently being viewed.
//! Firing sends one WIDGET_STATE with the window `[now, now + D)` per
//! addressed widget.  Nothing is remembered afterwards, so the plugin falls
//! back to the parked window on the next apply.
//!
//! # Locking
//!
//! The roster lock is taken only while resolving driver ids and always
//! released before any frame is written.  Widget names are expanded against
//! the registry outside the roster lock as well.

use std::sync::Arc;

use hud_core::domain::widget_registry::resolve_widget_names;
use hud_core::protocol::MAX_NAME_LEN;
use hud_core::{
    ConnectionError, DriverRoster, EffectiveWidgetState, Frame, FrameSink, SessionClock,
    VisibilityWindow, VisibleType, WidgetRegistry, WidgetState, AUTO_DRIVER_ID,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Error type for the visibility engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Writing the computed frames to the connection failed.
    #[error("failed to transmit widget states: {0}")]
    Transmit(#[from] ConnectionError),
}

/// A widget state with its driver references resolved against the roster.
struct Resolved<'a> {
    state: &'a WidgetState,
    window: VisibilityWindow,
    for_driver_id: i32,
    compare_driver_id: i32,
}

/// Computes and emits effective widget states.
pub struct WidgetVisibilityEngine {
    states: RwLock<Vec<WidgetState>>,
    roster: Arc<Mutex<DriverRoster>>,
    clock: Arc<SessionClock>,
    registry: Arc<dyn WidgetRegistry>,
}

impl WidgetVisibilityEngine {
    pub fn new(
        roster: Arc<Mutex<DriverRoster>>,
        clock: Arc<SessionClock>,
        registry: Arc<dyn WidgetRegistry>,
    ) -> Self {
        Self {
            states: RwLock::new(Vec::new()),
            roster,
            clock,
            registry,
        }
    }

    /// Replaces the declarative states.  Nothing is sent until the next
    /// [`apply_all`](Self::apply_all).
    pub async fn set_widget_states(&self, states: Vec<WidgetState>) {
        *self.states.write().await = states;
    }

    pub async fn widget_states(&self) -> Vec<WidgetState> {
        self.states.read().await.clone()
    }

    /// Computes the effective state of every entry, in order, with wildcard
    /// names expanded.  NEXT_LAP entries get the parked window.
    pub async fn effective_states(&self) -> Vec<EffectiveWidgetState> {
        let states = self.states.read().await;
        let decreasing = self.clock.is_time_decreasing();

        let resolved: Vec<Resolved<'_>> = {
            let roster = self.roster.lock().await;
            states
                .iter()
                .map(|state| Resolved {
                    state,
                    window: state.window(decreasing),
                    for_driver_id: roster.resolve(state.for_driver),
                    compare_driver_id: roster.resolve(state.compare_driver),
                })
                .collect()
        };

        self.expand(resolved)
    }

    /// Sends RESET_WIDGET_STATES followed by one WIDGET_STATE per effective
    /// state, as one uninterrupted batch.
    ///
    /// Returns the number of WIDGET_STATE frames sent.
    pub async fn apply_all(&self, sink: &dyn FrameSink) -> Result<usize, EngineError> {
        let effective = self.effective_states().await;
        let count = effective.len();

        let mut frames = Vec::with_capacity(count + 1);
        frames.push(Frame::ResetWidgetStates);
        frames.extend(effective.into_iter().map(Frame::WidgetState));
        sink.send_batch(&frames).await?;

        info!(count, "widget states applied");
        Ok(count)
    }

    /// Fires every NEXT_LAP state that matches a lap start by `driver_id`.
    ///
    /// Returns the number of WIDGET_STATE frames sent.
    pub async fn on_lap_started(
        &self,
        sink: &dyn FrameSink,
        driver_id: i32,
        lap: i32,
    ) -> Result<usize, EngineError> {
        let frames = self.triggered_by_lap(driver_id).await;
        for frame in &frames {
            sink.send(frame).await?;
        }
        if !frames.is_empty() {
            debug!(driver_id, lap, count = frames.len(), "next-lap widgets triggered");
        }
        Ok(frames.len())
    }

    async fn triggered_by_lap(&self, driver_id: i32) -> Vec<Frame> {
        let states = self.states.read().await;
        let now = self.clock.now();
        let viewed = self.clock.viewed_driver();

        let resolved: Vec<Resolved<'_>> = {
            let roster = self.roster.lock().await;
            states
                .iter()
                .filter(|state| state.visible_type == VisibleType::NextLap)
                .filter_map(|state| {
                    let target = roster.resolve(state.for_driver);
                    let fires = if target == AUTO_DRIVER_ID {
                        driver_id == viewed
                    } else {
                        driver_id == target
                    };
                    fires.then(|| Resolved {
                        state,
                        window: VisibilityWindow::starting_at(now, state.visible_duration),
                        for_driver_id: target,
                        compare_driver_id: roster.resolve(state.compare_driver),
                    })
                })
                .collect()
        };

        self.expand(resolved)
            .into_iter()
            .map(Frame::WidgetState)
            .collect()
    }

    /// Expands each resolved state into one effective state per addressed
    /// widget.  Wildcards matching nothing contribute nothing, and names too
    /// long for the wire are skipped.
    fn expand(&self, resolved: Vec<Resolved<'_>>) -> Vec<EffectiveWidgetState> {
        let mut out = Vec::with_capacity(resolved.len());
        for r in resolved {
            for name in resolve_widget_names(&r.state.widget_name, self.registry.as_ref()) {
                if name.len() > MAX_NAME_LEN {
                    warn!(
                        len = name.len(),
                        "widget name exceeds {MAX_NAME_LEN} bytes, state skipped"
                    );
                    continue;
                }
                out.push(EffectiveWidgetState::from_state(
                    r.state,
                    name,
                    r.window,
                    r.for_driver_id,
                    r.compare_driver_id,
                ));
            }
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::RecordingSink;
    use hud_core::{Driver, StaticWidgetRegistry, WidgetInstance};

    struct Fixture {
        engine: WidgetVisibilityEngine,
        roster: Arc<Mutex<DriverRoster>>,
        clock: Arc<SessionClock>,
        sink: RecordingSink,
    }

    fn fixture() -> Fixture {
        let roster = Arc::new(Mutex::new(DriverRoster::new()));
        let clock = Arc::new(SessionClock::new());
        let registry = Arc::new(StaticWidgetRegistry::new(vec![
            WidgetInstance::new("Speedo left", "hud.widgets.SpeedoWidget"),
            WidgetInstance::new("Speedo right", "hud.widgets.SpeedoWidget"),
            WidgetInstance::new("Tower", "hud.widgets.StandingsWidget"),
        ]));
        Fixture {
            engine: WidgetVisibilityEngine::new(Arc::clone(&roster), Arc::clone(&clock), registry),
            roster,
            clock,
            sink: RecordingSink::default(),
        }
    }

    fn widget_states(frames: &[Frame]) -> Vec<EffectiveWidgetState> {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::WidgetState(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    // ── apply_all ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_apply_all_sends_reset_then_one_state_per_entry() {
        // Arrange
        let f = fixture();
        f.engine
            .set_widget_states(vec![
                WidgetState::new("Tower"),
                WidgetState::new("Gap").with_type(VisibleType::Never),
            ])
            .await;

        // Act
        let count = f.engine.apply_all(&f.sink).await.unwrap();

        // Assert
        let batches = f.sink.batches();
        assert_eq!(count, 2);
        assert_eq!(batches.len(), 1, "apply must be a single batch");
        assert_eq!(batches[0][0], Frame::ResetWidgetStates);
        let states = widget_states(&batches[0]);
        assert_eq!(states[0].window(), VisibilityWindow::ALWAYS);
        assert_eq!(states[1].window(), VisibilityWindow::NEVER);
    }

    #[tokio::test]
    async fn test_apply_all_with_no_states_still_resets() {
        let f = fixture();
        assert_eq!(f.engine.apply_all(&f.sink).await.unwrap(), 0);
        assert_eq!(f.sink.batches(), vec![vec![Frame::ResetWidgetStates]]);
    }

    #[tokio::test]
    async fn test_manual_window_follows_clock_direction() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::Manual)
                .with_timing(60_000, 10_000)])
            .await;

        f.clock.tick(70_000);
        let forward = f.engine.effective_states().await;
        f.clock.tick(65_000);
        let backward = f.engine.effective_states().await;

        assert_eq!(
            forward[0].window(),
            VisibilityWindow { start: 60_000, end: 70_000 }
        );
        assert_eq!(
            backward[0].window(),
            VisibilityWindow { start: 50_000, end: 60_000 }
        );
    }

    #[tokio::test]
    async fn test_wildcard_expands_to_every_matching_instance() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("(speedowidget)").with_position(3, 4)])
            .await;

        let states = f.engine.effective_states().await;

        let names: Vec<&str> = states.iter().map(|s| s.widget_name.as_str()).collect();
        assert_eq!(names, vec!["Speedo left", "Speedo right"]);
        assert!(states.iter().all(|s| (s.pos_x, s.pos_y) == (3, 4)));
    }

    #[tokio::test]
    async fn test_wildcard_without_match_sends_nothing() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("(DeltaWidget)")])
            .await;

        assert_eq!(f.engine.apply_all(&f.sink).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_drivers_resolve_to_auto() {
        // Arrange
        let f = fixture();
        f.roster
            .lock()
            .await
            .full_replace(vec![Driver::new(3, "Alice")]);
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower").for_driver(3).compare_driver(99)])
            .await;

        // Act
        let states = f.engine.effective_states().await;

        // Assert
        assert_eq!(states[0].for_driver_id, 3);
        assert_eq!(states[0].compare_driver_id, AUTO_DRIVER_ID);
    }

    // ── NEXT_LAP ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_next_lap_is_parked_until_triggered() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::NextLap)
                .with_timing(0, 5_000)])
            .await;

        let states = f.engine.effective_states().await;

        assert_eq!(states[0].window(), VisibilityWindow::NEVER);
        assert!(!states[0].is_visible_at(f.clock.now()));
    }

    #[tokio::test]
    async fn test_next_lap_auto_fires_for_viewed_driver() {
        // Arrange
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::NextLap)
                .with_timing(0, 5_000)])
            .await;
        f.clock.set_viewed_driver(7);
        f.clock.tick(120_000);

        // Act
        let other = f.engine.on_lap_started(&f.sink, 8, 3).await.unwrap();
        let viewed = f.engine.on_lap_started(&f.sink, 7, 3).await.unwrap();

        // Assert
        assert_eq!(other, 0);
        assert_eq!(viewed, 1);
        let sent = widget_states(&f.sink.frames());
        assert_eq!(
            sent,
            vec![EffectiveWidgetState {
                widget_name: "Tower".to_string(),
                window_start: 120_000,
                window_end: 125_000,
                pos_x: 0,
                pos_y: 0,
                for_driver_id: AUTO_DRIVER_ID,
                compare_driver_id: AUTO_DRIVER_ID,
            }]
        );
    }

    #[tokio::test]
    async fn test_next_lap_specific_driver_ignores_viewed_driver() {
        let f = fixture();
        f.roster
            .lock()
            .await
            .full_replace(vec![Driver::new(3, "Alice"), Driver::new(7, "Bob")]);
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::NextLap)
                .with_timing(0, 1_000)
                .for_driver(3)])
            .await;
        f.clock.set_viewed_driver(7);

        assert_eq!(f.engine.on_lap_started(&f.sink, 7, 1).await.unwrap(), 0);
        assert_eq!(f.engine.on_lap_started(&f.sink, 3, 1).await.unwrap(), 1);
        assert_eq!(widget_states(&f.sink.frames())[0].for_driver_id, 3);
    }

    #[tokio::test]
    async fn test_lap_start_before_control_change_is_not_honoured() {
        // The viewed driver is whatever was last reported when the lap starts.
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::NextLap)
                .with_timing(0, 1_000)])
            .await;
        f.clock.set_viewed_driver(3);

        let fired = f.engine.on_lap_started(&f.sink, 7, 2).await.unwrap();
        f.clock.set_viewed_driver(7);

        assert_eq!(fired, 0);
    }

    #[tokio::test]
    async fn test_next_lap_wildcard_sends_one_frame_per_instance() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![
                WidgetState::new("(SpeedoWidget)")
                    .with_type(VisibleType::NextLap)
                    .with_timing(0, 2_000),
                WidgetState::new("Tower").with_type(VisibleType::Manual),
            ])
            .await;
        f.clock.set_viewed_driver(5);

        let sent = f.engine.on_lap_started(&f.sink, 5, 9).await.unwrap();

        assert_eq!(sent, 2);
        assert_eq!(f.sink.frames().len(), 2);
        assert!(f.sink.batches().is_empty(), "each trigger is sent as its own frame");
    }

    #[tokio::test]
    async fn test_next_lap_fires_again_on_every_matching_lap() {
        // Arrange
        let f = fixture();
        f.engine
            .set_widget_states(vec![WidgetState::new("Tower")
                .with_type(VisibleType::NextLap)
                .with_timing(0, 5_000)])
            .await;
        f.clock.set_viewed_driver(5);

        // Act
        f.clock.tick(10_000);
        let first = f.engine.on_lap_started(&f.sink, 5, 3).await.unwrap();
        f.clock.tick(70_000);
        let second = f.engine.on_lap_started(&f.sink, 5, 4).await.unwrap();

        // Assert
        assert_eq!((first, second), (1, 1));
        let states = widget_states(&f.sink.frames());
        assert_eq!(states.len(), 2);
        assert_eq!((states[0].window_start, states[0].window_end), (10_000, 15_000));
        assert_eq!((states[1].window_start, states[1].window_end), (70_000, 75_000));
    }

    #[tokio::test]
    async fn test_names_too_long_for_the_wire_are_skipped() {
        let f = fixture();
        f.engine
            .set_widget_states(vec![
                WidgetState::new("x".repeat(MAX_NAME_LEN + 1)),
                WidgetState::new("Tower"),
            ])
            .await;

        let count = f.engine.apply_all(&f.sink).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(widget_states(&f.sink.frames())[0].widget_name, "Tower");
    }

    #[tokio::test]
    async fn test_transmit_failure_is_reported() {
        let f = fixture();
        f.sink.fail_with_closed();

        let result = f.engine.apply_all(&f.sink).await;

        assert!(matches!(result, Err(EngineError::Transmit(ConnectionError::Closed))));
    }
}
