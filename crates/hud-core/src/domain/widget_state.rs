//! Declarative widget states and the visibility windows derived from them.
//!
//! # Windows (for beginners)
//!
//! Every widget override sent to the plugin carries a pair of session-clock
//! ticks `(start, end)`.  The plugin shows the widget while the clock is
//! inside that window.  Three special shapes exist:
//!
//! - **Always** – `start > end` (`i64::MAX .. i64::MIN`).  Any consumer
//!   testing membership treats an inverted pair as "always visible".
//! - **Never** – `i64::MIN .. i64::MIN + 1`.  The session clock never reaches
//!   `i64::MIN`, so the one-tick window is unreachable.
//! - **Manual** – a real interval.  When the clock runs backwards (replay
//!   rewind) the interval is mirrored so it still covers the configured
//!   duration in the direction the viewer is moving.

use serde::{Deserialize, Serialize};

use crate::domain::roster::AUTO_DRIVER_ID;

/// How a widget's visibility is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibleType {
    /// Always visible.
    #[default]
    Auto,
    /// Never visible.
    Never,
    /// Visible for `visible_duration` starting at `visible_start`.
    Manual,
    /// Visible for `visible_duration` from the next matching lap start.
    NextLap,
}

/// One editor-owned visibility rule.
///
/// `widget_name` is either a literal instance name or a wildcard of the form
/// `"(TypeName)"`, see [`crate::domain::widget_registry::WidgetName`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetState {
    pub widget_name: String,
    #[serde(default)]
    pub visible_type: VisibleType,
    /// Session time in milliseconds (MANUAL only).
    #[serde(default)]
    pub visible_start: i64,
    /// Milliseconds (MANUAL and NEXT_LAP).
    #[serde(default)]
    pub visible_duration: i64,
    #[serde(default)]
    pub pos_x: i16,
    #[serde(default)]
    pub pos_y: i16,
    /// Driver the widget shows data for; `None` means the viewed driver.
    #[serde(default)]
    pub for_driver: Option<i32>,
    /// Driver the widget compares against; `None` means unset.
    #[serde(default)]
    pub compare_driver: Option<i32>,
}

impl WidgetState {
    /// An AUTO state at the origin with no driver bindings.
    pub fn new(widget_name: impl Into<String>) -> Self {
        Self {
            widget_name: widget_name.into(),
            visible_type: VisibleType::Auto,
            visible_start: 0,
            visible_duration: 0,
            pos_x: 0,
            pos_y: 0,
            for_driver: None,
            compare_driver: None,
        }
    }

    pub fn with_type(mut self, visible_type: VisibleType) -> Self {
        self.visible_type = visible_type;
        self
    }

    pub fn with_timing(mut self, start: i64, duration: i64) -> Self {
        self.visible_start = start;
        self.visible_duration = duration;
        self
    }

    pub fn with_position(mut self, x: i16, y: i16) -> Self {
        self.pos_x = x;
        self.pos_y = y;
        self
    }

    pub fn for_driver(mut self, id: i32) -> Self {
        self.for_driver = Some(id);
        self
    }

    pub fn compare_driver(mut self, id: i32) -> Self {
        self.compare_driver = Some(id);
        self
    }

    /// The window this state gets at apply time.
    ///
    /// NEXT_LAP states are parked on [`VisibilityWindow::NEVER`] until a lap
    /// start triggers them.
    pub fn window(&self, time_decreasing: bool) -> VisibilityWindow {
        match self.visible_type {
            VisibleType::Auto => VisibilityWindow::ALWAYS,
            VisibleType::Never | VisibleType::NextLap => VisibilityWindow::NEVER,
            VisibleType::Manual => VisibilityWindow::manual(
                self.visible_start,
                self.visible_duration,
                time_decreasing,
            ),
        }
    }
}

// ── Visibility window ─────────────────────────────────────────────────────────

/// A `(start, end)` pair of session-clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisibilityWindow {
    pub start: i64,
    pub end: i64,
}

impl VisibilityWindow {
    /// Inverted pair: every tick is inside.
    pub const ALWAYS: Self = Self {
        start: i64::MAX,
        end: i64::MIN,
    };

    /// One tick at the unreachable minimum.
    pub const NEVER: Self = Self {
        start: i64::MIN,
        end: i64::MIN + 1,
    };

    /// Direction-sensitive MANUAL window.
    ///
    /// Forward: `[start, start + duration)`.  Backward: `[start - duration, start]`.
    pub fn manual(start: i64, duration: i64, time_decreasing: bool) -> Self {
        if time_decreasing {
            Self {
                start: start.saturating_sub(duration),
                end: start,
            }
        } else {
            Self {
                start,
                end: start.saturating_add(duration),
            }
        }
    }

    /// `[now, now + duration)`, used when a NEXT_LAP state fires.
    pub fn starting_at(now: i64, duration: i64) -> Self {
        Self {
            start: now,
            end: now.saturating_add(duration),
        }
    }

    /// `true` for the inverted "always" shape.
    pub fn is_always(&self) -> bool {
        self.start > self.end
    }

    /// Membership test shared by both ends of the connection.
    ///
    /// `i64::MIN` is reserved and never counts as inside a non-inverted
    /// window.
    pub fn contains(&self, time: i64) -> bool {
        if self.is_always() {
            return true;
        }
        time != i64::MIN && self.start <= time && time < self.end
    }
}

// ── Effective state ───────────────────────────────────────────────────────────

/// Wire-ready override for one concrete widget instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveWidgetState {
    pub widget_name: String,
    pub window_start: i64,
    pub window_end: i64,
    pub pos_x: i16,
    pub pos_y: i16,
    pub for_driver_id: i32,
    pub compare_driver_id: i32,
}

impl EffectiveWidgetState {
    /// Builds the effective state of `state` for `widget_name`.
    ///
    /// Driver ids must already be resolved against the roster.
    pub fn from_state(
        state: &WidgetState,
        widget_name: impl Into<String>,
        window: VisibilityWindow,
        for_driver_id: i32,
        compare_driver_id: i32,
    ) -> Self {
        Self {
            widget_name: widget_name.into(),
            window_start: window.start,
            window_end: window.end,
            pos_x: state.pos_x,
            pos_y: state.pos_y,
            for_driver_id,
            compare_driver_id,
        }
    }

    /// An AUTO override with no driver bindings.
    pub fn always(widget_name: impl Into<String>) -> Self {
        Self {
            widget_name: widget_name.into(),
            window_start: VisibilityWindow::ALWAYS.start,
            window_end: VisibilityWindow::ALWAYS.end,
            pos_x: 0,
            pos_y: 0,
            for_driver_id: AUTO_DRIVER_ID,
            compare_driver_id: AUTO_DRIVER_ID,
        }
    }

    pub fn window(&self) -> VisibilityWindow {
        VisibilityWindow {
            start: self.window_start,
            end: self.window_end,
        }
    }

    pub fn is_visible_at(&self, time: i64) -> bool {
        self.window().contains(time)
    }
}
