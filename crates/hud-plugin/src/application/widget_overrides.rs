//! Per-widget visibility overrides received from the director.
//!
//! RESET_WIDGET_STATES opens a batch: every override applied so far is
//! discarded before the WIDGET_STATE frames that follow are stored.  There is
//! no batch-end marker, so the store simply keeps whatever arrived last for
//! each widget name.
//!
//! Widgets without an override follow their own layout rules; the store
//! answers `None` for them.

use std::collections::HashMap;
use std::sync::Arc;

use hud_core::EffectiveWidgetState;
use tracing::debug;

/// The rendering side of the plugin.
#[cfg_attr(test, mockall::automock)]
pub trait WidgetHost: Send + Sync {
    /// Applies position and driver bindings of one override.
    fn apply_override(&self, state: &EffectiveWidgetState);

    /// Restores every widget to its layout defaults.
    fn clear_overrides(&self);
}

/// Overrides keyed by literal widget name.
pub struct OverrideStore {
    overrides: HashMap<String, EffectiveWidgetState>,
    host: Arc<dyn WidgetHost>,
}

impl OverrideStore {
    pub fn new(host: Arc<dyn WidgetHost>) -> Self {
        Self {
            overrides: HashMap::new(),
            host,
        }
    }

    /// Discards every override.
    pub fn reset(&mut self) {
        let dropped = self.overrides.len();
        self.overrides.clear();
        self.host.clear_overrides();
        debug!(dropped, "widget overrides reset");
    }

    /// Stores `state`, replacing any earlier override for the same widget.
    pub fn apply(&mut self, state: EffectiveWidgetState) {
        self.host.apply_override(&state);
        debug!(
            widget = %state.widget_name,
            start = state.window_start,
            end = state.window_end,
            "widget override applied"
        );
        self.overrides.insert(state.widget_name.clone(), state);
    }

    pub fn get(&self, widget_name: &str) -> Option<&EffectiveWidgetState> {
        self.overrides.get(widget_name)
    }

    /// Whether `widget_name` is visible at session `time`.
    ///
    /// `None` when the director never addressed the widget.
    pub fn is_visible(&self, widget_name: &str, time: i64) -> Option<bool> {
        self.get(widget_name).map(|state| state.is_visible_at(time))
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
