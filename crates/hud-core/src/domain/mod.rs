//! Domain entities for the HUD director.
//!
//! This module contains pure state with no I/O: the driver roster, the
//! session clock, declarative widget states with their visibility windows,
//! and the widget registry seam used for wildcard expansion.
//!
//! # Why a separate domain layer? (for beginners)
//!
//! Both the director and the plugin need the same rules for "is this widget
//! visible at time t" and "which driver does id 7 mean".  Keeping those rules
//! here, away from sockets and tasks, lets both ends share them and lets the
//! tests exercise them without any network setup.

/// Ordered driver list with the "(Auto)" sentinel.
pub mod roster;

/// Session time, rewind detection and the viewed driver.
pub mod session_clock;

/// Live widget instances and `"(TypeName)"` wildcard expansion.
pub mod widget_registry;

/// Widget states, visibility windows and wire-ready effective states.
pub mod widget_state;
