//! hud-plugin library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the plugin do? (for beginners)
//!
//! The *plugin* lives inside the simulator and draws the HUD.  It listens
//! for a race director, checks its credentials, then:
//!
//! 1. Streams session telemetry (roster, positions, laps, clock) to the
//!    director.
//! 2. Loads the widget layout the director sends.
//! 3. Keeps the director's per-widget visibility overrides and answers
//!    "should this widget be drawn now?" for the renderer.

/// Application layer: override store, command dispatcher, telemetry relay.
pub mod application;

/// Infrastructure layer: TCP listener and TOML configuration.
pub mod infrastructure;
