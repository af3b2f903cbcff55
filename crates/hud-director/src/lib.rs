//! hud-director library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the director do? (for beginners)
//!
//! The *director* runs next to the broadcast or race-control tooling and
//! steers the HUD overlay that the *plugin* draws inside the simulator.
//! It never renders anything itself; it only tells the plugin which widget
//! should be visible, where, and for which driver.
//!
//! The director application:
//!
//! 1. Connects to the plugin over TCP and completes the identity/password
//!    handshake.
//! 2. Keeps a roster of drivers and the session clock up to date from the
//!    plugin's notifications.
//! 3. Sends the widget layout (an opaque blob) followed by every widget's
//!    effective visibility state whenever the plugin enters a driving
//!    context.
//! 4. Re-evaluates NEXT_LAP widgets each time the viewed driver starts a lap.

/// Application layer: visibility engine, event dispatcher and director facade.
pub mod application;

/// Infrastructure layer: TCP connect and TOML configuration.
pub mod infrastructure;
