//! Application layer use cases for the director.
//!
//! # What use cases does the director have?
//!
//! - **`visibility_engine`** – Turns the declarative widget states into
//!   effective, time-windowed WIDGET_STATE frames, both as a full batch and
//!   when a lap start fires a NEXT_LAP state.
//!
//! - **`dispatch_events`** – Routes every frame the plugin sends to the
//!   roster, the session clock, the visibility engine, or out to the hosting
//!   application as a [`dispatch_events::DirectorEvent`].
//!
//! - **`director`** – The narrow entry point the hosting application or UI
//!   calls: send the configuration, apply all widget states, and react to
//!   connection and session events.

pub mod director;
pub mod dispatch_events;
pub mod visibility_engine;
