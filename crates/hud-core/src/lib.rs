//! # hud-core
//!
//! Shared library for the HUD race director: the director protocol codec,
//! the connection lifecycle with its handshake, and the domain state both
//! ends agree on (driver roster, session clock, widget visibility windows).
//!
//! Used by both `hud-director` (the connecting side) and `hud-plugin` (the
//! accepting side running inside the simulator).
//!
//! # Architecture overview (for beginners)
//!
//! A race director watches a live or replayed session and decides which HUD
//! widgets the viewer sees, for which driver, and when.  The plugin inside
//! the simulator renders the widgets and streams session events back.
//!
//! - **`protocol`** – How bytes travel over the wire.  Every frame is a
//!   command code followed by fields whose shape the code implies.
//!
//! - **`connection`** – One read-loop task per stream, a write lock so frames
//!   from different tasks never interleave, and the identity / password
//!   handshake that gates everything else.
//!
//! - **`domain`** – Pure state: the ordered driver list, the session clock
//!   with its rewind flag, and the visibility windows that decide whether a
//!   widget is shown at a given session time.

pub mod connection;
pub mod domain;
pub mod protocol;

pub use connection::{
    spawn_connection, CommandWriter, Connection, ConnectionError, ConnectionEvent, FrameHandler,
    FrameReader, FrameSink, Role,
};
pub use domain::roster::{Driver, DriverRoster, AUTO_DRIVER_ID};
pub use domain::session_clock::SessionClock;
pub use domain::widget_registry::{
    resolve_widget_names, StaticWidgetRegistry, WidgetInstance, WidgetName, WidgetRegistry,
};
pub use domain::widget_state::{EffectiveWidgetState, VisibilityWindow, VisibleType, WidgetState};
pub use protocol::auth::{AuthPolicy, Credentials};
pub use protocol::codec::{decode_frame, encode_frame, FrameError};
pub use protocol::messages::{CodeWidth, Command, CommandSpace, Frame};
