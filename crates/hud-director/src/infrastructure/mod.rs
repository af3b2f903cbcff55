//! Infrastructure layer for the director.
//!
//! **Dependency rule**: this layer may depend on `application` and `hud_core`,
//! but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – Opens the TCP connection to the plugin and starts the
//!   shared read loop with the director's credentials.
//!
//! - **`storage`** – TOML configuration file: connection target, password,
//!   logging level, widget instances and the initial widget states.

pub mod network;
pub mod storage;
