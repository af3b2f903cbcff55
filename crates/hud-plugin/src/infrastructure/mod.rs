//! Infrastructure layer for the plugin.
//!
//! Contains the OS-facing adapters: the TCP listener and the configuration
//! file.
//!
//! **Dependency rule**: this layer may depend on `application` and `hud_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
