//! Network infrastructure for the plugin.
//!
//! # Sub-modules
//!
//! - **`connection_manager`** – Listens for the director, runs the accepting
//!   handshake and keeps exactly one established director connection.  A
//!   newly established director replaces the previous one.

pub mod connection_manager;
