//! Persistent storage for the director.

pub mod config;
