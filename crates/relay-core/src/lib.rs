//! Core types, content resolution, errors, and config for relay.

pub mod config;
pub mod content;
pub mod error;
pub mod protocol;
pub mod types;
