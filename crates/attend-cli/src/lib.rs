//! Attend CLI - command-line front end for the attendance client
//!
//! - [`config`]: one TOML file for API, stream, review and session settings
//! - [`render`]: plain-text review views
//! - [`telemetry`]: log subscriber setup

#![warn(unreachable_pub)]

pub mod config;
pub mod render;
pub mod telemetry;

pub use config::{ClientConfig, LoadError, CONFIG_ENV};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
