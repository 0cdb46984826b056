//! Configuration module
//!
//! Loads server settings from an optional TOML file.

mod settings;

pub use settings::*;
