//! Server settings
//!
//! Loads bind address and port from a TOML settings file. A missing file is
//! not an error; defaults apply and command-line flags override everything.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default bind address
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Default listen port
pub const DEFAULT_PORT: u16 = 8765;

/// Errors that can occur during settings operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Address to bind to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_no_path() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.bind, DEFAULT_BIND);
        assert_eq!(settings.port, DEFAULT_PORT);
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "bind = \"0.0.0.0\"\nport = 9100").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.bind, "0.0.0.0");
        assert_eq!(settings.port, 9100);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "port = 9100\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.bind, DEFAULT_BIND);
        assert_eq!(settings.port, 9100);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "port = \"not a number\"\n").unwrap();

        let result = Settings::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
