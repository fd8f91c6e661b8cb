//! Server configuration
//!
//! Runtime configuration is read from environment variables with sensible
//! defaults, so the server runs out of the box and containers can override
//! the listen address without a config file.

use std::env;

/// Listen configuration for the server binary
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
}

impl Config {
    /// Reads configuration from `HOST` and `PORT`, with defaults
    ///
    /// # Panics
    ///
    /// Panics if `PORT` is set but not a valid port number; a typo here
    /// should stop the server at startup rather than bind somewhere
    /// unexpected.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
