//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub log_json: bool,

    /// Single-operator test mode: lowers the minimum player count to 1
    pub dev_mode: bool,

    /// Allowed client origins for CORS (empty = any origin)
    pub client_origins: Vec<String>,
    /// Directory holding the built client bundle, served as a fallback
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        let dev_mode = match lookup("DEV_MODE") {
            None => false,
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag("DEV_MODE"))?,
        };

        let log_json = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => false,
            Some("json") => true,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json,

            dev_mode,

            client_origins,
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid boolean in environment variable: {0}")]
    InvalidFlag(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Unknown LOG_FORMAT {0:?} (expected text or json)")]
    InvalidLogFormat(String),
}
