//! # Configuration Management
//!
//! Application configuration is assembled from several sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables with the APP_ prefix
//! - A handful of unprefixed variables commonly set by deployment platforms
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST`, `PORT`, `DATABASE_URL`, `AUDIO_DIR`, `CORS_ORIGINS`
//! 2. `APP_`-prefixed variables, sections separated by `__`
//!    (e.g. `APP_SERVER__PORT`, `APP_DATABASE__MAX_CONNECTIONS`)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Configuration is read once at startup and never changes afterwards. In
//! particular the audio base directory is fixed for the life of the process.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
///
/// Split into logical groups so each part of the server only needs to look
/// at the section it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub audio: AudioConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Word store connection settings.
///
/// ## Fields:
/// - `url`: SQLx connection string, e.g. `sqlite://data/speaking_buddy.db`
/// - `max_connections`: Upper bound on pooled connections
/// - `acquire_timeout_secs`: How long a request waits for a free connection
///   before failing with an internal error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Reference pronunciation audio settings.
///
/// `dir` is the trusted base directory. Every stored filename is resolved
/// against it and must stay strictly inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub dir: String,
}

/// Cross-origin settings for the web frontend.
///
/// A single `"*"` entry allows any origin (without credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "sqlite://data/speaking_buddy.db".to_string(),
                max_connections: 5,
                acquire_timeout_secs: 5,
            },
            audio: AudioConfig {
                dir: "data/audio".to_string(),
            },
            cors: CorsConfig {
                // Vite and CRA dev servers
                allowed_origins: vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                ],
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_AUDIO__DIR=/srv/audio`: Override the audio base directory
    /// - `PORT=3000`: Special case for deployment platforms
    /// - `CORS_ORIGINS=https://a.example,https://b.example`: Comma separated list
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms tend to set these without any prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            settings = settings.set_override("database.url", url)?;
        }
        if let Ok(dir) = env::var("AUDIO_DIR") {
            settings = settings.set_override("audio.dir", dir)?;
        }

        let mut config: AppConfig = settings
            .build()?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors.allowed_origins = parse_origin_list(&origins);
        }

        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching these at startup gives a clear message instead of a server
    /// that binds but fails every request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow::anyhow!("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Database max connections must be greater than 0"));
        }

        if self.database.acquire_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Database acquire timeout must be greater than 0"));
        }

        if self.audio.dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Audio directory cannot be empty"));
        }

        Ok(())
    }

    /// Whether CORS should accept any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
