//! # Settings
//!
//! Layered configuration for the vibehunt binary. Later layers win:
//!
//! 1. built-in defaults
//! 2. `config/vibehunt.toml` (optional)
//! 3. `VIBEHUNT_*` environment variables, with `__` between nested keys
//!    (e.g. `VIBEHUNT_SERVER__PORT=9000`, `VIBEHUNT_DATABASE__BACKEND=memory`)
//!
//! A `.env` file in the working directory is read before the environment layer.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "VIBEHUNT";
pub const DEFAULT_CONFIG_FILE: &str = "config/vibehunt";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub comments: CommentSettings,
    pub maintenance: MaintenanceSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS; `*` allows any
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: Backend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSettings {
    pub max_depth: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceSettings {
    /// Assign slugs to legacy projects at startup
    pub backfill_slugs: bool,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.allowed_origin", "*")?
        .set_default("database.backend", "sqlite")?
        .set_default("database.url", "sqlite:vibehunt.db")?
        .set_default("database.max_connections", 5)?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?
        .set_default("comments.max_depth", 5)?
        .set_default("maintenance.backfill_slugs", true)?)
}

impl Settings {
    /// Reads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let config = defaults()?
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::finish(config)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = defaults()?
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.comments.max_depth == 0 {
            return Err(SettingsError::Invalid {
                key: "comments.max_depth",
                reason: "replies need a depth of at least 1".into(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid {
                key: "database.max_connections",
                reason: "must be positive".into(),
            });
        }
        if self.database.backend == Backend::Sqlite && self.database.url.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "database.url",
                reason: "required for the sqlite backend".into(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.bind_addr(), ("127.0.0.1".to_string(), 8080));
        assert_eq!(settings.database.backend, Backend::Sqlite);
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.comments.max_depth, 5);
        assert!(settings.maintenance.backfill_slugs);
        assert!(!settings.log.json);
    }

    #[test]
    fn toml_overrides_defaults() {
        let settings = Settings::from_toml(
            r#"
            [server]
            port = 9000

            [database]
            backend = "memory"

            [comments]
            max_depth = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.database.backend, Backend::Memory);
        assert_eq!(settings.comments.max_depth, 3);
    }

    #[test]
    fn rejects_zero_depth() {
        let err = Settings::from_toml("[comments]\nmax_depth = 0").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "comments.max_depth", .. }));
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = Settings::from_toml("[database]\nbackend = \"postgres\"").unwrap_err();
        assert!(matches!(err, SettingsError::Load(_)));
    }
}
