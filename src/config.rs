use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkspaceConfig {
    /// Opened at startup when set, as if `workspace.select` had been sent.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub file_name: String,
    /// How long a connection waits on a lock held by another writer.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashScheme {
    Argon2,
    LegacySha256,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub hash_scheme: HashScheme,
    pub upgrade_legacy_hashes: bool,
    pub default_admin_username: String,
    pub default_admin_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Self::defaults()?
            // Load from config/registrard.toml
            .add_source(File::with_name("config/registrard").required(false))
            // Override from environment (e.g., REGISTRARD__AUTH__HASH_SCHEME)
            .add_source(Environment::with_prefix("REGISTRARD").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.file_name", "registrar.sqlite3")?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("auth.hash_scheme", "argon2")?
            .set_default("auth.upgrade_legacy_hashes", true)?
            .set_default("auth.default_admin_username", "admin")?
            .set_default("auth.default_admin_secret", "admin123")?
            .set_default("log.level", "info")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            workspace: WorkspaceConfig::default(),
            database: DatabaseConfig {
                file_name: "registrar.sqlite3".to_string(),
                busy_timeout_ms: 5000,
            },
            auth: AuthConfig {
                hash_scheme: HashScheme::Argon2,
                upgrade_legacy_hashes: true,
                default_admin_username: "admin".to_string(),
                default_admin_secret: "admin123".to_string(),
            },
            log: LogConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_without_sources() {
        let cfg: AppConfig = AppConfig::defaults()
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .expect("defaults");
        assert_eq!(cfg.database.file_name, "registrar.sqlite3");
        assert_eq!(cfg.database.busy_timeout_ms, 5000);
        assert_eq!(cfg.auth.hash_scheme, HashScheme::Argon2);
        assert!(cfg.auth.upgrade_legacy_hashes);
        assert!(cfg.workspace.path.is_none());
    }
}
