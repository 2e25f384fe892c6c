use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub installation: InstallationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory that relative SQLite filenames and the settings file resolve against
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            app_root: default_app_root(),
            environment: Environment::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the installer does when the target already has tables but no users.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptySchemaPolicy {
    /// Treat the target as not yet installed and continue
    #[default]
    Proceed,
    /// Refuse unless the reinstall flag is set
    RequireReinstall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationConfig {
    /// Settings artifact written after a successful install (relative to app_root)
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    #[serde(default)]
    pub empty_schema_policy: EmptySchemaPolicy,
    /// Used when the submitted SQLite config has no filename
    #[serde(default = "default_sqlite_filename")]
    pub default_sqlite_filename: String,
    /// Token lifetime written to the settings artifact (e.g. "1d", "12h", "3600")
    #[serde(default = "default_token_ttl")]
    pub token_ttl: String,
    /// CORS origin written to the settings artifact
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            empty_schema_policy: EmptySchemaPolicy::default(),
            default_sqlite_filename: default_sqlite_filename(),
            token_ttl: default_token_ttl(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_settings_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_sqlite_filename() -> String {
    "database.sqlite".to_string()
}

fn default_token_ttl() -> String {
    "1d".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Absolute or app_root-relative location of the settings artifact
    pub fn settings_path(&self) -> PathBuf {
        resolve_under(&self.server.app_root, &self.installation.settings_file)
    }
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(Path::new("/nonexistent/webschedulr.toml")).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.installation.empty_schema_policy, EmptySchemaPolicy::Proceed);
        assert_eq!(config.settings_path(), PathBuf::from("./.env"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
[server]
port = 8080
environment = "production"
app_root = "/srv/webschedulr"

[installation]
empty_schema_policy = "require_reinstall"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(config.server.environment.is_production());
        assert_eq!(
            config.installation.empty_schema_policy,
            EmptySchemaPolicy::RequireReinstall
        );
        assert_eq!(config.installation.token_ttl, "1d");
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/srv/webschedulr/.env")
        );
    }

    #[test]
    fn test_absolute_settings_file_is_kept() {
        assert_eq!(
            resolve_under(Path::new("/srv"), Path::new("/etc/webschedulr.env")),
            PathBuf::from("/etc/webschedulr.env")
        );
    }
}
