//! The settings artifact: a flat `KEY=value` file whose presence marks the
//! system as installed and which carries the runtime connection parameters,
//! token signing secret and CORS origin.
//!
//! Writes go to a temp file in the same directory which is then renamed over
//! the target, so readers never observe a half-written file.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{resolve_under, Environment, InstallationConfig};
use crate::crypto::{generate_secret, SECRET_LENGTH};

use super::error::InstallError;
use super::request::{BackendConnectionDescriptor, DEFAULT_MYSQL_PORT};

const DEFAULT_MYSQL_DATABASE: &str = "webschedulr";
const DEFAULT_SQLITE_FILENAME: &str = "database.sqlite";
const DEFAULT_TOKEN_TTL: &str = "1d";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseSettings {
    MySql {
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    },
    Sqlite {
        filename: String,
    },
}

impl DatabaseSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            DatabaseSettings::MySql { .. } => "mysql",
            DatabaseSettings::Sqlite { .. } => "sqlite",
        }
    }

    /// On-disk location of a SQLite database, resolved against the app root
    pub fn sqlite_path(&self, app_root: &Path) -> Option<PathBuf> {
        match self {
            DatabaseSettings::Sqlite { filename } => {
                Some(resolve_under(app_root, Path::new(filename)))
            }
            DatabaseSettings::MySql { .. } => None,
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSettings::MySql {
                host,
                port,
                user,
                database,
                ..
            } => f
                .debug_struct("MySql")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("database", database)
                .finish_non_exhaustive(),
            DatabaseSettings::Sqlite { filename } => f
                .debug_struct("Sqlite")
                .field("filename", filename)
                .finish(),
        }
    }
}

/// Runtime configuration produced by a successful install
#[derive(Clone, PartialEq, Eq)]
pub struct InstalledSettings {
    pub app_env: Environment,
    pub database: DatabaseSettings,
    pub jwt_secret: String,
    pub jwt_expires_in: String,
    pub cors_origin: String,
}

impl fmt::Debug for InstalledSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledSettings")
            .field("app_env", &self.app_env)
            .field("database", &self.database)
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("cors_origin", &self.cors_origin)
            .finish_non_exhaustive()
    }
}

impl InstalledSettings {
    /// Build the settings for a descriptor with a freshly generated secret.
    pub fn materialize(
        descriptor: &BackendConnectionDescriptor,
        defaults: &InstallationConfig,
        environment: Environment,
    ) -> Self {
        let database = match descriptor {
            BackendConnectionDescriptor::MySql(target) => DatabaseSettings::MySql {
                host: target.host.clone(),
                port: target.port,
                user: target.username.clone(),
                password: target.password.clone(),
                database: target
                    .database
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MYSQL_DATABASE.to_string()),
            },
            BackendConnectionDescriptor::Sqlite(target) => DatabaseSettings::Sqlite {
                filename: target.filename.clone(),
            },
        };

        Self {
            app_env: environment,
            database,
            jwt_secret: generate_secret(SECRET_LENGTH),
            jwt_expires_in: defaults.token_ttl.clone(),
            cors_origin: defaults.cors_origin.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Server Configuration\n");
        push_entry(&mut out, "APP_ENV", self.app_env.as_str());

        out.push_str("\n# Database Configuration\n");
        push_entry(&mut out, "DB_TYPE", self.database.kind());
        match &self.database {
            DatabaseSettings::MySql {
                host,
                port,
                user,
                password,
                database,
            } => {
                push_entry(&mut out, "DB_HOST", host);
                push_entry(&mut out, "DB_PORT", &port.to_string());
                push_entry(&mut out, "DB_USER", user);
                push_entry(&mut out, "DB_PASSWORD", password);
                push_entry(&mut out, "DB_NAME", database);
            }
            DatabaseSettings::Sqlite { filename } => {
                push_entry(&mut out, "DB_FILENAME", filename);
            }
        }

        out.push_str("\n# Token Configuration\n");
        push_entry(&mut out, "JWT_SECRET", &self.jwt_secret);
        push_entry(&mut out, "JWT_EXPIRES_IN", &self.jwt_expires_in);

        out.push_str("\n# CORS Configuration\n");
        push_entry(&mut out, "CORS_ORIGIN", &self.cors_origin);
        out
    }

    pub fn parse(content: &str) -> Result<Self> {
        let values = parse_entries(content)?;
        let get = |key: &str| values.get(key).map(String::as_str);

        let app_env = match get("APP_ENV") {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };

        let database = match get("DB_TYPE") {
            Some("mysql") => DatabaseSettings::MySql {
                host: get("DB_HOST").unwrap_or("localhost").to_string(),
                port: match get("DB_PORT") {
                    Some(port) => port
                        .parse()
                        .with_context(|| format!("Invalid DB_PORT: {}", port))?,
                    None => DEFAULT_MYSQL_PORT,
                },
                user: get("DB_USER").unwrap_or("root").to_string(),
                password: get("DB_PASSWORD").unwrap_or_default().to_string(),
                database: get("DB_NAME").unwrap_or(DEFAULT_MYSQL_DATABASE).to_string(),
            },
            Some("sqlite") => DatabaseSettings::Sqlite {
                filename: get("DB_FILENAME")
                    .unwrap_or(DEFAULT_SQLITE_FILENAME)
                    .to_string(),
            },
            Some(other) => bail!("Unsupported DB_TYPE: {}", other),
            None => bail!("DB_TYPE is missing"),
        };

        let jwt_secret = get("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET is missing"))?
            .to_string();

        Ok(Self {
            app_env,
            database,
            jwt_secret,
            jwt_expires_in: get("JWT_EXPIRES_IN")
                .unwrap_or(DEFAULT_TOKEN_TTL)
                .to_string(),
            cors_origin: get("CORS_ORIGIN").unwrap_or(DEFAULT_CORS_ORIGIN).to_string(),
        })
    }
}

fn push_entry(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    if needs_quotes(value) {
        out.push('"');
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                c => out.push(c),
            }
        }
        out.push('"');
    } else {
        out.push_str(value);
    }
    out.push('\n');
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '\\' | '='))
}

fn parse_entries(content: &str) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, raw) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("Line {}: expected KEY=value", idx + 1))?;
        let value = match raw.trim().strip_prefix('"') {
            Some(quoted) => unquote(quoted)
                .ok_or_else(|| anyhow!("Line {}: unterminated quoted value", idx + 1))?,
            None => raw.trim().to_string(),
        };
        values.insert(key.trim().to_string(), value);
    }
    Ok(values)
}

/// Decode the body of a double-quoted value (opening quote already stripped)
fn unquote(body: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    None
}

/// Location of the settings artifact on disk
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the artifact, then read it back.
    ///
    /// Returns whether the re-read artifact carries the secret just written.
    pub fn persist(&self, settings: &InstalledSettings) -> Result<bool, InstallError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        std::fs::create_dir_all(dir).map_err(|e| {
            InstallError::PersistFailed(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let write_err = |e: std::io::Error| {
            InstallError::PersistFailed(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            ))
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(settings.render().as_bytes())
            .map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(path = %self.path.display(), "Settings file written");

        match self.load() {
            Ok(read_back) => Ok(read_back.jwt_secret == settings.jwt_secret),
            Err(e) => {
                debug!("Settings read-back failed: {:#}", e);
                Ok(false)
            }
        }
    }

    pub fn load(&self) -> Result<InstalledSettings> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {}", self.path.display()))?;
        InstalledSettings::parse(&content)
            .with_context(|| format!("Failed to parse settings file: {}", self.path.display()))
    }
}
