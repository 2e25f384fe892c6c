//! Installation request payloads and the connection descriptor derived from them.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::api::validation::{
    validate_database_name, validate_email, validate_password, validate_username,
};
use crate::config::resolve_under;

use super::error::InstallError;

pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_COMPANY_NAME: &str = "Default Company";

#[derive(Clone, Default, Deserialize)]
pub struct AdminAccount {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAccount")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Company row values after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanySeed {
    pub name: String,
    pub email: String,
    pub website: Option<String>,
}

impl CompanyInfo {
    /// Blank name falls back to a placeholder, blank email to the admin's email.
    pub fn with_defaults(&self, admin_email: &str) -> CompanySeed {
        CompanySeed {
            name: non_blank(&self.name).unwrap_or(DEFAULT_COMPANY_NAME).to_string(),
            email: non_blank(&self.email).unwrap_or(admin_email).to_string(),
            website: non_blank(&self.website).map(str::to_string),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Database section of the wizard form, as submitted
#[derive(Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub reinstall: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("filename", &self.filename)
            .field("reinstall", &self.reinstall)
            .finish_non_exhaustive()
    }
}

/// The wizard sends the port from a text input, so accept `3306` and `"3306"`.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        Text(String),
    }

    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(PortValue::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", text))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    MySql,
    Sqlite,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mysql" => Some(BackendKind::MySql),
            "sqlite" | "file" => Some(BackendKind::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MySql => "mysql",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MySqlTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

impl fmt::Debug for MySqlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteTarget {
    /// Filename as submitted, recorded in the settings file
    pub filename: String,
    /// Filename resolved against the application root
    pub path: PathBuf,
}

/// Exactly one live or prospective connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConnectionDescriptor {
    MySql(MySqlTarget),
    Sqlite(SqliteTarget),
}

impl DatabaseConfig {
    pub fn backend_kind(&self) -> Result<BackendKind, InstallError> {
        BackendKind::parse(&self.kind)
            .ok_or_else(|| InstallError::UnsupportedBackend(self.kind.clone()))
    }

    /// Build the descriptor; relative SQLite filenames resolve under `app_root`.
    pub fn descriptor(
        &self,
        app_root: &Path,
        default_sqlite_filename: &str,
    ) -> Result<BackendConnectionDescriptor, InstallError> {
        match self.backend_kind()? {
            BackendKind::MySql => Ok(BackendConnectionDescriptor::MySql(MySqlTarget {
                host: trimmed(&self.host),
                port: self.port.unwrap_or(DEFAULT_MYSQL_PORT),
                username: trimmed(&self.username),
                password: self.password.clone().unwrap_or_default(),
                database: non_blank(&self.database).map(str::to_string),
            })),
            BackendKind::Sqlite => {
                let filename = non_blank(&self.filename)
                    .unwrap_or(default_sqlite_filename)
                    .to_string();
                let path = resolve_under(app_root, Path::new(&filename));
                Ok(BackendConnectionDescriptor::Sqlite(SqliteTarget { filename, path }))
            }
        }
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Body of `POST /api/installation/perform`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallRequest {
    #[serde(default)]
    pub admin: Option<AdminAccount>,
    #[serde(default)]
    pub company: Option<CompanyInfo>,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

impl InstallRequest {
    /// Reject the request before any I/O. Returns the admin and database sections.
    pub fn validate(&self) -> Result<(&AdminAccount, &DatabaseConfig), InstallError> {
        let admin = match &self.admin {
            Some(admin) if !admin.email.trim().is_empty() && !admin.password.is_empty() => admin,
            _ => return Err(InstallError::InvalidAdminData),
        };

        validate_email(admin.email.trim()).map_err(|e| InstallError::validation("email", e))?;
        validate_password(&admin.password).map_err(|e| InstallError::validation("password", e))?;
        validate_username(&admin.username).map_err(|e| InstallError::validation("username", e))?;

        if let Some(email) = self.company.as_ref().and_then(|c| non_blank(&c.email)) {
            validate_email(email).map_err(|e| InstallError::validation("company_email", e))?;
        }

        let database = self
            .database
            .as_ref()
            .ok_or_else(|| {
                InstallError::validation("database", "Database configuration is required")
            })?;

        if database.backend_kind()? == BackendKind::MySql {
            if non_blank(&database.host).is_none() {
                return Err(InstallError::validation("host", "Database host is required"));
            }
            if non_blank(&database.username).is_none() {
                return Err(InstallError::validation("username", "Database username is required"));
            }
            let name = non_blank(&database.database).unwrap_or_default();
            validate_database_name(name).map_err(|e| InstallError::validation("database", e))?;
        }

        Ok((admin, database))
    }

    pub fn company_seed(&self, admin_email: &str) -> CompanySeed {
        self.company
            .clone()
            .unwrap_or_default()
            .with_defaults(admin_email)
    }
}
