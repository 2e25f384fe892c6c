//! Failure taxonomy for probing and installing.

use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// A request field failed validation before any I/O happened
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("Admin email and password are required")]
    InvalidAdminData,

    #[error("Unsupported database type: {0}")]
    UnsupportedBackend(String),

    #[error("{0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("The database already contains user data. To reinstall, select the \"Reinstall\" option or use a different database name.")]
    AlreadyInstalled,

    #[error("{0}")]
    SchemaInstallFailed(String),

    /// The schema committed but the settings file could not be written or read back
    #[error("{0}")]
    PersistFailed(String),
}

impl InstallError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        InstallError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn schema(err: impl Display) -> Self {
        InstallError::SchemaInstallFailed(err.to_string())
    }

    /// Machine-readable code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            InstallError::Validation { .. } => "VALIDATION_ERROR",
            InstallError::InvalidAdminData => "INVALID_ADMIN_DATA",
            InstallError::UnsupportedBackend(_) => "UNSUPPORTED_BACKEND",
            InstallError::ConnectionFailed(_) => "CONNECTION_FAILED",
            InstallError::PermissionDenied(_) => "PERMISSION_DENIED",
            InstallError::AlreadyInstalled => "ALREADY_INSTALLED",
            InstallError::SchemaInstallFailed(_) => "SCHEMA_INSTALL_FAILED",
            InstallError::PersistFailed(_) => "PERSIST_FAILED",
        }
    }

    /// Short user-facing headline
    pub fn summary(&self) -> &'static str {
        match self {
            InstallError::Validation { .. } => "Validation failed",
            InstallError::InvalidAdminData => "Invalid admin data",
            InstallError::UnsupportedBackend(_) => "Unsupported database type",
            InstallError::ConnectionFailed(_) => "Database connection failed",
            InstallError::PermissionDenied(_) => "Permission denied",
            InstallError::AlreadyInstalled => "Database already installed",
            InstallError::SchemaInstallFailed(_) => "Installation failed",
            InstallError::PersistFailed(_) => "Settings could not be saved",
        }
    }

    /// Whether the detail text carries raw driver or filesystem output
    pub fn has_internal_detail(&self) -> bool {
        matches!(
            self,
            InstallError::SchemaInstallFailed(_) | InstallError::PersistFailed(_)
        )
    }
}
