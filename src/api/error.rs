//! Unified API error handling.
//!
//! Every failing handler answers with the same flat JSON envelope:
//!
//! ```json
//! { "error": "Installation failed", "details": "...", "code": "SCHEMA_INSTALL_FAILED" }
//! ```
//!
//! `details` is either a sentence or a map of field names to messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::install::InstallError;

/// Shown instead of raw driver or filesystem output in production
const GENERIC_INSTALL_DETAIL: &str =
    "An internal error occurred during installation. Check the server logs for details.";

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,
    InvalidAdminData,
    UnsupportedBackend,
    ConnectionFailed,
    AlreadyInstalled,

    // Server errors (5xx)
    PermissionDenied,
    SchemaInstallFailed,
    PersistFailed,
    InternalError,
    DatabaseError,
    NotInstalled,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest
            | ErrorCode::ValidationError
            | ErrorCode::InvalidAdminData
            | ErrorCode::UnsupportedBackend
            | ErrorCode::ConnectionFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict | ErrorCode::AlreadyInstalled => StatusCode::CONFLICT,
            ErrorCode::PermissionDenied
            | ErrorCode::SchemaInstallFailed
            | ErrorCode::PersistFailed
            | ErrorCode::InternalError
            | ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::NotInstalled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidAdminData => "INVALID_ADMIN_DATA",
            ErrorCode::UnsupportedBackend => "UNSUPPORTED_BACKEND",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::AlreadyInstalled => "ALREADY_INSTALLED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::SchemaInstallFailed => "SCHEMA_INSTALL_FAILED",
            ErrorCode::PersistFailed => "PERSIST_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::NotInstalled => "NOT_INSTALLED",
        }
    }

    fn for_install(err: &InstallError) -> Self {
        match err {
            InstallError::Validation { .. } => ErrorCode::ValidationError,
            InstallError::InvalidAdminData => ErrorCode::InvalidAdminData,
            InstallError::UnsupportedBackend(_) => ErrorCode::UnsupportedBackend,
            InstallError::ConnectionFailed(_) => ErrorCode::ConnectionFailed,
            InstallError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            InstallError::AlreadyInstalled => ErrorCode::AlreadyInstalled,
            InstallError::SchemaInstallFailed(_) => ErrorCode::SchemaInstallFailed,
            InstallError::PersistFailed(_) => ErrorCode::PersistFailed,
        }
    }
}

/// Additional error details
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    Message(String),
    /// Field-level validation errors
    ValidationErrors(HashMap<String, Vec<String>>),
}

/// The error response envelope
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub code: String,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail sentence
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details = Some(ErrorDetails::Message(detail.into()));
        self
    }

    /// Add validation errors as details
    pub fn with_validation_errors(mut self, errors: HashMap<String, Vec<String>>) -> Self {
        self.details = Some(ErrorDetails::ValidationErrors(errors));
        self
    }

    /// Normalize an installer failure. Raw driver output is only kept when
    /// `expose_internal` is set (non-production).
    pub fn from_install(err: InstallError, expose_internal: bool) -> Self {
        let detail = if err.has_internal_detail() && !expose_internal {
            GENERIC_INSTALL_DETAIL.to_string()
        } else {
            err.to_string()
        };
        Self::new(ErrorCode::for_install(&err), err.summary()).with_detail(detail)
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    /// Bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Forbidden error (403) - authenticated but not allowed
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Conflict error (409) - resource already exists
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::ValidationError, message).with_validation_errors(errors)
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error (500)
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// The system has not been installed yet (503)
    pub fn not_installed() -> Self {
        Self::new(ErrorCode::NotInstalled, "Application is not installed")
            .with_detail("Complete the installation wizard first.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: self.message,
            details: self.details,
            code: self.code.as_str().to_string(),
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    ApiError::conflict("A resource with this identifier already exists")
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    ApiError::bad_request("Referenced resource does not exist")
                }
                _ => ApiError::database("A database error occurred"),
            },
            _ => ApiError::database("A database error occurred"),
        }
    }
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a validator, if any
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Build the ApiError if there are any errors
    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_error_status_codes() {
        let cases = [
            (InstallError::validation("password", "too short"), StatusCode::BAD_REQUEST),
            (InstallError::InvalidAdminData, StatusCode::BAD_REQUEST),
            (InstallError::UnsupportedBackend("x".into()), StatusCode::BAD_REQUEST),
            (InstallError::ConnectionFailed("refused".into()), StatusCode::BAD_REQUEST),
            (InstallError::AlreadyInstalled, StatusCode::CONFLICT),
            (InstallError::PermissionDenied("ro".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (InstallError::SchemaInstallFailed("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (InstallError::PersistFailed("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api = ApiError::from_install(err, true);
            assert_eq!(api.status, status);
            assert_eq!(api.code.as_str(), code);
        }
    }

    #[test]
    fn test_production_hides_driver_detail() {
        let err = InstallError::SchemaInstallFailed("UNIQUE constraint failed: users.email".into());
        let api = ApiError::from_install(err, false);
        assert_eq!(api.message, "Installation failed");
        assert_eq!(
            api.details,
            Some(ErrorDetails::Message(GENERIC_INSTALL_DETAIL.to_string()))
        );

        let err = InstallError::SchemaInstallFailed("UNIQUE constraint failed: users.email".into());
        let api = ApiError::from_install(err, true);
        assert_eq!(
            api.details,
            Some(ErrorDetails::Message("UNIQUE constraint failed: users.email".to_string()))
        );
    }

    #[test]
    fn test_connection_detail_always_shown() {
        let err =
            InstallError::ConnectionFailed("Access denied. Check your username and password.".into());
        let api = ApiError::from_install(err, false);
        assert_eq!(
            api.details,
            Some(ErrorDetails::Message(
                "Access denied. Check your username and password.".to_string()
            ))
        );
    }

    #[test]
    fn test_response_envelope_shape() {
        let api = ApiError::from_install(InstallError::AlreadyInstalled, false);
        let body = serde_json::to_value(ErrorResponse {
            error: api.message.clone(),
            details: api.details.clone(),
            code: api.code.as_str().to_string(),
        })
        .unwrap();
        assert_eq!(body["code"], "ALREADY_INSTALLED");
        assert_eq!(body["error"], "Database already installed");
        assert!(body["details"].as_str().unwrap().contains("Reinstall"));
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("title", "Title is required");
        builder.check("end", Err("End must be after start".to_string()));
        builder.check("description", Ok(()));
        builder.add("title", "Title is too short");

        let err = builder.build().unwrap();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("2 fields"));

        if let Some(ErrorDetails::ValidationErrors(errors)) = &err.details {
            assert_eq!(errors.get("title").unwrap().len(), 2);
            assert_eq!(errors.get("end").unwrap().len(), 1);
            assert!(!errors.contains_key("description"));
        } else {
            panic!("Expected ValidationErrors details");
        }
    }

    #[test]
    fn test_single_field_validation_message() {
        let err = ApiError::validation_field("email", "Invalid email format");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid email format");
    }
}
