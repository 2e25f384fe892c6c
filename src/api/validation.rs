//! Input validation for API requests.
//!
//! This module provides validation functions for request data, ensuring all
//! inputs meet the required format and constraints.
//!
//! For collecting multiple validation errors and returning them as an ApiError,
//! use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

/// Minimum admin/user password length accepted by the wizard
pub const MIN_PASSWORD_LENGTH: usize = 7;

lazy_static! {
    /// Loose email shape check (something@something.tld)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Database names are interpolated as identifiers, so keep them conservative
    static ref DATABASE_NAME_REGEX: Regex = Regex::new(
        r"^[A-Za-z_][A-Za-z0-9_]*$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 255 {
        return Err("Email is too long (max 255 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() > 255 {
        return Err("Username is too long (max 255 characters)".to_string());
    }

    Ok(())
}

/// Validate a MySQL database name
pub fn validate_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Database name is required".to_string());
    }

    if name.len() > 64 {
        return Err("Database name is too long (max 64 characters)".to_string());
    }

    if !DATABASE_NAME_REGEX.is_match(name) {
        return Err(
            "Database name must start with a letter or underscore and contain only letters, numbers, and underscores".to_string(),
        );
    }

    let reserved = ["mysql", "information_schema", "performance_schema", "sys"];
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(format!("'{}' is a reserved database name", name));
    }

    Ok(())
}

/// Validate an appointment title
pub fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("Title is required".to_string());
    }

    if title.len() > 255 {
        return Err("Title is too long (max 255 characters)".to_string());
    }

    Ok(())
}
