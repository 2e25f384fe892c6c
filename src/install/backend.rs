//! Backend-specific probing and schema installation.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::EmptySchemaPolicy;

use super::error::InstallError;
use super::mysql::MySqlBackend;
use super::request::{AdminAccount, BackendConnectionDescriptor, BackendKind, CompanySeed};
use super::sqlite::SqliteBackend;

/// Outcome of a connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Rows written by a successful install
#[derive(Debug, Clone, Copy)]
pub struct InstallSeed<'a> {
    pub admin: &'a AdminAccount,
    pub company: &'a CompanySeed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub reinstall: bool,
    pub empty_schema: EmptySchemaPolicy,
}

/// What an existing target already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No application tables
    Absent,
    /// Tables exist but there are no users
    Empty,
    /// At least one user row exists
    Populated,
}

impl SchemaState {
    pub fn classify(table_count: i64, user_count: Option<i64>) -> Self {
        if table_count == 0 {
            return SchemaState::Absent;
        }
        match user_count {
            Some(count) if count > 0 => SchemaState::Populated,
            _ => SchemaState::Empty,
        }
    }

    /// Refuse to install over existing data unless the caller opted in.
    pub fn ensure_installable(self, options: &InstallOptions) -> Result<(), InstallError> {
        if options.reinstall {
            return Ok(());
        }
        match (self, options.empty_schema) {
            (SchemaState::Populated, _) => Err(InstallError::AlreadyInstalled),
            (SchemaState::Empty, EmptySchemaPolicy::RequireReinstall) => {
                Err(InstallError::AlreadyInstalled)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
pub trait InstallBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Non-mutating connectivity check. Never leaves a connection open.
    async fn probe(&self) -> ProbeResult;

    /// Create the schema and seed the admin and company rows atomically.
    async fn install(
        &self,
        seed: InstallSeed<'_>,
        options: InstallOptions,
    ) -> Result<(), InstallError>;

    /// Error reported when the pre-install probe fails
    fn probe_error(&self, message: String) -> InstallError {
        InstallError::ConnectionFailed(message)
    }
}

/// Pick the backend implementation for a descriptor
pub fn backend_for(descriptor: &BackendConnectionDescriptor) -> Box<dyn InstallBackend> {
    match descriptor {
        BackendConnectionDescriptor::MySql(target) => Box::new(MySqlBackend::new(target.clone())),
        BackendConnectionDescriptor::Sqlite(target) => {
            Box::new(SqliteBackend::new(target.path.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(SchemaState::classify(0, None), SchemaState::Absent);
        assert_eq!(SchemaState::classify(3, None), SchemaState::Empty);
        assert_eq!(SchemaState::classify(3, Some(0)), SchemaState::Empty);
        assert_eq!(SchemaState::classify(3, Some(2)), SchemaState::Populated);
    }

    #[test]
    fn test_populated_requires_reinstall() {
        let options = InstallOptions::default();
        assert!(matches!(
            SchemaState::Populated.ensure_installable(&options),
            Err(InstallError::AlreadyInstalled)
        ));

        let reinstall = InstallOptions {
            reinstall: true,
            ..Default::default()
        };
        assert!(SchemaState::Populated.ensure_installable(&reinstall).is_ok());
    }

    #[test]
    fn test_empty_schema_policy() {
        let proceed = InstallOptions::default();
        assert!(SchemaState::Empty.ensure_installable(&proceed).is_ok());
        assert!(SchemaState::Absent.ensure_installable(&proceed).is_ok());

        let strict = InstallOptions {
            reinstall: false,
            empty_schema: EmptySchemaPolicy::RequireReinstall,
        };
        assert!(matches!(
            SchemaState::Empty.ensure_installable(&strict),
            Err(InstallError::AlreadyInstalled)
        ));
        assert!(SchemaState::Absent.ensure_installable(&strict).is_ok());
    }

    #[test]
    fn test_backend_dispatch() {
        let sqlite = BackendConnectionDescriptor::Sqlite(super::super::request::SqliteTarget {
            filename: "test.db".into(),
            path: "/tmp/test.db".into(),
        });
        assert_eq!(backend_for(&sqlite).kind(), BackendKind::Sqlite);
        assert!(matches!(
            backend_for(&sqlite).probe_error("read-only".into()),
            InstallError::PermissionDenied(_)
        ));
    }
}
