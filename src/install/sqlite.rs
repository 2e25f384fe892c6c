use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::crypto::hash_password;
use crate::db::{sql_statements, INSTALL_TABLES, SQLITE_SCHEMA};

use super::backend::{InstallBackend, InstallOptions, InstallSeed, ProbeResult, SchemaState};
use super::error::InstallError;
use super::request::BackendKind;

pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .foreign_keys(true)
    }

    /// Create and drop a uniquely named file next to the database path
    async fn check_writable(&self) -> std::io::Result<()> {
        let dir = self.directory().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut scratch = tempfile::Builder::new()
                .prefix(".webschedulr-write-")
                .tempfile_in(&dir)?;
            scratch.write_all(b"write test")?;
            scratch.close()
        })
        .await
        .map_err(std::io::Error::other)?
    }

    async fn prepare_directory(&self) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(self.directory())
            .await
            .map_err(|e| {
                InstallError::PermissionDenied(format!("Cannot create SQLite directory: {}", e))
            })?;
        self.check_writable().await.map_err(|e| {
            InstallError::PermissionDenied(format!("SQLite directory is not writable: {}", e))
        })
    }

    async fn provision(
        &self,
        conn: &mut SqliteConnection,
        seed: InstallSeed<'_>,
        options: InstallOptions,
    ) -> Result<(), InstallError> {
        let state = schema_state(conn).await?;
        debug!(path = %self.path.display(), ?state, "Existing database inspected");
        state.ensure_installable(&options)?;

        let password_hash = hash_password(&seed.admin.password).map_err(InstallError::schema)?;

        let mut tx = conn.begin().await.map_err(InstallError::schema)?;
        let drop_existing = options.reinstall && state != SchemaState::Absent;
        match apply(&mut tx, drop_existing, seed, &password_hash).await {
            Ok(()) => tx.commit().await.map_err(InstallError::schema),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Failed to roll back SQLite install: {}", rollback_err);
                }
                Err(InstallError::schema(e))
            }
        }
    }
}

#[async_trait]
impl InstallBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn probe(&self) -> ProbeResult {
        let dir = self.directory();
        let created = if tokio::fs::metadata(dir).await.is_err() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                return ProbeResult::failed(format!("Cannot create SQLite directory: {}", e));
            }
            true
        } else {
            false
        };

        match self.check_writable().await {
            Ok(()) if created => ProbeResult::ok("SQLite directory created successfully"),
            Ok(()) => ProbeResult::ok("SQLite directory is writable"),
            Err(e) => ProbeResult::failed(format!("SQLite directory is not writable: {}", e)),
        }
    }

    async fn install(
        &self,
        seed: InstallSeed<'_>,
        options: InstallOptions,
    ) -> Result<(), InstallError> {
        self.prepare_directory().await?;

        let mut conn = SqliteConnection::connect_with(&self.connect_options())
            .await
            .map_err(|e| {
                InstallError::ConnectionFailed(format!(
                    "Could not open SQLite database at {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        let result = self.provision(&mut conn, seed, options).await;
        if let Err(e) = conn.close().await {
            debug!("Error closing SQLite connection: {}", e);
        }
        if result.is_ok() {
            info!(path = %self.path.display(), "SQLite database installed");
        }
        result
    }

    fn probe_error(&self, message: String) -> InstallError {
        InstallError::PermissionDenied(message)
    }
}

async fn schema_state(conn: &mut SqliteConnection) -> Result<SchemaState, InstallError> {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'company', 'appointments')",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(InstallError::schema)?;

    let has_users: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(InstallError::schema)?;

    let users = if has_users > 0 {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *conn)
            .await
            .map_err(InstallError::schema)?;
        Some(count)
    } else {
        None
    };

    Ok(SchemaState::classify(tables, users))
}

async fn apply(
    conn: &mut SqliteConnection,
    drop_existing: bool,
    seed: InstallSeed<'_>,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    if drop_existing {
        warn!("Reinstall requested, dropping existing tables");
        for table in INSTALL_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *conn)
                .await?;
        }
    }

    for statement in sql_statements(SQLITE_SCHEMA) {
        sqlx::query(&statement).execute(&mut *conn).await?;
    }

    let admin = seed.admin;
    sqlx::query(
        "INSERT INTO users (first_name, last_name, email, username, password, is_admin) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&admin.first_name)
    .bind(&admin.last_name)
    .bind(admin.email.trim())
    .bind(admin.username.trim())
    .bind(password_hash)
    .bind(true)
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO company (name, email, website) VALUES (?, ?, ?)")
        .bind(&seed.company.name)
        .bind(&seed.company.email)
        .bind(&seed.company.website)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmptySchemaPolicy;
    use crate::crypto::verify_password;
    use crate::install::request::{AdminAccount, CompanySeed};
    use tempfile::TempDir;

    fn admin(email: &str, username: &str) -> AdminAccount {
        AdminAccount {
            first_name: "Ada".into(),
            last_name: "Admin".into(),
            email: email.into(),
            username: username.into(),
            password: "longenough".into(),
        }
    }

    fn company(name: &str) -> CompanySeed {
        CompanySeed {
            name: name.into(),
            email: "office@acme.test".into(),
            website: None,
        }
    }

    async fn open(path: &Path) -> SqliteConnection {
        SqliteConnection::connect_with(&SqliteConnectOptions::new().filename(path))
            .await
            .unwrap()
    }

    async fn count(conn: &mut SqliteConnection, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&mut *conn).await.unwrap()
    }

    fn leftover_scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".webschedulr-write-"))
            .count()
    }

    async fn install(
        backend: &SqliteBackend,
        admin: &AdminAccount,
        company: &CompanySeed,
        options: InstallOptions,
    ) -> Result<(), InstallError> {
        backend.install(InstallSeed { admin, company }, options).await
    }

    #[tokio::test]
    async fn test_fresh_install_creates_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("test.db");
        let backend = SqliteBackend::new(path.clone());

        install(&backend, &admin("a@b.com", "a"), &company("Acme"), InstallOptions::default())
            .await
            .unwrap();

        let mut conn = open(&path).await;
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM users").await, 1);
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM company").await, 1);
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM appointments").await, 0);

        let (hash, is_admin): (String, bool) =
            sqlx::query_as("SELECT password, is_admin FROM users WHERE username = 'a'")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert!(is_admin);
        assert_ne!(hash, "longenough");
        assert!(verify_password("longenough", &hash));
        conn.close().await.unwrap();

        assert_eq!(leftover_scratch_files(&dir.path().join("data")), 0);
    }

    #[tokio::test]
    async fn test_second_install_is_already_installed() {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(dir.path().join("test.db"));

        install(&backend, &admin("a@b.com", "a"), &company("Acme"), InstallOptions::default())
            .await
            .unwrap();
        let options = InstallOptions::default();
        let err = install(&backend, &admin("a@b.com", "a"), &company("Acme"), options)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::AlreadyInstalled));
    }

    #[tokio::test]
    async fn test_reinstall_replaces_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let backend = SqliteBackend::new(path.clone());

        install(&backend, &admin("old@b.com", "old"), &company("Old Co"), InstallOptions::default())
            .await
            .unwrap();
        let reinstall = InstallOptions {
            reinstall: true,
            ..Default::default()
        };
        install(&backend, &admin("new@b.com", "new"), &company("New Co"), reinstall)
            .await
            .unwrap();

        let mut conn = open(&path).await;
        let usernames: Vec<String> = sqlx::query_scalar("SELECT username FROM users")
            .fetch_all(&mut conn)
            .await
            .unwrap();
        assert_eq!(usernames, vec!["new".to_string()]);
        let companies: Vec<String> = sqlx::query_scalar("SELECT name FROM company")
            .fetch_all(&mut conn)
            .await
            .unwrap();
        assert_eq!(companies, vec!["New Co".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_company_insert_rolls_back_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut conn = SqliteConnection::connect_with(
                &SqliteConnectOptions::new().filename(&path).create_if_missing(true),
            )
            .await
            .unwrap();
            sqlx::raw_sql(
                "CREATE TABLE company (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, address TEXT, phone TEXT, email TEXT, website TEXT, created_at TIMESTAMP, updated_at TIMESTAMP);
                 CREATE TRIGGER reject_company BEFORE INSERT ON company BEGIN SELECT RAISE(ABORT, 'company insert rejected'); END;",
            )
            .execute(&mut conn)
            .await
            .unwrap();
            conn.close().await.unwrap();
        }

        let backend = SqliteBackend::new(path.clone());
        let options = InstallOptions::default();
        let err = install(&backend, &admin("a@b.com", "a"), &company("Acme"), options)
            .await
            .unwrap_err();
        match err {
            InstallError::SchemaInstallFailed(detail) => {
                assert!(detail.contains("company insert rejected"))
            }
            other => panic!("Expected schema failure, got {:?}", other),
        }

        let mut conn = open(&path).await;
        assert_eq!(
            count(&mut conn, "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'").await,
            0
        );
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM company").await, 0);
    }

    #[tokio::test]
    async fn test_empty_schema_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut conn = SqliteConnection::connect_with(
                &SqliteConnectOptions::new().filename(&path).create_if_missing(true),
            )
            .await
            .unwrap();
            for statement in sql_statements(SQLITE_SCHEMA) {
                sqlx::query(&statement).execute(&mut conn).await.unwrap();
            }
            conn.close().await.unwrap();
        }

        let backend = SqliteBackend::new(path);
        let strict = InstallOptions {
            reinstall: false,
            empty_schema: EmptySchemaPolicy::RequireReinstall,
        };
        let err = install(&backend, &admin("a@b.com", "a"), &company("Acme"), strict)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::AlreadyInstalled));

        install(&backend, &admin("a@b.com", "a"), &company("Acme"), InstallOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connection_check_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(dir.path().join("nested").join("db.sqlite"));

        let first = backend.probe().await;
        assert!(first.success);
        assert_eq!(first.message, "SQLite directory created successfully");

        let second = backend.probe().await;
        assert!(second.success);
        assert_eq!(second.message, "SQLite directory is writable");
        assert!(!dir.path().join("nested").join("db.sqlite").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("nested")).unwrap().count(), 0);
    }
}
