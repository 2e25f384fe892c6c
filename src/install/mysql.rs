use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::{Connection, Executor};
use tracing::{debug, error, info, warn};

use crate::crypto::hash_password;
use crate::db::{sql_statements, MYSQL_SCHEMA};

use super::backend::{InstallBackend, InstallOptions, InstallSeed, ProbeResult, SchemaState};
use super::error::InstallError;
use super::request::{BackendKind, MySqlTarget};

/// MySQL server error numbers that mean the credentials were rejected
const ER_DBACCESS_DENIED: u16 = 1044;
const ER_ACCESS_DENIED: u16 = 1045;

pub struct MySqlBackend {
    target: MySqlTarget,
}

impl MySqlBackend {
    pub fn new(target: MySqlTarget) -> Self {
        Self { target }
    }

    /// Connection options without a database selected
    fn server_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.target.host)
            .port(self.target.port)
            .username(&self.target.username)
            .password(&self.target.password)
    }

    async fn connect_server(&self) -> Result<MySqlConnection, InstallError> {
        MySqlConnection::connect_with(&self.server_options())
            .await
            .map_err(|e| InstallError::ConnectionFailed(self.describe_connect_error(&e)))
    }

    fn describe_connect_error(&self, err: &sqlx::Error) -> String {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => format!(
                "Could not connect to MySQL server at {}:{}. Make sure MySQL is running.",
                self.target.host, self.target.port
            ),
            sqlx::Error::Database(db_err) => {
                let denied = db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(|e| matches!(e.number(), ER_ACCESS_DENIED | ER_DBACCESS_DENIED))
                    .unwrap_or(false);
                if denied {
                    "Access denied. Check your username and password.".to_string()
                } else {
                    db_err.message().to_string()
                }
            }
            other => other.to_string(),
        }
    }

    async fn provision(
        &self,
        conn: &mut MySqlConnection,
        database: &str,
        seed: InstallSeed<'_>,
        options: InstallOptions,
    ) -> Result<(), InstallError> {
        let ident = quote_ident(database);

        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(database)
        .fetch_one(&mut *conn)
        .await
        .map_err(InstallError::schema)?;

        if exists > 0 {
            if options.reinstall {
                warn!(database, "Reinstall requested, dropping existing database");
                let drop = format!("DROP DATABASE {}", ident);
                (&mut *conn).execute(drop.as_str())
                    .await
                    .map_err(InstallError::schema)?;
            } else {
                let state = schema_state(conn, database).await?;
                debug!(database, ?state, "Existing database inspected");
                state.ensure_installable(&options)?;
            }
        }

        // DDL auto-commits in MySQL, so the schema is created before the transaction.
        let create = format!("CREATE DATABASE IF NOT EXISTS {}", ident);
        (&mut *conn).execute(create.as_str())
            .await
            .map_err(InstallError::schema)?;
        let use_db = format!("USE {}", ident);
        (&mut *conn).execute(use_db.as_str())
            .await
            .map_err(InstallError::schema)?;

        for statement in sql_statements(MYSQL_SCHEMA) {
            (&mut *conn).execute(statement.as_str())
                .await
                .map_err(InstallError::schema)?;
        }
        info!(database, "MySQL schema created");

        let password_hash = hash_password(&seed.admin.password).map_err(InstallError::schema)?;

        let mut tx = conn.begin().await.map_err(InstallError::schema)?;
        match insert_seed(&mut tx, seed, &password_hash).await {
            Ok(()) => tx.commit().await.map_err(InstallError::schema),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Failed to roll back MySQL install: {}", rollback_err);
                }
                Err(InstallError::schema(e))
            }
        }
    }
}

#[async_trait]
impl InstallBackend for MySqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    async fn probe(&self) -> ProbeResult {
        if self.target.host.is_empty() || self.target.username.is_empty() {
            return ProbeResult::failed("Missing required fields: host and username are required");
        }

        let mut conn = match MySqlConnection::connect_with(&self.server_options()).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!("MySQL probe failed: {}", e);
                return ProbeResult::failed(self.describe_connect_error(&e));
            }
        };
        let pinged = conn.ping().await;
        close_quietly(conn).await;
        if let Err(e) = pinged {
            return ProbeResult::failed(self.describe_connect_error(&e));
        }

        let Some(database) = self.target.database.as_deref() else {
            return ProbeResult::ok("Connected to MySQL server successfully!");
        };

        let missing_database = || {
            ProbeResult::ok(format!(
                "Connected to MySQL server, but database '{}' might not exist. It will be created during installation.",
                database
            ))
        };

        match MySqlConnection::connect_with(&self.server_options().database(database)).await {
            Ok(mut conn) => {
                let checked = sqlx::query("SELECT 1").execute(&mut conn).await;
                close_quietly(conn).await;
                match checked {
                    Ok(_) => ProbeResult::ok(format!("Connected to database: {}", database)),
                    Err(e) => {
                        debug!(database, "Database check failed: {}", e);
                        missing_database()
                    }
                }
            }
            Err(e) => {
                debug!(database, "Database connect failed: {}", e);
                missing_database()
            }
        }
    }

    async fn install(
        &self,
        seed: InstallSeed<'_>,
        options: InstallOptions,
    ) -> Result<(), InstallError> {
        let database = self
            .target
            .database
            .as_deref()
            .ok_or_else(|| InstallError::validation("database", "Database name is required"))?;

        let mut conn = self.connect_server().await?;
        let result = self.provision(&mut conn, database, seed, options).await;
        close_quietly(conn).await;
        result
    }
}

async fn schema_state(
    conn: &mut MySqlConnection,
    database: &str,
) -> Result<SchemaState, InstallError> {
    let tables: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ?")
            .bind(database)
            .fetch_one(&mut *conn)
            .await
            .map_err(InstallError::schema)?;

    let has_users: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = 'users'",
    )
    .bind(database)
    .fetch_one(&mut *conn)
    .await
    .map_err(InstallError::schema)?;

    let users = if has_users > 0 {
        let count = format!("SELECT COUNT(*) FROM {}.users", quote_ident(database));
        let users: i64 = sqlx::query_scalar(&count)
            .fetch_one(&mut *conn)
            .await
            .map_err(InstallError::schema)?;
        Some(users)
    } else {
        None
    };

    Ok(SchemaState::classify(tables, users))
}

async fn insert_seed(
    conn: &mut MySqlConnection,
    seed: InstallSeed<'_>,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
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

async fn close_quietly(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        debug!("Error closing MySQL connection: {}", e);
    }
}

/// Backtick-quote an identifier. Names are validated before they get here.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::request::{AdminAccount, CompanySeed};

    fn unreachable_target() -> MySqlTarget {
        MySqlTarget {
            host: "127.0.0.1".into(),
            port: 1,
            username: "root".into(),
            password: "secret".into(),
            database: Some("webschedulr".into()),
        }
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("webschedulr"), "`webschedulr`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[tokio::test]
    async fn test_probe_unreachable_host() {
        let backend = MySqlBackend::new(unreachable_target());
        let result = backend.probe().await;
        assert!(!result.success);
        assert!(result.message.contains("Could not connect"));
        assert!(result.message.contains("127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_probe_requires_host_and_username() {
        let backend = MySqlBackend::new(MySqlTarget {
            host: String::new(),
            ..unreachable_target()
        });
        let result = backend.probe().await;
        assert!(!result.success);
        assert!(result.message.contains("host and username are required"));
    }

    #[tokio::test]
    async fn test_install_unreachable_is_connection_failed() {
        let backend = MySqlBackend::new(unreachable_target());
        let admin = AdminAccount {
            email: "a@b.com".into(),
            username: "a".into(),
            password: "longenough".into(),
            ..Default::default()
        };
        let company = CompanySeed {
            name: "Acme".into(),
            email: "a@b.com".into(),
            website: None,
        };
        let err = backend
            .install(
                InstallSeed {
                    admin: &admin,
                    company: &company,
                },
                InstallOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, InstallError::ConnectionFailed(msg) if msg.contains("Could not connect"))
        );
    }
}
