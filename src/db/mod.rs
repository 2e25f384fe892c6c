mod models;

pub use models::*;

use anyhow::{Context, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

use crate::install::DatabaseSettings;

/// Schema created by the installer, one file per backend
pub const SQLITE_SCHEMA: &str = include_str!("../../migrations/sqlite/001_initial.sql");
pub const MYSQL_SCHEMA: &str = include_str!("../../migrations/mysql/001_initial.sql");

/// Installer-owned tables in drop order (children first)
pub const INSTALL_TABLES: &[&str] = &["appointments", "company", "users"];

/// Split a migration file into statements, dropping `--` comment lines
pub fn sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|statement| {
            statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|statement| statement.trim().to_string())
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Connection pool for the installed database
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
}

/// Run the same query body against whichever backend the pool holds
macro_rules! on_pool {
    ($pool:expr, $conn:ident => $body:expr) => {
        match $pool {
            DbPool::Sqlite($conn) => $body,
            DbPool::MySql($conn) => $body,
        }
    };
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, username, password, is_admin, created_at, updated_at";
const APPOINTMENT_COLUMNS: &str =
    "id, title, start_time, end_time, description, user_id, created_at";

pub async fn connect(settings: &DatabaseSettings, app_root: &Path) -> Result<DbPool> {
    match settings {
        DatabaseSettings::Sqlite { filename } => {
            let path = crate::config::resolve_under(app_root, Path::new(filename));
            info!("Opening SQLite database at {}", path.display());

            let options = SqliteConnectOptions::new()
                .filename(&path)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
            Ok(DbPool::Sqlite(pool))
        }
        DatabaseSettings::MySql {
            host,
            port,
            user,
            password,
            database,
        } => {
            info!("Connecting to MySQL database {} at {}:{}", database, host, port);

            let options = MySqlConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(database);
            let pool = MySqlPoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .with_context(|| format!("Failed to connect to MySQL at {}:{}", host, port))?;
            Ok(DbPool::MySql(pool))
        }
    }
}

impl DbPool {
    pub fn kind(&self) -> &'static str {
        match self {
            DbPool::Sqlite(_) => "sqlite",
            DbPool::MySql(_) => "mysql",
        }
    }

    pub async fn close(&self) {
        on_pool!(self, pool => pool.close().await)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        on_pool!(self, pool => {
            sqlx::query_as::<_, User>(&sql)
                .bind(username)
                .fetch_optional(pool)
                .await
        })
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        on_pool!(self, pool => {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
        })
    }

    pub async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        on_pool!(self, pool => {
            sqlx::query_as::<_, User>(&sql).fetch_all(pool).await
        })
    }

    /// Insert a user and return its id
    pub async fn create_user(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        const SQL: &str = "INSERT INTO users (first_name, last_name, email, username, password, is_admin) VALUES (?, ?, ?, ?, ?, ?)";
        match self {
            DbPool::Sqlite(pool) => {
                let result = sqlx::query(SQL)
                    .bind(user.first_name)
                    .bind(user.last_name)
                    .bind(user.email)
                    .bind(user.username)
                    .bind(user.password_hash)
                    .bind(user.is_admin)
                    .execute(pool)
                    .await?;
                Ok(result.last_insert_rowid())
            }
            DbPool::MySql(pool) => {
                let result = sqlx::query(SQL)
                    .bind(user.first_name)
                    .bind(user.last_name)
                    .bind(user.email)
                    .bind(user.username)
                    .bind(user.password_hash)
                    .bind(user.is_admin)
                    .execute(pool)
                    .await?;
                Ok(result.last_insert_id() as i64)
            }
        }
    }

    pub async fn find_company(&self) -> Result<Option<Company>, sqlx::Error> {
        const SQL: &str = "SELECT id, name, address, phone, email, website, created_at, updated_at FROM company ORDER BY id LIMIT 1";
        on_pool!(self, pool => {
            sqlx::query_as::<_, Company>(SQL).fetch_optional(pool).await
        })
    }

    pub async fn list_appointments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Appointment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE user_id = ? ORDER BY start_time",
            APPOINTMENT_COLUMNS
        );
        on_pool!(self, pool => {
            sqlx::query_as::<_, Appointment>(&sql)
                .bind(user_id)
                .fetch_all(pool)
                .await
        })
    }

    pub async fn find_appointment(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Appointment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE id = ? AND user_id = ?",
            APPOINTMENT_COLUMNS
        );
        on_pool!(self, pool => {
            sqlx::query_as::<_, Appointment>(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(pool)
                .await
        })
    }

    /// Insert an appointment owned by `user_id` and return its id
    pub async fn create_appointment(
        &self,
        user_id: i64,
        req: &CreateAppointmentRequest,
    ) -> Result<i64, sqlx::Error> {
        const SQL: &str = "INSERT INTO appointments (title, start_time, end_time, description, user_id) VALUES (?, ?, ?, ?, ?)";
        let title = req.title.trim();
        match self {
            DbPool::Sqlite(pool) => {
                let result = sqlx::query(SQL)
                    .bind(title)
                    .bind(req.start)
                    .bind(req.end)
                    .bind(&req.description)
                    .bind(user_id)
                    .execute(pool)
                    .await?;
                Ok(result.last_insert_rowid())
            }
            DbPool::MySql(pool) => {
                let result = sqlx::query(SQL)
                    .bind(title)
                    .bind(req.start)
                    .bind(req.end)
                    .bind(&req.description)
                    .bind(user_id)
                    .execute(pool)
                    .await?;
                Ok(result.last_insert_id() as i64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sqlx::sqlite::SqliteConnection;
    use sqlx::Connection;
    use tempfile::TempDir;

    async fn installed_pool(dir: &TempDir) -> DbPool {
        let path = dir.path().join("app.db");
        let mut conn = SqliteConnection::connect_with(
            &SqliteConnectOptions::new().filename(&path).create_if_missing(true),
        )
        .await
        .unwrap();
        for statement in sql_statements(SQLITE_SCHEMA) {
            sqlx::query(&statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();

        connect(
            &DatabaseSettings::Sqlite {
                filename: "app.db".into(),
            },
            dir.path(),
        )
        .await
        .unwrap()
    }

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            first_name: "Grace",
            last_name: "Hopper",
            email,
            username,
            password_hash: "$argon2id$placeholder",
            is_admin: false,
        }
    }

    #[test]
    fn test_sql_statements_strip_comments() {
        let statements = sql_statements("-- header\nCREATE TABLE a (id INT);\n\n-- next\nCREATE TABLE b (id INT);\n");
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_schemas_cover_install_tables() {
        for table in INSTALL_TABLES {
            let needle = format!("CREATE TABLE IF NOT EXISTS {}", table);
            assert!(SQLITE_SCHEMA.contains(&needle));
            assert!(MYSQL_SCHEMA.contains(&needle));
        }
    }

    #[tokio::test]
    async fn test_missing_sqlite_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = connect(
            &DatabaseSettings::Sqlite {
                filename: "missing.db".into(),
            },
            dir.path(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_queries() {
        let dir = TempDir::new().unwrap();
        let db = installed_pool(&dir).await;
        assert_eq!(db.kind(), "sqlite");

        let id = db.create_user(&new_user("grace", "grace@example.com")).await.unwrap();
        let user = db.find_user_by_username("grace").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert!(!user.is_admin);
        assert!(user.created_at.is_some());

        assert!(db.find_user_by_username("nobody").await.unwrap().is_none());
        assert_eq!(db.list_users().await.unwrap().len(), 1);

        let duplicate = db.create_user(&new_user("grace", "other@example.com")).await;
        assert!(duplicate.is_err());
        db.close().await;
    }

    #[tokio::test]
    async fn test_appointments_are_scoped_to_owner() {
        let dir = TempDir::new().unwrap();
        let db = installed_pool(&dir).await;
        let owner = db.create_user(&new_user("owner", "owner@example.com")).await.unwrap();
        let other = db.create_user(&new_user("other", "other@example.com")).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let req = CreateAppointmentRequest {
            title: "  Checkup ".into(),
            start: day.and_hms_opt(9, 30, 0).unwrap(),
            end: day.and_hms_opt(10, 0, 0).unwrap(),
            description: Some("Annual".into()),
        };
        let id = db.create_appointment(owner, &req).await.unwrap();

        let mine = db.list_appointments_for_user(owner).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Checkup");
        assert_eq!(mine[0].start_time, req.start);

        assert!(db.list_appointments_for_user(other).await.unwrap().is_empty());
        assert!(db.find_appointment(id, owner).await.unwrap().is_some());
        assert!(db.find_appointment(id, other).await.unwrap().is_none());
        db.close().await;
    }
}
