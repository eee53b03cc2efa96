use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use mc_common::{Collection, JobRequest, NewJobRequest, RecordId, Superuser, Superusers};

use crate::error::{PlatformError, Result};
use crate::password::hash_password;
use crate::store::{normalize_email, require_password, MigrationLedger, RecordStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS _superusers (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_requests (
        id TEXT PRIMARY KEY,
        "user" TEXT NOT NULL,
        source_pdf TEXT NOT NULL,
        status TEXT NOT NULL,
        created BIGINT NOT NULL,
        updated BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        id TEXT PRIMARY KEY,
        applied BIGINT NOT NULL
    )
    "#,
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        info!("SQLite schema ready");
        Ok(())
    }
}

fn timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = row.get(column);
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| PlatformError::internal(format!("Invalid timestamp in {}: {}", column, millis)))
}

fn superuser_from_row(row: &SqliteRow) -> Result<Superuser> {
    Ok(Superuser {
        id: RecordId::from(row.get::<String, _>("id")),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created: timestamp(row, "created")?,
    })
}

fn job_request_from_row(row: &SqliteRow) -> Result<JobRequest> {
    Ok(JobRequest {
        id: RecordId::from(row.get::<String, _>("id")),
        user: row.get("user"),
        source_pdf: row.get("source_pdf"),
        status: row.get("status"),
        created: timestamp(row, "created")?,
        updated: timestamp(row, "updated")?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_superuser(&self, email: &str, password: &str) -> Result<Superuser> {
        let email = normalize_email(email)?;
        require_password(password)?;

        let user = Superuser {
            id: RecordId::generate(),
            email,
            password_hash: hash_password(password)?,
            created: Utc::now(),
        };

        let result = sqlx::query(
            "INSERT INTO _superusers (id, email, password_hash, created) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(PlatformError::duplicate(Superusers::NAME, "email", user.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_superuser_by_email(&self, email: &str) -> Result<Option<Superuser>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created FROM _superusers WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(superuser_from_row).transpose()
    }

    async fn count_superusers(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _superusers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn create_job_request(&self, new: NewJobRequest) -> Result<JobRequest> {
        new.validate()?;
        let record = new.into_record(RecordId::generate(), Utc::now());

        sqlx::query(
            r#"INSERT INTO job_requests (id, "user", source_pdf, status, created, updated) VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.as_str())
        .bind(&record.user)
        .bind(&record.source_pdf)
        .bind(&record.status)
        .bind(record.created.timestamp_millis())
        .bind(record.updated.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_job_request(&self, id: &RecordId) -> Result<Option<JobRequest>> {
        let row = sqlx::query(
            r#"SELECT id, "user", source_pdf, status, created, updated FROM job_requests WHERE id = ?"#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_request_from_row).transpose()
    }
}

#[async_trait]
impl MigrationLedger for SqliteStore {
    async fn is_applied(&self, id: &str) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn mark_applied(&self, id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO _migrations (id, applied) VALUES (?, ?)")
            .bind(id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM _migrations ORDER BY applied, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
