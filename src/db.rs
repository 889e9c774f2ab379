use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{AuthToken, DbUser, User};
use crate::error::{AppError, write_error};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = 4;

/// Opens the pool in WAL mode with foreign keys enforced. Writers wait up to
/// `BUSY_TIMEOUT` for the database lock instead of failing immediately.
#[instrument]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    info!("Connecting to SQLite database");
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn ping(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!("user {} not found", id))),
    }
}

#[instrument(skip(pool))]
pub async fn count_users(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all, fields(email))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
    is_admin: bool,
) -> Result<User, AppError> {
    info!("Creating new user");

    let email = email.trim().to_lowercase();
    let hashed_password = bcrypt::hash(password, PASSWORD_HASH_COST)?;

    let row = sqlx::query_as::<_, DbUser>(
        "INSERT INTO users (email, password_hash, is_admin, created_at)
         VALUES (?, ?, ?, ?)
         RETURNING id, email, password_hash, is_admin, created_at",
    )
    .bind(&email)
    .bind(hashed_password)
    .bind(is_admin)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| write_error(e, &format!("user '{}' already exists", email), "invalid user"))?;

    Ok(User::from(row))
}

/// Returns the user when the password matches, `None` otherwise.
#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, email, password_hash, is_admin, created_at FROM users WHERE email = ?",
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => match bcrypt::verify(password, &row.password_hash) {
            Ok(true) => Ok(Some(User::from(row))),
            _ => Ok(None),
        },
        None => Ok(None),
    }
}

#[instrument(skip(pool, token))]
pub async fn create_auth_token(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    info!("Creating auth token");

    let res = sqlx::query(
        "INSERT INTO auth_tokens (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(token)
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_auth_token(pool: &Pool<Sqlite>, token: &str) -> Result<AuthToken, AppError> {
    let row = sqlx::query_as::<_, AuthToken>(
        "SELECT id, user_id, token, created_at, expires_at FROM auth_tokens WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(token) => Ok(token),
        _ => Err(AppError::Authentication("invalid token".to_string())),
    }
}

#[instrument(skip(pool, token))]
pub async fn revoke_auth_token(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Revoking auth token");

    sqlx::query("DELETE FROM auth_tokens WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn purge_expired_tokens(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
