use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::{AppError, write_error};
use crate::models::{Dog, Session};
use crate::validation::{optional_text, parse_timestamp, require_positive_id};

#[instrument(skip(pool))]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    started_at: Option<&str>,
    location: Option<String>,
    notes: Option<String>,
) -> Result<Session, AppError> {
    info!("Creating training session");
    let started_at = parse_timestamp("started_at", started_at)?.unwrap_or_else(Utc::now);

    let session = sqlx::query_as::<_, Session>(
        "INSERT INTO training_sessions (started_at, location, notes)
         VALUES (?, ?, ?)
         RETURNING id, started_at, ended_at, location, notes",
    )
    .bind(started_at)
    .bind(optional_text(location))
    .bind(optional_text(notes))
    .fetch_one(pool)
    .await?;

    Ok(session)
}

#[instrument(skip(pool))]
pub async fn get_session(pool: &Pool<Sqlite>, id: i64) -> Result<Session, AppError> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, started_at, ended_at, location, notes FROM training_sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    session.ok_or_else(|| AppError::NotFound(format!("session {} not found", id)))
}

/// Replaces location and notes. `started_at` is kept when not supplied.
#[instrument(skip(pool))]
pub async fn update_session(
    pool: &Pool<Sqlite>,
    id: i64,
    started_at: Option<&str>,
    location: Option<String>,
    notes: Option<String>,
) -> Result<Session, AppError> {
    info!("Updating training session");
    let started_at = parse_timestamp("started_at", started_at)?;

    let session = sqlx::query_as::<_, Session>(
        "UPDATE training_sessions
         SET started_at = COALESCE(?, started_at), location = ?, notes = ?
         WHERE id = ?
         RETURNING id, started_at, ended_at, location, notes",
    )
    .bind(started_at)
    .bind(optional_text(location))
    .bind(optional_text(notes))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    session.ok_or_else(|| AppError::NotFound(format!("session {} not found", id)))
}

/// Marks the session closed. Closing again overwrites `ended_at`.
#[instrument(skip(pool))]
pub async fn close_session(
    pool: &Pool<Sqlite>,
    id: i64,
    ended_at: Option<&str>,
) -> Result<Session, AppError> {
    info!("Closing training session");
    let ended_at = parse_timestamp("ended_at", ended_at)?.unwrap_or_else(Utc::now);

    let session = sqlx::query_as::<_, Session>(
        "UPDATE training_sessions SET ended_at = ? WHERE id = ?
         RETURNING id, started_at, ended_at, location, notes",
    )
    .bind(ended_at)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    session.ok_or_else(|| AppError::NotFound(format!("session {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_sessions(pool: &Pool<Sqlite>) -> Result<Vec<Session>, AppError> {
    info!("Listing training sessions");
    let sessions = sqlx::query_as::<_, Session>(
        "SELECT id, started_at, ended_at, location, notes FROM training_sessions
         ORDER BY started_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

/// Attaches a dog to a session. Attaching twice is a no-op.
#[instrument(skip(pool))]
pub async fn add_dog(pool: &Pool<Sqlite>, session_id: i64, dog_id: i64) -> Result<(), AppError> {
    info!("Adding dog to session");
    require_positive_id("session_id", session_id)?;
    require_positive_id("dog_id", dog_id)?;

    sqlx::query(
        "INSERT INTO session_dogs (session_id, dog_id) VALUES (?, ?)
         ON CONFLICT (session_id, dog_id) DO NOTHING",
    )
    .bind(session_id)
    .bind(dog_id)
    .execute(pool)
    .await
    .map_err(|e| {
        write_error(
            e,
            "dog already attached to session",
            "session or dog does not exist",
        )
    })?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_dogs(pool: &Pool<Sqlite>, session_id: i64) -> Result<Vec<Dog>, AppError> {
    info!("Listing dogs in session");
    let dogs = sqlx::query_as::<_, Dog>(
        "SELECT d.id, d.name, d.callname, d.birthdate
         FROM dogs d
         JOIN session_dogs sd ON sd.dog_id = d.id
         WHERE sd.session_id = ?
         ORDER BY d.name, d.id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(dogs)
}
