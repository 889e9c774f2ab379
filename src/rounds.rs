use chrono::Utc;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tracing::{error, info, instrument};

use crate::error::{AppError, write_error};
use crate::models::{DbRound, Outcome, Round};
use crate::proficiency;
use crate::validation::{optional_text, parse_timestamp, require_positive_id};

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 10;

const ROUND_COLUMNS: &str = "id, session_id, round_number, dog_id, exercise_id, \
     planned_behavior_id, exhibited_behavior_id, exhibited_free_text, outcome, score, \
     notes, started_at, ended_at, created_at";

/// One training round as submitted by a handler. Values are raw; they are
/// checked by [`record_round`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordRound {
    pub session_id: i64,
    pub dog_id: i64,
    pub exercise_id: i64,
    pub planned_behavior_id: i64,
    pub exhibited_behavior_id: Option<i64>,
    pub exhibited_free_text: Option<String>,
    pub outcome: String,
    pub score: Option<i64>,
    pub notes: Option<String>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
}

/// Appends a round for `(session_id, dog_id)` and assigns it the next round
/// number in that scope. Proficiency is updated afterwards; a failure there is
/// logged and does not undo the round.
#[instrument(skip(pool, cmd), fields(session_id = cmd.session_id, dog_id = cmd.dog_id))]
pub async fn record_round(pool: &Pool<Sqlite>, cmd: RecordRound) -> Result<Round, AppError> {
    info!("Recording round");

    require_positive_id("session_id", cmd.session_id)?;
    require_positive_id("dog_id", cmd.dog_id)?;
    require_positive_id("exercise_id", cmd.exercise_id)?;
    require_positive_id("planned_behavior_id", cmd.planned_behavior_id)?;
    if let Some(exhibited) = cmd.exhibited_behavior_id {
        require_positive_id("exhibited_behavior_id", exhibited)?;
    }
    let outcome: Outcome = cmd.outcome.parse()?;
    if let Some(score) = cmd.score {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(AppError::Validation(format!(
                "score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
    }
    let started_at = parse_timestamp("started_at", cmd.started_at.as_deref())?;
    let ended_at = parse_timestamp("ended_at", cmd.ended_at.as_deref())?;

    // The write lock is taken before MAX() is evaluated, so concurrent
    // recorders for the same scope serialize on this statement.
    let sql = format!(
        "INSERT INTO rounds (session_id, dog_id, round_number, exercise_id, planned_behavior_id,
             exhibited_behavior_id, exhibited_free_text, outcome, score, notes,
             started_at, ended_at, created_at)
         SELECT ?1, ?2, COALESCE(MAX(round_number), 0) + 1, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
         FROM rounds WHERE session_id = ?1 AND dog_id = ?2
         RETURNING {}",
        ROUND_COLUMNS
    );

    let row = sqlx::query_as::<_, DbRound>(&sql)
        .bind(cmd.session_id)
        .bind(cmd.dog_id)
        .bind(cmd.exercise_id)
        .bind(cmd.planned_behavior_id)
        .bind(cmd.exhibited_behavior_id)
        .bind(optional_text(cmd.exhibited_free_text))
        .bind(outcome.as_str())
        .bind(cmd.score)
        .bind(optional_text(cmd.notes))
        .bind(started_at)
        .bind(ended_at)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            write_error(
                e,
                "round number already taken, retry the request",
                "session, dog, exercise or behavior does not exist",
            )
        })?;

    let round = Round::try_from(row)?;
    info!(
        round_id = round.id,
        round_number = round.round_number,
        "Round recorded"
    );

    if let Err(err) = proficiency::apply(pool, &round).await {
        error!(round_id = round.id, error = %err, "Failed to update proficiency");
    }

    Ok(round)
}

#[instrument(skip(pool))]
pub async fn list_rounds(pool: &Pool<Sqlite>, session_id: i64) -> Result<Vec<Round>, AppError> {
    info!("Listing rounds for session");
    let sql = format!(
        "SELECT {} FROM rounds WHERE session_id = ? ORDER BY round_number, dog_id",
        ROUND_COLUMNS
    );
    let rows = sqlx::query_as::<_, DbRound>(&sql)
        .bind(session_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Round::try_from).collect()
}

#[instrument(skip(pool))]
pub async fn list_rounds_by_dog(pool: &Pool<Sqlite>, dog_id: i64) -> Result<Vec<Round>, AppError> {
    info!("Listing rounds for dog");
    let sql = format!(
        "SELECT {} FROM rounds WHERE dog_id = ? ORDER BY session_id, round_number",
        ROUND_COLUMNS
    );
    let rows = sqlx::query_as::<_, DbRound>(&sql)
        .bind(dog_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Round::try_from).collect()
}
