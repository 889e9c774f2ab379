use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::models::{DogBehaviorProficiency, Outcome, Round};

/// Level granted for a strong, successful round.
pub const MASTERED_LEVEL: i64 = 4;
pub const MASTERED_MIN_SCORE: i64 = 8;

/// The level a round earns for its planned behavior, if any.
pub fn assess(outcome: Outcome, score: Option<i64>) -> Option<i64> {
    match (outcome, score) {
        (Outcome::Success, Some(score)) if score >= MASTERED_MIN_SCORE => Some(MASTERED_LEVEL),
        _ => None,
    }
}

/// Raises the dog's level for the round's planned behavior. Levels only go
/// up; rounds that earn nothing leave the row alone.
#[instrument(skip(pool, round), fields(round_id = round.id, dog_id = round.dog_id))]
pub async fn apply(pool: &Pool<Sqlite>, round: &Round) -> Result<(), AppError> {
    let Some(level) = assess(round.outcome, round.score) else {
        debug!("Round does not change proficiency");
        return Ok(());
    };

    info!(
        behavior_id = round.planned_behavior_id,
        level, "Updating proficiency"
    );
    sqlx::query(
        "INSERT INTO dog_behavior_proficiency (dog_id, behavior_id, level, last_round_id, updated_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (dog_id, behavior_id) DO UPDATE SET
             level = MAX(level, excluded.level),
             last_round_id = excluded.last_round_id,
             updated_at = excluded.updated_at",
    )
    .bind(round.dog_id)
    .bind(round.planned_behavior_id)
    .bind(level)
    .bind(round.id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_for_dog(
    pool: &Pool<Sqlite>,
    dog_id: i64,
) -> Result<Vec<DogBehaviorProficiency>, AppError> {
    info!("Listing proficiency for dog");
    let rows = sqlx::query_as::<_, DogBehaviorProficiency>(
        "SELECT dog_id, behavior_id, level, last_round_id, updated_at
         FROM dog_behavior_proficiency WHERE dog_id = ? ORDER BY behavior_id",
    )
    .bind(dog_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_thresholds() {
        assert_eq!(assess(Outcome::Success, Some(8)), Some(MASTERED_LEVEL));
        assert_eq!(assess(Outcome::Success, Some(10)), Some(MASTERED_LEVEL));
        assert_eq!(assess(Outcome::Success, Some(7)), None);
        assert_eq!(assess(Outcome::Success, None), None);
        assert_eq!(assess(Outcome::Partial, Some(9)), None);
        assert_eq!(assess(Outcome::Fail, Some(10)), None);
    }
}
