use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::{AppError, delete_error, write_error};
use crate::models::{Behavior, BehaviorExerciseLink, Exercise, Skill};
use crate::validation::{optional_text, require_positive_id, required_text};

pub const MIN_LINK_STRENGTH: i64 = 1;
pub const MAX_LINK_STRENGTH: i64 = 5;

#[instrument(skip(pool))]
pub async fn create_skill(
    pool: &Pool<Sqlite>,
    name: &str,
    description: Option<String>,
) -> Result<Skill, AppError> {
    info!("Creating skill");
    let name = required_text("name", name)?;
    let now = Utc::now();

    let skill = sqlx::query_as::<_, Skill>(
        "INSERT INTO skills (name, description, created_at, updated_at)
         VALUES (?, ?, ?, ?)
         RETURNING id, name, description, created_at, updated_at",
    )
    .bind(&name)
    .bind(optional_text(description))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| write_error(e, &format!("skill '{}' already exists", name), "invalid skill"))?;

    Ok(skill)
}

#[instrument(skip(pool))]
pub async fn list_skills(pool: &Pool<Sqlite>) -> Result<Vec<Skill>, AppError> {
    info!("Listing skills");
    let skills = sqlx::query_as::<_, Skill>(
        "SELECT id, name, description, created_at, updated_at FROM skills ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(skills)
}

#[instrument(skip(pool))]
pub async fn update_skill(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    description: Option<String>,
) -> Result<Skill, AppError> {
    info!("Updating skill");
    require_positive_id("id", id)?;
    let name = required_text("name", name)?;

    let skill = sqlx::query_as::<_, Skill>(
        "UPDATE skills SET name = ?, description = ?, updated_at = ?
         WHERE id = ?
         RETURNING id, name, description, created_at, updated_at",
    )
    .bind(&name)
    .bind(optional_text(description))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| write_error(e, &format!("skill '{}' already exists", name), "invalid skill"))?;

    skill.ok_or_else(|| AppError::NotFound(format!("skill {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn delete_skill(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting skill");
    let result = sqlx::query("DELETE FROM skills WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| delete_error(e, "skill still has behaviors"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("skill {} not found", id)));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn create_behavior(
    pool: &Pool<Sqlite>,
    skill_id: i64,
    name: &str,
    description: Option<String>,
) -> Result<Behavior, AppError> {
    info!("Creating behavior");
    require_positive_id("skill_id", skill_id)?;
    let name = required_text("name", name)?;
    let now = Utc::now();

    let behavior = sqlx::query_as::<_, Behavior>(
        "INSERT INTO behaviors (skill_id, name, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id, skill_id, name, description, created_at, updated_at",
    )
    .bind(skill_id)
    .bind(&name)
    .bind(optional_text(description))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        write_error(
            e,
            &format!("behavior '{}' already exists for skill {}", name, skill_id),
            &format!("skill {} does not exist", skill_id),
        )
    })?;

    Ok(behavior)
}

#[instrument(skip(pool))]
pub async fn list_behaviors(
    pool: &Pool<Sqlite>,
    skill_id: Option<i64>,
) -> Result<Vec<Behavior>, AppError> {
    info!("Listing behaviors");
    let behaviors = match skill_id {
        Some(skill_id) => {
            sqlx::query_as::<_, Behavior>(
                "SELECT id, skill_id, name, description, created_at, updated_at
                 FROM behaviors WHERE skill_id = ? ORDER BY name",
            )
            .bind(skill_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Behavior>(
                "SELECT id, skill_id, name, description, created_at, updated_at
                 FROM behaviors ORDER BY name",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(behaviors)
}

#[instrument(skip(pool))]
pub async fn update_behavior(
    pool: &Pool<Sqlite>,
    id: i64,
    skill_id: i64,
    name: &str,
    description: Option<String>,
) -> Result<Behavior, AppError> {
    info!("Updating behavior");
    require_positive_id("id", id)?;
    require_positive_id("skill_id", skill_id)?;
    let name = required_text("name", name)?;

    let behavior = sqlx::query_as::<_, Behavior>(
        "UPDATE behaviors SET skill_id = ?, name = ?, description = ?, updated_at = ?
         WHERE id = ?
         RETURNING id, skill_id, name, description, created_at, updated_at",
    )
    .bind(skill_id)
    .bind(&name)
    .bind(optional_text(description))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        write_error(
            e,
            &format!("behavior '{}' already exists for skill {}", name, skill_id),
            &format!("skill {} does not exist", skill_id),
        )
    })?;

    behavior.ok_or_else(|| AppError::NotFound(format!("behavior {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn delete_behavior(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting behavior");
    let result = sqlx::query("DELETE FROM behaviors WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| delete_error(e, "behavior is referenced by recorded rounds"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("behavior {} not found", id)));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn create_exercise(
    pool: &Pool<Sqlite>,
    name: &str,
    description: Option<String>,
) -> Result<Exercise, AppError> {
    info!("Creating exercise");
    let name = required_text("name", name)?;
    let now = Utc::now();

    let exercise = sqlx::query_as::<_, Exercise>(
        "INSERT INTO exercises (name, description, created_at, updated_at)
         VALUES (?, ?, ?, ?)
         RETURNING id, name, description, created_at, updated_at",
    )
    .bind(&name)
    .bind(optional_text(description))
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        write_error(e, &format!("exercise '{}' already exists", name), "invalid exercise")
    })?;

    Ok(exercise)
}

/// Lists exercises, optionally only those linked to `behavior_id`.
#[instrument(skip(pool))]
pub async fn list_exercises(
    pool: &Pool<Sqlite>,
    behavior_id: Option<i64>,
) -> Result<Vec<Exercise>, AppError> {
    info!("Listing exercises");
    let exercises = match behavior_id {
        Some(behavior_id) => {
            sqlx::query_as::<_, Exercise>(
                "SELECT e.id, e.name, e.description, e.created_at, e.updated_at
                 FROM exercises e
                 JOIN behavior_exercises be ON be.exercise_id = e.id
                 WHERE be.behavior_id = ?
                 ORDER BY e.name",
            )
            .bind(behavior_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Exercise>(
                "SELECT id, name, description, created_at, updated_at FROM exercises ORDER BY name",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(exercises)
}

#[instrument(skip(pool))]
pub async fn update_exercise(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    description: Option<String>,
) -> Result<Exercise, AppError> {
    info!("Updating exercise");
    require_positive_id("id", id)?;
    let name = required_text("name", name)?;

    let exercise = sqlx::query_as::<_, Exercise>(
        "UPDATE exercises SET name = ?, description = ?, updated_at = ?
         WHERE id = ?
         RETURNING id, name, description, created_at, updated_at",
    )
    .bind(&name)
    .bind(optional_text(description))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        write_error(e, &format!("exercise '{}' already exists", name), "invalid exercise")
    })?;

    exercise.ok_or_else(|| AppError::NotFound(format!("exercise {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn delete_exercise(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting exercise");
    let result = sqlx::query("DELETE FROM exercises WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| delete_error(e, "exercise is referenced by recorded rounds"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("exercise {} not found", id)));
    }
    Ok(())
}

/// Links a behavior to an exercise. Re-linking the same pair replaces the
/// strength.
#[instrument(skip(pool))]
pub async fn link_behavior_exercise(
    pool: &Pool<Sqlite>,
    behavior_id: i64,
    exercise_id: i64,
    strength: i64,
) -> Result<BehaviorExerciseLink, AppError> {
    info!("Linking behavior to exercise");
    require_positive_id("behavior_id", behavior_id)?;
    require_positive_id("exercise_id", exercise_id)?;
    if !(MIN_LINK_STRENGTH..=MAX_LINK_STRENGTH).contains(&strength) {
        return Err(AppError::Validation(format!(
            "strength must be between {} and {}",
            MIN_LINK_STRENGTH, MAX_LINK_STRENGTH
        )));
    }

    let link = sqlx::query_as::<_, BehaviorExerciseLink>(
        "INSERT INTO behavior_exercises (behavior_id, exercise_id, strength)
         VALUES (?, ?, ?)
         ON CONFLICT (behavior_id, exercise_id) DO UPDATE SET strength = excluded.strength
         RETURNING behavior_id, exercise_id, strength",
    )
    .bind(behavior_id)
    .bind(exercise_id)
    .bind(strength)
    .fetch_one(pool)
    .await
    .map_err(|e| write_error(e, "link already exists", "behavior or exercise does not exist"))?;

    Ok(link)
}

#[instrument(skip(pool))]
pub async fn list_links(
    pool: &Pool<Sqlite>,
    behavior_id: Option<i64>,
    exercise_id: Option<i64>,
) -> Result<Vec<BehaviorExerciseLink>, AppError> {
    info!("Listing behavior-exercise links");
    let links = sqlx::query_as::<_, BehaviorExerciseLink>(
        "SELECT behavior_id, exercise_id, strength FROM behavior_exercises
         WHERE (?1 IS NULL OR behavior_id = ?1)
           AND (?2 IS NULL OR exercise_id = ?2)
         ORDER BY behavior_id, exercise_id",
    )
    .bind(behavior_id)
    .bind(exercise_id)
    .fetch_all(pool)
    .await?;

    Ok(links)
}

#[instrument(skip(pool))]
pub async fn unlink_behavior_exercise(
    pool: &Pool<Sqlite>,
    behavior_id: i64,
    exercise_id: i64,
) -> Result<(), AppError> {
    info!("Unlinking behavior from exercise");
    let result =
        sqlx::query("DELETE FROM behavior_exercises WHERE behavior_id = ? AND exercise_id = ?")
            .bind(behavior_id)
            .bind(exercise_id)
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "behavior {} is not linked to exercise {}",
            behavior_id, exercise_id
        )));
    }
    Ok(())
}
