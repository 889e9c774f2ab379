use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Behavior {
    pub id: i64,
    pub skill_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BehaviorExerciseLink {
    pub behavior_id: i64,
    pub exercise_id: i64,
    pub strength: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dog {
    pub id: i64,
    pub name: String,
    pub callname: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Fail,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Fail => "fail",
        }
    }
}

impl FromStr for Outcome {
    type Err = AppError;

    /// Accepts any casing and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "fail" => Ok(Outcome::Fail),
            other => Err(AppError::Validation(format!(
                "outcome must be one of success, partial, fail (got '{}')",
                other
            ))),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub session_id: i64,
    pub round_number: i64,
    pub dog_id: i64,
    pub exercise_id: i64,
    pub planned_behavior_id: i64,
    pub exhibited_behavior_id: Option<i64>,
    pub exhibited_free_text: Option<String>,
    pub outcome: Outcome,
    pub score: Option<i64>,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbRound {
    pub id: i64,
    pub session_id: i64,
    pub round_number: i64,
    pub dog_id: i64,
    pub exercise_id: i64,
    pub planned_behavior_id: i64,
    pub exhibited_behavior_id: Option<i64>,
    pub exhibited_free_text: Option<String>,
    pub outcome: String,
    pub score: Option<i64>,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbRound> for Round {
    type Error = AppError;

    fn try_from(db: DbRound) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id,
            session_id: db.session_id,
            round_number: db.round_number,
            dog_id: db.dog_id,
            exercise_id: db.exercise_id,
            planned_behavior_id: db.planned_behavior_id,
            exhibited_behavior_id: db.exhibited_behavior_id,
            exhibited_free_text: db.exhibited_free_text,
            outcome: db.outcome.parse().map_err(|_| {
                AppError::Internal(format!("Round {} has unknown outcome '{}'", db.id, db.outcome))
            })?,
            score: db.score,
            notes: db.notes,
            started_at: db.started_at,
            ended_at: db.ended_at,
            created_at: db.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DogBehaviorProficiency {
    pub dog_id: i64,
    pub behavior_id: i64,
    pub level: i64,
    pub last_round_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}
