use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::{AppError, delete_error};
use crate::models::Dog;
use crate::validation::{optional_text, parse_date, required_text};

#[instrument(skip(pool))]
pub async fn create_dog(
    pool: &Pool<Sqlite>,
    name: &str,
    callname: Option<String>,
    birthdate: Option<&str>,
) -> Result<Dog, AppError> {
    info!("Creating dog");
    let name = required_text("name", name)?;
    let birthdate = parse_date("birthdate", birthdate)?;

    let dog = sqlx::query_as::<_, Dog>(
        "INSERT INTO dogs (name, callname, birthdate) VALUES (?, ?, ?)
         RETURNING id, name, callname, birthdate",
    )
    .bind(name)
    .bind(optional_text(callname))
    .bind(birthdate)
    .fetch_one(pool)
    .await?;

    Ok(dog)
}

#[instrument(skip(pool))]
pub async fn get_dog(pool: &Pool<Sqlite>, id: i64) -> Result<Dog, AppError> {
    let dog = sqlx::query_as::<_, Dog>("SELECT id, name, callname, birthdate FROM dogs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    dog.ok_or_else(|| AppError::NotFound(format!("dog {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn list_dogs(pool: &Pool<Sqlite>) -> Result<Vec<Dog>, AppError> {
    info!("Listing dogs");
    let dogs =
        sqlx::query_as::<_, Dog>("SELECT id, name, callname, birthdate FROM dogs ORDER BY name, id")
            .fetch_all(pool)
            .await?;

    Ok(dogs)
}

#[instrument(skip(pool))]
pub async fn update_dog(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    callname: Option<String>,
    birthdate: Option<&str>,
) -> Result<Dog, AppError> {
    info!("Updating dog");
    let name = required_text("name", name)?;
    let birthdate = parse_date("birthdate", birthdate)?;

    let dog = sqlx::query_as::<_, Dog>(
        "UPDATE dogs SET name = ?, callname = ?, birthdate = ? WHERE id = ?
         RETURNING id, name, callname, birthdate",
    )
    .bind(name)
    .bind(optional_text(callname))
    .bind(birthdate)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    dog.ok_or_else(|| AppError::NotFound(format!("dog {} not found", id)))
}

#[instrument(skip(pool))]
pub async fn delete_dog(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting dog");
    let result = sqlx::query("DELETE FROM dogs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| delete_error(e, "dog has recorded rounds"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("dog {} not found", id)));
    }
    Ok(())
}
