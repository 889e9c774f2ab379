#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod catalog;
mod config;
mod db;
mod dogs;
mod env;
mod error;
mod models;
mod proficiency;
mod rounds;
mod sessions;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_add_session_dog, api_close_session, api_create_behavior, api_create_dog,
    api_create_exercise, api_create_session, api_create_skill, api_delete_behavior,
    api_delete_dog, api_delete_exercise, api_delete_skill, api_dog_proficiency, api_get_session,
    api_link_behavior_exercise, api_list_behaviors, api_list_dog_rounds, api_list_dogs,
    api_list_exercises, api_list_links, api_list_session_dogs, api_list_session_rounds,
    api_list_sessions, api_list_skills, api_login, api_logout, api_me, api_record_round,
    api_register, api_unlink_behavior_exercise, api_update_behavior, api_update_dog,
    api_update_exercise, api_update_session, api_update_skill, bad_request_api,
    internal_error_api, not_found_api, unprocessable_api, health,
};
use auth::{forbidden_api, unauthorized_api};
use config::AppConfig;
use error::AppError;
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment()?;
    let _otel_guard = init_tracing();

    let figment = AppConfig::figment();
    let config = AppConfig::from_figment(&figment)?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Migrations completed successfully");

    init_rocket(pool, figment, config).launch().await?;
    Ok(())
}

pub fn init_rocket(pool: SqlitePool, figment: Figment, config: AppConfig) -> Rocket<Build> {
    info!("Starting SAR training tracker");

    rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .mount(
            "/",
            routes![
                health,
                api_register,
                api_login,
                api_logout,
                api_me,
                api_create_skill,
                api_list_skills,
                api_update_skill,
                api_delete_skill,
                api_create_behavior,
                api_list_behaviors,
                api_update_behavior,
                api_delete_behavior,
                api_create_exercise,
                api_list_exercises,
                api_update_exercise,
                api_delete_exercise,
                api_link_behavior_exercise,
                api_list_links,
                api_unlink_behavior_exercise,
                api_create_dog,
                api_list_dogs,
                api_update_dog,
                api_delete_dog,
                api_list_dog_rounds,
                api_dog_proficiency,
                api_create_session,
                api_list_sessions,
                api_get_session,
                api_update_session,
                api_close_session,
                api_add_session_dog,
                api_list_session_dogs,
                api_record_round,
                api_list_session_rounds,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .attach(TelemetryFairing)
}
