use chrono::{Duration, Utc};
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::json::{self, Json};
use rocket::serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{AUTH_COOKIE, AuthToken, PresentedToken, User};
use crate::catalog;
use crate::config::AppConfig;
use crate::db::{
    authenticate_user, count_users, create_auth_token, create_user, ping, purge_expired_tokens,
    revoke_auth_token,
};
use crate::dogs;
use crate::error::{AppError, ErrorBody};
use crate::models::{
    Behavior, BehaviorExerciseLink, Dog, DogBehaviorProficiency, Exercise, Round, Session, Skill,
};
use crate::proficiency;
use crate::rounds::{self, RecordRound};
use crate::sessions;
use crate::validation::JsonValidateExt;

type Created<T> = Custom<Json<T>>;

fn created<T>(value: T) -> Created<T> {
    Custom(Status::Created, Json(value))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OkResponse {
    pub ok: bool,
}

/// Reads a JSON body that may be left out entirely. An empty body yields the
/// default request; anything else must parse.
fn optional_body<T: Default>(body: Result<Json<T>, json::Error<'_>>) -> Result<T, AppError> {
    match body {
        Ok(body) => Ok(body.into_inner()),
        Err(json::Error::Parse(raw, _)) if raw.trim().is_empty() => Ok(T::default()),
        Err(err) => Err(AppError::Validation(format!("invalid request body: {}", err))),
    }
}

impl OkResponse {
    fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

#[get("/health")]
pub async fn health(db: &State<Pool<Sqlite>>) -> Result<Json<OkResponse>, Custom<Json<ErrorBody>>> {
    match ping(db).await {
        Ok(()) => Ok(OkResponse::ok()),
        Err(err) => {
            err.log_and_record("Health check");
            Err(Custom(
                Status::ServiceUnavailable,
                Json(ErrorBody::new("storage unavailable")),
            ))
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "email must be a valid address"))]
    email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    password: String,
    #[serde(default)]
    is_admin: bool,
}

/// Open while the user table is empty; the first account becomes the
/// administrator. After that only administrators may register users.
#[post("/auth/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegisterRequest>,
    user: Option<User>,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<User>, AppError> {
    let validated = registration.validated()?;

    let is_admin = if count_users(db).await? == 0 {
        true
    } else {
        match user {
            Some(user) => user.require_admin()?,
            None => return Err(AppError::Authentication("login required".to_string())),
        }
        validated.is_admin
    };

    let created_user = create_user(db, &validated.email, &validated.password, is_admin).await?;
    Ok(created(created_user))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, AppError> {
    let login = login.into_inner();

    let Some(user) = authenticate_user(db, &login.email, &login.password).await? else {
        return Err(AppError::Authentication(
            "invalid email or password".to_string(),
        ));
    };

    let purged = purge_expired_tokens(db).await?;
    if purged > 0 {
        tracing::info!(purged, "Purged expired auth tokens");
    }

    let token = AuthToken::generate_token();
    let expires_at = Utc::now() + Duration::hours(config.token_ttl_hours);
    create_auth_token(db, user.id, &token, expires_at).await?;

    cookies.add_private(
        Cookie::build((AUTH_COOKIE, token.clone()))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(config.token_ttl_hours)),
    );

    Ok(Json(LoginResponse { token, user }))
}

#[post("/auth/logout")]
pub async fn api_logout(
    _user: User,
    token: PresentedToken,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    revoke_auth_token(db, &token.0).await?;
    cookies.remove_private(Cookie::build(AUTH_COOKIE));
    Ok(Status::NoContent)
}

#[get("/auth/me")]
pub async fn api_me(user: User) -> Json<User> {
    Json(user)
}

#[derive(Deserialize, Validate)]
pub struct CatalogEntryRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "name must be at most 200 characters"))]
    name: String,
    description: Option<String>,
}

#[post("/skills", data = "<skill>")]
pub async fn api_create_skill(
    skill: Json<CatalogEntryRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Skill>, AppError> {
    let skill = skill.validated()?;
    let created_skill = catalog::create_skill(db, &skill.name, skill.description).await?;
    Ok(created(created_skill))
}

#[get("/skills")]
pub async fn api_list_skills(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Skill>>, AppError> {
    Ok(Json(catalog::list_skills(db).await?))
}

#[put("/skills/<id>", data = "<skill>")]
pub async fn api_update_skill(
    id: i64,
    skill: Json<CatalogEntryRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Skill>, AppError> {
    let skill = skill.validated()?;
    Ok(Json(
        catalog::update_skill(db, id, &skill.name, skill.description).await?,
    ))
}

#[delete("/skills/<id>")]
pub async fn api_delete_skill(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    catalog::delete_skill(db, id).await?;
    Ok(Status::NoContent)
}

#[derive(Deserialize, Validate)]
pub struct BehaviorRequest {
    #[serde(default)]
    skill_id: i64,
    #[serde(default)]
    #[validate(length(max = 200, message = "name must be at most 200 characters"))]
    name: String,
    description: Option<String>,
}

#[post("/behaviors", data = "<behavior>")]
pub async fn api_create_behavior(
    behavior: Json<BehaviorRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Behavior>, AppError> {
    let behavior = behavior.validated()?;
    let created_behavior = catalog::create_behavior(
        db,
        behavior.skill_id,
        &behavior.name,
        behavior.description,
    )
    .await?;
    Ok(created(created_behavior))
}

#[get("/behaviors?<skill_id>")]
pub async fn api_list_behaviors(
    skill_id: Option<i64>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Behavior>>, AppError> {
    Ok(Json(catalog::list_behaviors(db, skill_id).await?))
}

#[put("/behaviors/<id>", data = "<behavior>")]
pub async fn api_update_behavior(
    id: i64,
    behavior: Json<BehaviorRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Behavior>, AppError> {
    let behavior = behavior.validated()?;
    Ok(Json(
        catalog::update_behavior(
            db,
            id,
            behavior.skill_id,
            &behavior.name,
            behavior.description,
        )
        .await?,
    ))
}

#[delete("/behaviors/<id>")]
pub async fn api_delete_behavior(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    catalog::delete_behavior(db, id).await?;
    Ok(Status::NoContent)
}

#[post("/exercises", data = "<exercise>")]
pub async fn api_create_exercise(
    exercise: Json<CatalogEntryRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Exercise>, AppError> {
    let exercise = exercise.validated()?;
    let created_exercise =
        catalog::create_exercise(db, &exercise.name, exercise.description).await?;
    Ok(created(created_exercise))
}

#[get("/exercises?<behavior_id>")]
pub async fn api_list_exercises(
    behavior_id: Option<i64>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Exercise>>, AppError> {
    Ok(Json(catalog::list_exercises(db, behavior_id).await?))
}

#[put("/exercises/<id>", data = "<exercise>")]
pub async fn api_update_exercise(
    id: i64,
    exercise: Json<CatalogEntryRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Exercise>, AppError> {
    let exercise = exercise.validated()?;
    Ok(Json(
        catalog::update_exercise(db, id, &exercise.name, exercise.description).await?,
    ))
}

#[delete("/exercises/<id>")]
pub async fn api_delete_exercise(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    catalog::delete_exercise(db, id).await?;
    Ok(Status::NoContent)
}

#[derive(Deserialize, Validate)]
pub struct LinkRequest {
    #[serde(default)]
    behavior_id: i64,
    #[serde(default)]
    exercise_id: i64,
    #[serde(default)]
    #[validate(range(min = 1, max = 5, message = "strength must be between 1 and 5"))]
    strength: i64,
}

#[post("/behavior-exercises", data = "<link>")]
pub async fn api_link_behavior_exercise(
    link: Json<LinkRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BehaviorExerciseLink>, AppError> {
    let link = link.validated()?;
    Ok(Json(
        catalog::link_behavior_exercise(db, link.behavior_id, link.exercise_id, link.strength)
            .await?,
    ))
}

#[get("/behavior-exercises?<behavior_id>&<exercise_id>")]
pub async fn api_list_links(
    behavior_id: Option<i64>,
    exercise_id: Option<i64>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<BehaviorExerciseLink>>, AppError> {
    Ok(Json(
        catalog::list_links(db, behavior_id, exercise_id).await?,
    ))
}

#[delete("/behavior-exercises/<behavior_id>/<exercise_id>")]
pub async fn api_unlink_behavior_exercise(
    behavior_id: i64,
    exercise_id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    catalog::unlink_behavior_exercise(db, behavior_id, exercise_id).await?;
    Ok(Status::NoContent)
}

#[derive(Deserialize, Validate)]
pub struct DogRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "name must be at most 200 characters"))]
    name: String,
    callname: Option<String>,
    birthdate: Option<String>,
}

#[post("/dogs", data = "<dog>")]
pub async fn api_create_dog(
    dog: Json<DogRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Dog>, AppError> {
    let dog = dog.validated()?;
    let created_dog =
        dogs::create_dog(db, &dog.name, dog.callname, dog.birthdate.as_deref()).await?;
    Ok(created(created_dog))
}

#[get("/dogs")]
pub async fn api_list_dogs(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Dog>>, AppError> {
    Ok(Json(dogs::list_dogs(db).await?))
}

#[put("/dogs/<id>", data = "<dog>")]
pub async fn api_update_dog(
    id: i64,
    dog: Json<DogRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Dog>, AppError> {
    let dog = dog.validated()?;
    Ok(Json(
        dogs::update_dog(db, id, &dog.name, dog.callname, dog.birthdate.as_deref()).await?,
    ))
}

#[delete("/dogs/<id>")]
pub async fn api_delete_dog(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, AppError> {
    dogs::delete_dog(db, id).await?;
    Ok(Status::NoContent)
}

#[get("/dogs/<id>/rounds")]
pub async fn api_list_dog_rounds(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Round>>, AppError> {
    dogs::get_dog(db, id).await?;
    Ok(Json(rounds::list_rounds_by_dog(db, id).await?))
}

#[get("/dogs/<id>/proficiency")]
pub async fn api_dog_proficiency(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<DogBehaviorProficiency>>, AppError> {
    dogs::get_dog(db, id).await?;
    Ok(Json(proficiency::list_for_dog(db, id).await?))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SessionRequest {
    started_at: Option<String>,
    location: Option<String>,
    notes: Option<String>,
}

#[post("/sessions", data = "<session>")]
pub async fn api_create_session(
    session: Result<Json<SessionRequest>, json::Error<'_>>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Session>, AppError> {
    let session = optional_body(session)?;
    let created_session = sessions::create_session(
        db,
        session.started_at.as_deref(),
        session.location,
        session.notes,
    )
    .await?;
    Ok(created(created_session))
}

#[get("/sessions")]
pub async fn api_list_sessions(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Session>>, AppError> {
    Ok(Json(sessions::list_sessions(db).await?))
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(sessions::get_session(db, id).await?))
}

#[put("/sessions/<id>", data = "<session>")]
pub async fn api_update_session(
    id: i64,
    session: Json<SessionRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Session>, AppError> {
    let session = session.into_inner();
    Ok(Json(
        sessions::update_session(
            db,
            id,
            session.started_at.as_deref(),
            session.location,
            session.notes,
        )
        .await?,
    ))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CloseSessionRequest {
    ended_at: Option<String>,
}

/// Closes the session. The body may be omitted; `ended_at` defaults to now.
#[patch("/sessions/<id>", data = "<close>")]
pub async fn api_close_session(
    id: i64,
    close: Result<Json<CloseSessionRequest>, json::Error<'_>>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Session>, AppError> {
    let close = optional_body(close)?;
    Ok(Json(
        sessions::close_session(db, id, close.ended_at.as_deref()).await?,
    ))
}

#[derive(Deserialize)]
pub struct AddDogRequest {
    #[serde(default)]
    dog_id: i64,
}

#[post("/sessions/<id>/dogs", data = "<request>")]
pub async fn api_add_session_dog(
    id: i64,
    request: Json<AddDogRequest>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OkResponse>, AppError> {
    sessions::add_dog(db, id, request.dog_id).await?;
    Ok(OkResponse::ok())
}

#[get("/sessions/<id>/dogs")]
pub async fn api_list_session_dogs(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Dog>>, AppError> {
    sessions::get_session(db, id).await?;
    Ok(Json(sessions::list_dogs(db, id).await?))
}

#[post("/sessions/<id>/rounds", data = "<round>")]
pub async fn api_record_round(
    id: i64,
    round: Json<RecordRound>,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Created<Round>, AppError> {
    let cmd = RecordRound {
        session_id: id,
        ..round.into_inner()
    };
    Ok(created(rounds::record_round(db, cmd).await?))
}

#[get("/sessions/<id>/rounds")]
pub async fn api_list_session_rounds(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Round>>, AppError> {
    sessions::get_session(db, id).await?;
    Ok(Json(rounds::list_rounds(db, id).await?))
}

#[catch(400)]
pub fn bad_request_api() -> Custom<Json<ErrorBody>> {
    Custom(Status::BadRequest, Json(ErrorBody::new("malformed request")))
}

/// Bodies that parse as JSON but do not fit the expected shape.
#[catch(422)]
pub fn unprocessable_api() -> Custom<Json<ErrorBody>> {
    Custom(Status::BadRequest, Json(ErrorBody::new("invalid request body")))
}

#[catch(404)]
pub fn not_found_api() -> Custom<Json<ErrorBody>> {
    Custom(Status::NotFound, Json(ErrorBody::new("not found")))
}

#[catch(500)]
pub fn internal_error_api() -> Custom<Json<ErrorBody>> {
    Custom(
        Status::InternalServerError,
        Json(ErrorBody::new("internal server error")),
    )
}
