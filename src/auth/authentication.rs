use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;

use crate::db::{get_auth_token, get_user};
use crate::error::{AppError, ErrorBody};

use super::User;

pub const AUTH_COOKIE: &str = "auth_token";

/// Pulls the presented credential from `Authorization: Bearer ...`, falling
/// back to the private auth cookie.
pub fn presented_token(request: &Request<'_>) -> Option<String> {
    let bearer = request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        request
            .cookies()
            .get_private(AUTH_COOKIE)
            .map(|c| c.value().to_string())
    })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let Some(token) = presented_token(request) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let db = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            _ => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match get_auth_token(db, &token).await {
            Ok(auth_token) => {
                if !auth_token.is_valid() {
                    tracing::warn!(user_id = auth_token.user_id, "Auth token expired");
                    return Outcome::Error((Status::Unauthorized, ()));
                }

                match get_user(db, auth_token.user_id).await {
                    Ok(user) => {
                        tracing::debug!(user_id = user.id, "User authenticated via token");
                        Outcome::Success(user)
                    }
                    Err(err) => {
                        tracing::error!(user_id = auth_token.user_id, error = ?err, "Failed to fetch user for valid token");
                        Outcome::Error((Status::InternalServerError, ()))
                    }
                }
            }
            Err(AppError::Authentication(_)) => {
                tracing::warn!("Unknown auth token presented");
                Outcome::Error((Status::Unauthorized, ()))
            }
            Err(err) => {
                err.log_and_record("Auth token lookup");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ErrorBody>> {
    Custom(Status::Unauthorized, Json(ErrorBody::new("unauthorized")))
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ErrorBody>> {
    tracing::warn!("Forbidden access attempt");
    Custom(Status::Forbidden, Json(ErrorBody::new("forbidden")))
}

/// The raw credential the client presented, for handlers that act on the
/// token itself.
pub struct PresentedToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PresentedToken {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match presented_token(request) {
            Some(token) => Outcome::Success(PresentedToken(token)),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}
