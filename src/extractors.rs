use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repository;

/// The identity named by a valid session bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

/// Returns 401 for a missing, malformed, expired or forged token and 404 when
/// the token names no existing identity.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or_else(|| {
            AppError::Unauthorized("No token, authorization denied".into())
        })?;

        let claims = state.tokens.verify_session(token).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::from(e)
        })?;

        let conn = state.db.get()?;
        let user = repository::find_by_id_or_federation(&conn, &claims.id)?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        Ok(CurrentUser(user))
    }
}

/// JSON body whose rejection renders as a 400 `{message}`.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

/// Path parameters whose rejection renders as a 400 `{message}`.
pub struct AppPath<T>(pub T);

impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(AppPath(value))
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
