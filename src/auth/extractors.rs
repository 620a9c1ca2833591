use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::auth::csrf::CsrfToken;
use crate::auth::session::{SessionId, SessionUser};
use crate::state::AppState;

#[async_trait]
impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionId>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware missing".into(),
        ))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CsrfToken>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "csrf middleware missing".into(),
        ))
    }
}

/// The session's authenticated user. Routes behind the login gate can rely
/// on this; elsewhere it rejects with 401.
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionId(sid) = SessionId::from_request_parts(parts, state).await?;
        state
            .sessions
            .user(&sid)
            .map(CurrentUser)
            .ok_or((StatusCode::UNAUTHORIZED, "Login required".into()))
    }
}
