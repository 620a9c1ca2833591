use axum::extract::{OriginalUri, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::auth::session::SessionId;
use crate::state::AppState;

fn original_path(req: &Request) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map(|u| u.0.to_string())
        .unwrap_or_else(|| req.uri().to_string())
}

fn session_id(req: &Request) -> Option<String> {
    req.extensions().get::<SessionId>().map(|s| s.0.clone())
}

/// Gate for routes that need an authenticated session. The originally
/// requested path is remembered so login can send the user back.
pub async fn require_login(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(sid) = session_id(&req) else {
        return Redirect::to("/login").into_response();
    };
    if state.sessions.user(&sid).is_some() {
        return next.run(req).await;
    }
    state.sessions.remember_return_to(&sid, &original_path(&req));
    Redirect::to("/login").into_response()
}

/// Admin gate: no session behaves like [`require_login`]; a logged-in
/// non-admin is sent home rather than shown an error page.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(sid) = session_id(&req) else {
        return Redirect::to("/login").into_response();
    };
    match state.sessions.user(&sid) {
        Some(user) if user.is_admin => next.run(req).await,
        Some(_) => Redirect::to("/").into_response(),
        None => {
            state.sessions.remember_return_to(&sid, &original_path(&req));
            Redirect::to("/login").into_response()
        }
    }
}

/// HTTP Basic credential check layered on the admin routes, in addition to
/// the session gate. Credentials come from the environment config.
pub async fn basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    let expected = format!("{}:{}", state.config.admin_user, state.config.admin_pass);
    if presented.as_deref() == Some(expected.as_str()) {
        return next.run(req).await;
    }

    let mut res =
        (StatusCode::UNAUTHORIZED, "Authentication required".to_string()).into_response();
    res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Admin\""),
    );
    res
}
