use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::session::SessionId;
use crate::state::AppState;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "_csrf";

// Form bodies buffered for the `_csrf` lookup; uploads go through
// multipart and are validated by header instead.
const FORM_BODY_LIMIT: usize = 64 * 1024;

/// Rotated per-session token, placed in request extensions so handlers can
/// embed it in rendered forms.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

/// CSRF guard for a route group. GET requests lazily provision the
/// session's token; any other verb must present it and gets a rotated
/// replacement on success, echoed back in the `x-csrf-token` response
/// header.
pub async fn csrf_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(SessionId(sid)) = req.extensions().get::<SessionId>().cloned() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware missing".to_string(),
        )
            .into_response();
    };

    if req.method() == Method::GET {
        let Some(token) = state.sessions.ensure_csrf_token(&sid) else {
            return forbidden();
        };
        let mut req = req;
        req.extensions_mut().insert(CsrfToken(token));
        return next.run(req).await;
    }

    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    // Multipart bodies are parsed later by the handler, so the token can
    // only arrive in the header there.
    let (mut req, submitted) = if header_token.is_some() || is_multipart {
        (req, header_token)
    } else {
        let (parts, body) = req.into_parts();
        let bytes = match to_bytes(body, FORM_BODY_LIMIT).await {
            Ok(b) => b,
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "invalid request body".to_string())
                    .into_response()
            }
        };
        let token = form_field(&bytes, CSRF_FIELD);
        (Request::from_parts(parts, Body::from(bytes)), token)
    };

    match (submitted, state.sessions.csrf_token(&sid)) {
        (Some(sub), Some(tok)) if sub == tok => {}
        _ => return forbidden(),
    }

    let Some(fresh) = state.sessions.rotate_csrf_token(&sid) else {
        return forbidden();
    };
    req.extensions_mut().insert(CsrfToken(fresh.clone()));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&fresh) {
        res.headers_mut().insert(CSRF_HEADER, value);
    }
    res
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Invalid CSRF token".to_string()).into_response()
}

fn form_field(bytes: &[u8], name: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes).ok()?;
    pairs.into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
}
