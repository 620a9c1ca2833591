use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::auth::csrf::CsrfToken;
use crate::auth::dto::{LoginForm, RegisterForm};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{clear_session_cookie, session_cookie, SessionId, SessionUser};
use crate::state::AppState;
use crate::users::repo::User;
use crate::views;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_page).post(register))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

fn is_valid_username(name: &str) -> bool {
    lazy_static! {
        static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
    }
    NAME_RE.is_match(name)
}

#[instrument(skip(state))]
pub async fn register_page(
    State(state): State<AppState>,
    SessionId(sid): SessionId,
    CsrfToken(csrf): CsrfToken,
) -> Response {
    if state.sessions.user(&sid).is_some() {
        return Redirect::to("/").into_response();
    }
    views::register_page(&csrf, None).into_response()
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    CsrfToken(csrf): CsrfToken,
    Form(mut form): Form<RegisterForm>,
) -> Result<Response, (StatusCode, String)> {
    if !state.register_limiter.check(addr.ip()) {
        warn!(ip = %addr.ip(), "registration rate limit hit");
        state
            .audit
            .append(&format!("RATE_LIMIT register from {}", addr.ip()))
            .await;
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            "Too many attempts. Try again later.",
        )
            .into_response());
    }

    form.name = form.name.trim().to_string();

    let reject = |msg: &str| {
        (StatusCode::BAD_REQUEST, views::register_page(&csrf, Some(msg))).into_response()
    };

    if !is_valid_username(&form.name) {
        return Ok(reject("Username must be 3-32 letters, digits, or _.-"));
    }
    if form.password.len() < 8 {
        return Ok(reject("Password must be at least 8 characters"));
    }
    if form.password != form.confirm_password {
        return Ok(reject("Passwords do not match"));
    }

    // Check-then-insert; concurrent registrations of the same name can
    // race, which is accepted at this scale.
    if User::find_by_name(&state.db, &form.name)
        .await
        .map_err(internal)?
        .is_some()
    {
        warn!(name = %form.name, "username already taken");
        return Ok(reject("Username already taken"));
    }

    let hash = hash_password(&form.password).map_err(internal)?;
    let user = User::create(&state.db, &form.name, &hash)
        .await
        .map_err(internal)?;

    info!(user_id = user.user_id, name = %user.name, "user registered");
    state
        .audit
        .append(&format!("REGISTER {}: OK", user.name))
        .await;

    Ok(Redirect::to("/login").into_response())
}

#[instrument(skip(state))]
pub async fn login_page(
    State(state): State<AppState>,
    SessionId(sid): SessionId,
    CsrfToken(csrf): CsrfToken,
) -> Response {
    if state.sessions.user(&sid).is_some() {
        return Redirect::to("/").into_response();
    }
    views::login_page(&csrf, None).into_response()
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    SessionId(sid): SessionId,
    CsrfToken(csrf): CsrfToken,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, (StatusCode, String)> {
    if !state.login_limiter.check(addr.ip()) {
        warn!(ip = %addr.ip(), "login rate limit hit");
        state
            .audit
            .append(&format!("RATE_LIMIT login from {}", addr.ip()))
            .await;
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            "Too many attempts. Try again later.",
        )
            .into_response());
    }

    form.name = form.name.trim().to_string();
    if form.name.is_empty() || form.password.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            views::login_page(&csrf, Some("Username and password are required")),
        )
            .into_response());
    }

    // One generic 401 for both unknown names and wrong passwords; only the
    // audit log distinguishes them.
    let rejected = || {
        (
            StatusCode::UNAUTHORIZED,
            views::login_page(&csrf, Some("Invalid username or password")),
        )
            .into_response()
    };

    let Some(user) = User::find_by_name(&state.db, &form.name)
        .await
        .map_err(internal)?
    else {
        warn!(name = %form.name, "login with unknown username");
        state
            .audit
            .append(&format!("LOGIN {}: Failed - Unknown user", form.name))
            .await;
        return Ok(rejected());
    };

    let ok = match verify_password(&form.password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err(internal(e));
        }
    };
    if !ok {
        warn!(user_id = user.user_id, "login with wrong password");
        state
            .audit
            .append(&format!("LOGIN {}: Failed - Wrong password", user.name))
            .await;
        return Ok(rejected());
    }

    // Consult the recorded destination before the old session dies.
    let dest = state
        .sessions
        .take_return_to(&sid)
        .unwrap_or_else(|| "/".into());
    let new_sid = state.sessions.regenerate(
        &sid,
        SessionUser {
            user_id: user.user_id,
            name: user.name.clone(),
            is_admin: user.is_admin,
        },
    );

    info!(user_id = user.user_id, name = %user.name, "user logged in");
    state
        .audit
        .append(&format!("LOGIN {}: OK", user.name))
        .await;

    let mut res = Redirect::to(&dest).into_response();
    res.headers_mut()
        .insert(header::SET_COOKIE, session_cookie(&new_sid));
    Ok(res)
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>, SessionId(sid): SessionId) -> Response {
    if let Some(user) = state.sessions.user(&sid) {
        info!(user_id = user.user_id, name = %user.name, "user logged out");
        state.audit.append(&format!("LOGOUT {}", user.name)).await;
    }
    state.sessions.destroy(&sid);

    let mut res = Redirect::to("/").into_response();
    res.headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    res
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use std::sync::Arc;

    fn addr() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn session(state: &AppState) -> (SessionId, CsrfToken) {
        let sid = state.sessions.create();
        let csrf = state.sessions.ensure_csrf_token(&sid).unwrap();
        (SessionId(sid), CsrfToken(csrf))
    }

    fn register_form(name: &str, password: &str) -> Form<RegisterForm> {
        Form(RegisterForm {
            name: name.into(),
            password: password.into(),
            confirm_password: password.into(),
        })
    }

    fn login_form(name: &str, password: &str) -> Form<LoginForm> {
        Form(LoginForm {
            name: name.into(),
            password: password.into(),
        })
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_without_mutation() {
        let state = AppState::for_tests().await;
        let (_, csrf) = session(&state);

        let res = register(
            State(state.clone()),
            addr(),
            csrf.clone(),
            register_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let first = User::find_by_name(&state.db, "alice").await.unwrap().unwrap();

        let res = register(
            State(state.clone()),
            addr(),
            csrf,
            register_form("alice", "a-completely-different-pass"),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(res).await.contains("Username already taken"));

        let still = User::find_by_name(&state.db, "alice").await.unwrap().unwrap();
        assert_eq!(still.password_hash, first.password_hash);
        assert_eq!(User::count(&state.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let state = AppState::for_tests().await;
        let (_, csrf) = session(&state);

        let res = register(State(state.clone()), addr(), csrf.clone(), register_form("al", "longenough1"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = register(State(state.clone()), addr(), csrf.clone(), register_form("alice", "short"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = register(
            State(state.clone()),
            addr(),
            csrf,
            Form(RegisterForm {
                name: "alice".into(),
                password: "longenough1".into(),
                confirm_password: "different11".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(User::count(&state.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let state = AppState::for_tests().await;
        let (sid, csrf) = session(&state);
        register(
            State(state.clone()),
            addr(),
            csrf.clone(),
            register_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();

        let unknown = login(
            State(state.clone()),
            addr(),
            sid.clone(),
            csrf.clone(),
            login_form("nobody", "whatever-pass"),
        )
        .await
        .unwrap();
        let wrong = login(
            State(state.clone()),
            addr(),
            sid,
            csrf,
            login_form("alice", "wrong-password"),
        )
        .await
        .unwrap();

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(unknown).await, body_text(wrong).await);

        // The audit log, not the response, tells the two apart.
        let tail = state.audit.tail(10).await;
        assert!(tail.contains("Failed - Unknown user"));
        assert!(tail.contains("Failed - Wrong password"));
    }

    #[tokio::test]
    async fn successful_login_regenerates_session_and_honors_return_to() {
        let state = AppState::for_tests().await;
        let (sid, csrf) = session(&state);
        register(
            State(state.clone()),
            addr(),
            csrf.clone(),
            register_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();

        state.sessions.remember_return_to(&sid.0, "/profiles/my");

        let res = login(
            State(state.clone()),
            addr(),
            sid.clone(),
            csrf,
            login_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/profiles/my");

        let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        let new_sid = set_cookie
            .strip_prefix("sid=")
            .and_then(|s| s.split(';').next())
            .unwrap();
        assert_ne!(new_sid, sid.0, "session id rotated at login");
        assert!(!state.sessions.exists(&sid.0), "old session destroyed");

        let user = state.sessions.user(new_sid).unwrap();
        assert_eq!(user.name, "alice");
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn login_attempts_beyond_window_budget_get_429() {
        let mut state = AppState::for_tests().await;
        state.login_limiter = Arc::new(crate::auth::rate_limit::FixedWindowLimiter::new(
            &RateLimitConfig {
                max_attempts: 2,
                window_secs: 3600,
            },
        ));
        let (sid, csrf) = session(&state);
        register(
            State(state.clone()),
            addr(),
            csrf.clone(),
            register_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();

        for _ in 0..2 {
            let res = login(
                State(state.clone()),
                addr(),
                sid.clone(),
                csrf.clone(),
                login_form("alice", "wrong-password"),
            )
            .await
            .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }

        // Correct credentials no longer help once the budget is spent.
        let res = login(
            State(state.clone()),
            addr(),
            sid,
            csrf,
            login_form("alice", "correcthorsebatterystaple1"),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(state.audit.tail(5).await.contains("RATE_LIMIT login"));
    }

    #[tokio::test]
    async fn logout_destroys_the_session() {
        let state = AppState::for_tests().await;
        let (sid, _) = session(&state);
        state.sessions.set_user(
            &sid.0,
            SessionUser {
                user_id: 1,
                name: "alice".into(),
                is_admin: false,
            },
        );

        let res = logout(State(state.clone()), sid.clone()).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(!state.sessions.exists(&sid.0));
        let cleared = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn username_rule() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("al_ice.2-x"));
        assert!(!is_valid_username("al"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("<script>"));
    }
}
