use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sid";

/// Identity snapshot copied into the session at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: i64,
    pub name: String,
    pub is_admin: bool,
}

#[derive(Debug, Default)]
struct Session {
    user: Option<SessionUser>,
    csrf_token: Option<String>,
    return_to: Option<String>,
}

/// Opaque id of the caller's server-side session, placed in request
/// extensions by [`provide_session`].
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// In-process session store keyed by the opaque cookie value. Counters and
/// sessions live for one process lifetime, like the rest of the app state.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self) -> String {
        let id = random_token();
        self.write().insert(id.clone(), Session::default());
        id
    }

    pub fn exists(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn user(&self, id: &str) -> Option<SessionUser> {
        self.read().get(id)?.user.clone()
    }

    pub fn set_user(&self, id: &str, user: SessionUser) {
        if let Some(session) = self.write().get_mut(id) {
            session.user = Some(user);
        }
    }

    pub fn csrf_token(&self, id: &str) -> Option<String> {
        self.read().get(id)?.csrf_token.clone()
    }

    /// Current token, minting one if the session has none yet. Returns None
    /// only for unknown sessions.
    pub fn ensure_csrf_token(&self, id: &str) -> Option<String> {
        let mut sessions = self.write();
        let session = sessions.get_mut(id)?;
        Some(
            session
                .csrf_token
                .get_or_insert_with(random_token)
                .clone(),
        )
    }

    /// Replace the token after a successful validation. Single-use tokens.
    pub fn rotate_csrf_token(&self, id: &str) -> Option<String> {
        let mut sessions = self.write();
        let session = sessions.get_mut(id)?;
        let fresh = random_token();
        session.csrf_token = Some(fresh.clone());
        Some(fresh)
    }

    pub fn remember_return_to(&self, id: &str, path: &str) {
        if let Some(session) = self.write().get_mut(id) {
            session.return_to = Some(path.to_string());
        }
    }

    /// Consume the recorded post-login destination. Only same-origin
    /// relative paths survive; anything else would be an open redirect.
    pub fn take_return_to(&self, id: &str) -> Option<String> {
        self.write()
            .get_mut(id)?
            .return_to
            .take()
            .filter(|p| p.starts_with('/') && !p.starts_with("//"))
    }

    /// Anti-fixation: issue a new session identity at login, carrying over
    /// only the user snapshot. The CSRF token is re-minted with it.
    pub fn regenerate(&self, id: &str, user: SessionUser) -> String {
        let mut sessions = self.write();
        sessions.remove(id);
        let new_id = random_token();
        sessions.insert(
            new_id.clone(),
            Session {
                user: Some(user),
                csrf_token: Some(random_token()),
                return_to: None,
            },
        );
        new_id
    }

    pub fn destroy(&self, id: &str) {
        self.write().remove(id);
    }
}

// --- cookie plumbing ---

pub fn session_cookie(value: &str) -> HeaderValue {
    let cookie = format!("{SESSION_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/");
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("sid=; HttpOnly; Path=/; Max-Age=0")
}

pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == SESSION_COOKIE).then(|| value.to_string())
        })
}

/// Outermost app middleware: every request runs with a live session id in
/// its extensions. Mints a session (and sets the cookie) when the client
/// has none or presents a stale id.
pub async fn provide_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let known = extract_session_cookie(req.headers()).filter(|id| state.sessions.exists(id));

    let (id, minted) = match known {
        Some(id) => (id, false),
        None => (state.sessions.create(), true),
    };
    req.extensions_mut().insert(SessionId(id.clone()));

    let mut res = next.run(req).await;
    // A login/logout handler may have set its own cookie; don't clobber it.
    if minted && !res.headers().contains_key(header::SET_COOKIE) {
        res.headers_mut()
            .insert(header::SET_COOKIE, session_cookie(&id));
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SessionUser {
        SessionUser {
            user_id: 1,
            name: "alice".into(),
            is_admin: false,
        }
    }

    #[test]
    fn create_then_login_then_destroy() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(store.exists(&id));
        assert_eq!(store.user(&id), None);

        store.set_user(&id, alice());
        assert_eq!(store.user(&id).unwrap().name, "alice");

        store.destroy(&id);
        assert!(!store.exists(&id));
        assert_eq!(store.user(&id), None);
    }

    #[test]
    fn regenerate_issues_new_identity_and_kills_old() {
        let store = SessionStore::new();
        let old = store.create();
        let old_token = store.ensure_csrf_token(&old).unwrap();

        let new = store.regenerate(&old, alice());
        assert_ne!(old, new);
        assert!(!store.exists(&old), "fixated id must die");
        assert_eq!(store.user(&new).unwrap().name, "alice");
        assert_ne!(store.csrf_token(&new).unwrap(), old_token);
    }

    #[test]
    fn csrf_token_is_lazy_and_rotates() {
        let store = SessionStore::new();
        let id = store.create();
        assert_eq!(store.csrf_token(&id), None);

        let first = store.ensure_csrf_token(&id).unwrap();
        assert_eq!(store.ensure_csrf_token(&id).unwrap(), first);

        let rotated = store.rotate_csrf_token(&id).unwrap();
        assert_ne!(rotated, first);
        assert_eq!(store.csrf_token(&id).unwrap(), rotated);
    }

    #[test]
    fn return_to_rejects_offsite_destinations() {
        let store = SessionStore::new();
        let id = store.create();

        store.remember_return_to(&id, "/profiles/my");
        assert_eq!(store.take_return_to(&id).as_deref(), Some("/profiles/my"));
        assert_eq!(store.take_return_to(&id), None, "consumed on read");

        store.remember_return_to(&id, "https://evil.example/phish");
        assert_eq!(store.take_return_to(&id), None);

        store.remember_return_to(&id, "//evil.example/phish");
        assert_eq!(store.take_return_to(&id), None);
    }

    #[test]
    fn cookie_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sid=abc123; other=x"),
        );
        assert_eq!(extract_session_cookie(&headers), Some("abc123".into()));

        let set = session_cookie("abc123");
        let set = set.to_str().unwrap();
        assert!(set.contains("sid=abc123"));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
    }
}
