use std::net::SocketAddr;

use axum::{middleware, response::Html, routing::get, Router};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::auth::{csrf, gate, session};
use crate::config::AppConfig;
use crate::state::AppState;
use crate::{admin, auth, profiles, users, views};

async fn home() -> Html<String> {
    views::home()
}

pub fn build_app(state: AppState) -> Router {
    let csrf_guard = middleware::from_fn_with_state(state.clone(), csrf::csrf_guard);
    let login_gate = middleware::from_fn_with_state(state.clone(), gate::require_login);

    let auth_routes = auth::router().route_layer(csrf_guard.clone());
    let user_routes = users::router()
        .route_layer(csrf_guard.clone())
        .route_layer(login_gate.clone());
    let profile_routes = profiles::router()
        .route_layer(csrf_guard)
        .route_layer(login_gate);
    // Admin is gated by the session admin check, then Basic credentials.
    // CSRF is skipped here: the Basic pair already binds each request.
    let admin_routes = admin::router()
        .route_layer(middleware::from_fn_with_state(state.clone(), gate::basic_auth))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_admin,
        ));

    Router::new()
        .route("/", get(home))
        .merge(auth_routes)
        .merge(user_routes)
        .merge(profile_routes)
        .merge(admin_routes)
        .nest_service("/uploads", ServeDir::new(state.config.upload_dir.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::provide_session,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
        .with_state(state)
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.app_host, config.app_port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::csrf::CSRF_HEADER;
    use crate::auth::session::SessionUser;
    use crate::profiles::repo::{sample_data, Profile};
    use crate::users::repo::User;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn body_text(res: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn with_peer(mut req: Request<Body>) -> Request<Body> {
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        req
    }

    fn get_req(uri: &str, sid: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(sid) = sid {
            builder = builder.header(header::COOKIE, format!("sid={sid}"));
        }
        with_peer(builder.body(Body::empty()).unwrap())
    }

    fn form_post(uri: &str, sid: &str, body: String) -> Request<Body> {
        with_peer(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::COOKIE, format!("sid={sid}"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn anonymous_request_gets_a_session_cookie() {
        let state = AppState::for_tests().await;
        let app = build_app(state);

        let res = app.oneshot(get_req("/", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("sid="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn protected_page_redirects_anonymous_to_login_and_records_path() {
        let state = AppState::for_tests().await;
        let sid = state.sessions.create();
        let app = build_app(state.clone());

        let res = app.oneshot(get_req("/profiles/my", Some(&sid))).await.unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(state.sessions.take_return_to(&sid).as_deref(), Some("/profiles/my"));
    }

    #[tokio::test]
    async fn mutating_request_without_token_is_rejected_before_route_logic() {
        let state = AppState::for_tests().await;
        let sid = state.sessions.create();
        state.sessions.ensure_csrf_token(&sid).unwrap();
        let app = build_app(state.clone());

        let res = app
            .oneshot(form_post(
                "/login",
                &sid,
                "name=alice&password=whatever".into(),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(User::count(&state.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_token_is_rejected_and_valid_token_rotates() {
        let state = AppState::for_tests().await;
        let sid = state.sessions.create();
        let token = state.sessions.ensure_csrf_token(&sid).unwrap();
        let app = build_app(state.clone());

        let res = app
            .clone()
            .oneshot(form_post(
                "/register",
                &sid,
                "name=alice&password=correcthorsebatterystaple1&confirm_password=correcthorsebatterystaple1&_csrf=not-the-token".into(),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(User::count(&state.db).await.unwrap(), 0);

        let res = app
            .oneshot(form_post(
                "/register",
                &sid,
                format!("name=alice&password=correcthorsebatterystaple1&confirm_password=correcthorsebatterystaple1&_csrf={token}"),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(User::count(&state.db).await.unwrap(), 1);

        let rotated = state.sessions.csrf_token(&sid).unwrap();
        assert_ne!(rotated, token, "token is single-use");
        assert_eq!(
            res.headers().get(CSRF_HEADER).unwrap().to_str().unwrap(),
            rotated,
            "fresh token surfaced to the client"
        );
    }

    #[tokio::test]
    async fn get_lazily_provisions_a_token_for_the_first_form() {
        let state = AppState::for_tests().await;
        let sid = state.sessions.create();
        assert_eq!(state.sessions.csrf_token(&sid), None);
        let app = build_app(state.clone());

        let res = app.oneshot(get_req("/login", Some(&sid))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(state.sessions.csrf_token(&sid).is_some());
    }

    #[tokio::test]
    async fn generic_edit_form_submits_back_through_the_guard() {
        let state = AppState::for_tests().await;
        let mine = Profile::create(&state.db, Some(1), &sample_data("Sylvara"), None)
            .await
            .unwrap();
        let sid = state.sessions.create();
        state.sessions.set_user(
            &sid,
            SessionUser {
                user_id: 1,
                name: "alice".into(),
                is_admin: false,
            },
        );
        let app = build_app(state.clone());

        // The rendered edit page must be a form the guard can accept: the
        // token travels as a body field, so the form cannot be multipart.
        let res = app
            .clone()
            .oneshot(get_req(
                &format!("/profiles/{}/edit", mine.profile_id),
                Some(&sid),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let page = body_text(res).await;
        assert!(!page.contains("multipart/form-data"));
        assert!(page.contains("name=\"_csrf\""));

        let token = state.sessions.csrf_token(&sid).unwrap();
        let res = app
            .oneshot(form_post(
                &format!("/profiles/{}", mine.profile_id),
                &sid,
                format!("name=Sylvara+the+Swift&race=Elf&class=Ranger&level=4&_csrf={token}"),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let after = Profile::find_by_id(&state.db, mine.profile_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.name, "Sylvara the Swift");
        assert_eq!(after.level, 4);
    }

    #[tokio::test]
    async fn admin_gating_layers() {
        let state = AppState::for_tests().await;
        let app = build_app(state.clone());

        // No session user: behaves like require_login.
        let sid = state.sessions.create();
        let res = app
            .clone()
            .oneshot(get_req("/admin", Some(&sid)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/login");

        // Logged in but not admin: sent home, no admin-existence oracle.
        let sid = state.sessions.create();
        state.sessions.set_user(
            &sid,
            SessionUser {
                user_id: 1,
                name: "alice".into(),
                is_admin: false,
            },
        );
        let res = app
            .clone()
            .oneshot(get_req("/admin", Some(&sid)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/");

        // Admin session but no Basic credentials: challenged.
        let sid = state.sessions.create();
        state.sessions.set_user(
            &sid,
            SessionUser {
                user_id: 2,
                name: "root".into(),
                is_admin: true,
            },
        );
        let res = app
            .clone()
            .oneshot(get_req("/admin", Some(&sid)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

        // Admin session plus Basic pair: through.
        let mut req = get_req("/admin", Some(&sid));
        req.headers_mut().insert(
            header::AUTHORIZATION,
            // admin:admin, the test config pair
            "Basic YWRtaW46YWRtaW4=".parse().unwrap(),
        );
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
