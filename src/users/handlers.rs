//! Account CRUD board. Sits behind the login gate; passwords are hashed
//! on the way in and never rendered back out.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::auth::csrf::CsrfToken;
use crate::auth::password::hash_password;
use crate::state::AppState;
use crate::users::repo::User;
use crate::views;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list).post(create))
        .route("/users/:id/edit", get(edit_form))
        .route("/users/:id", post(update))
        .route("/users/:id/delete", post(remove))
}

#[derive(Debug, Deserialize)]
pub struct UserForm {
    pub name: String,
    pub pass: String,
}

#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    CsrfToken(csrf): CsrfToken,
) -> Result<Html<String>, (StatusCode, String)> {
    let users = User::list_all(&state.db).await.map_err(internal)?;
    Ok(views::users_page(&users, &csrf))
}

#[instrument(skip(state, form))]
pub async fn create(
    State(state): State<AppState>,
    Form(form): Form<UserForm>,
) -> Result<Response, (StatusCode, String)> {
    let name = form.name.trim();
    if name.is_empty() || form.pass.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Name and password are required").into_response());
    }
    let hash = hash_password(&form.pass).map_err(internal)?;
    let user = User::create(&state.db, name, &hash).await.map_err(internal)?;
    info!(user_id = user.user_id, "user created via board");
    Ok(Redirect::to("/users").into_response())
}

#[instrument(skip(state))]
pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    CsrfToken(csrf): CsrfToken,
) -> Result<Html<String>, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    Ok(views::edit_user_page(&user, &csrf))
}

#[instrument(skip(state, form))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<UserForm>,
) -> Result<Response, (StatusCode, String)> {
    let existing = User::find_by_id(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    let name = form.name.trim();
    if name.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Name is required").into_response());
    }
    // Blank password keeps the current credential.
    let hash = if form.pass.is_empty() {
        existing.password_hash
    } else {
        hash_password(&form.pass).map_err(internal)?
    };

    User::update(&state.db, id, name, &hash).await.map_err(internal)?;
    Ok(Redirect::to("/users").into_response())
}

#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, (StatusCode, String)> {
    User::delete(&state.db, id).await.map_err(internal)?;
    Ok(Redirect::to("/users").into_response())
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_hashes_the_password() {
        let state = AppState::for_tests().await;
        let res = create(
            State(state.clone()),
            Form(UserForm {
                name: "bob".into(),
                pass: "hunter2hunter2".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);

        let bob = User::find_by_name(&state.db, "bob").await.unwrap().unwrap();
        assert_ne!(bob.password_hash, "hunter2hunter2");
        assert!(bob.password_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn update_missing_user_is_404() {
        let state = AppState::for_tests().await;
        let err = update(
            State(state),
            Path(99),
            Form(UserForm {
                name: "x".into(),
                pass: "y".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_password_keeps_current_hash() {
        let state = AppState::for_tests().await;
        let user = User::create(&state.db, "carol", "$argon2$keepme").await.unwrap();

        update(
            State(state.clone()),
            Path(user.user_id),
            Form(UserForm {
                name: "carol-renamed".into(),
                pass: String::new(),
            }),
        )
        .await
        .unwrap();

        let after = User::find_by_id(&state.db, user.user_id).await.unwrap().unwrap();
        assert_eq!(after.name, "carol-renamed");
        assert_eq!(after.password_hash, "$argon2$keepme");
    }
}
