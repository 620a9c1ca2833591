use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::auth::csrf::CsrfToken;
use crate::auth::extractors::CurrentUser;
use crate::auth::session::SessionUser;
use crate::profiles::dto::ProfileFields;
use crate::profiles::repo::Profile;
use crate::state::AppState;
use crate::views;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profiles/my", get(my_profile).post(create_my))
        .route("/profiles/my/update", post(update_my))
        .route("/profiles/my/delete", post(delete_my))
        .route("/profiles/all", get(all_profiles))
        .route("/profiles/:id/edit", get(edit_form))
        .route("/profiles/:id", post(update_by_id))
        .route("/profiles/:id/delete", post(delete_by_id))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024))
}

/// Ownership check run against a freshly fetched row. Unclaimed profiles
/// (`user_id` NULL) belong to nobody.
fn ensure_owner(profile: &Profile, user: &SessionUser) -> Result<(), (StatusCode, String)> {
    if profile.user_id == Some(user.user_id) {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        "You do not own this profile".to_string(),
    ))
}

/// Pull the profile fields and optional image out of a multipart body.
/// The CSRF token for these requests travels in the header and has already
/// been validated by the guard.
async fn read_multipart(
    mut mp: Multipart,
) -> Result<(ProfileFields, Option<(Bytes, String)>), (StatusCode, String)> {
    let bad = |e: axum::extract::multipart::MultipartError| {
        (StatusCode::BAD_REQUEST, e.to_string())
    };

    let mut fields = ProfileFields::default();
    let mut image = None;
    while let Some(field) = mp.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let has_file = field.file_name().is_some_and(|f| !f.is_empty());
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(bad)?;
                if has_file && !data.is_empty() {
                    image = Some((data, content_type));
                }
            }
            "name" => fields.name = Some(field.text().await.map_err(bad)?),
            "race" => fields.race = Some(field.text().await.map_err(bad)?),
            "class" => fields.class = Some(field.text().await.map_err(bad)?),
            "level" => fields.level = Some(field.text().await.map_err(bad)?),
            "bio" => fields.bio = Some(field.text().await.map_err(bad)?),
            "looking_for" => fields.looking_for = Some(field.text().await.map_err(bad)?),
            "experience_level" => {
                fields.experience_level = Some(field.text().await.map_err(bad)?)
            }
            "timezone" => fields.timezone = Some(field.text().await.map_err(bad)?),
            _ => {}
        }
    }
    Ok((fields, image))
}

#[instrument(skip(state, user))]
pub async fn my_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
) -> Result<Html<String>, (StatusCode, String)> {
    let profile = Profile::find_by_owner(&state.db, user.user_id)
        .await
        .map_err(internal)?;
    Ok(views::my_profile_page(profile.as_ref(), &csrf, None))
}

#[instrument(skip(state, user, mp))]
pub async fn create_my(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    mp: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let (fields, image) = read_multipart(mp).await?;
    create_my_profile(&state, &user, &csrf, fields, image).await
}

pub async fn create_my_profile(
    state: &AppState,
    user: &SessionUser,
    csrf: &str,
    fields: ProfileFields,
    image: Option<(Bytes, String)>,
) -> Result<Response, (StatusCode, String)> {
    // One profile per user in this flow; enforced here, not by the store.
    if let Some(existing) = Profile::find_by_owner(&state.db, user.user_id)
        .await
        .map_err(internal)?
    {
        return Ok((
            StatusCode::BAD_REQUEST,
            views::my_profile_page(Some(&existing), csrf, Some("You already have a profile")),
        )
            .into_response());
    }

    let data = match fields.validate() {
        Ok(d) => d,
        Err(msg) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                views::my_profile_page(None, csrf, Some(&msg)),
            )
                .into_response())
        }
    };

    let image_path = match image {
        Some((body, content_type)) => {
            Some(state.uploads.save(body, &content_type).await.map_err(internal)?)
        }
        None => None,
    };

    let profile = Profile::create(&state.db, Some(user.user_id), &data, image_path.as_deref())
        .await
        .map_err(internal)?;
    info!(profile_id = profile.profile_id, user_id = user.user_id, "profile created");
    Ok(Redirect::to("/profiles/my").into_response())
}

#[instrument(skip(state, user, mp))]
pub async fn update_my(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    mp: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let (fields, image) = read_multipart(mp).await?;
    update_my_profile(&state, &user, &csrf, fields, image).await
}

pub async fn update_my_profile(
    state: &AppState,
    user: &SessionUser,
    csrf: &str,
    fields: ProfileFields,
    image: Option<(Bytes, String)>,
) -> Result<Response, (StatusCode, String)> {
    let existing = Profile::find_by_owner(&state.db, user.user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;

    let data = match fields.validate() {
        Ok(d) => d,
        Err(msg) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                views::my_profile_page(Some(&existing), csrf, Some(&msg)),
            )
                .into_response())
        }
    };

    let image_path = match image {
        Some((body, content_type)) => {
            let new_path = state.uploads.save(body, &content_type).await.map_err(internal)?;
            // Replacement: the old file goes away unless dedup matched it.
            if let Some(old) = existing.image_path.as_deref() {
                if old != new_path {
                    state.uploads.delete(old).await.map_err(internal)?;
                }
            }
            Some(new_path)
        }
        None => existing.image_path.clone(),
    };

    Profile::update(&state.db, existing.profile_id, &data, image_path.as_deref())
        .await
        .map_err(internal)?;
    Ok(Redirect::to("/profiles/my").into_response())
}

#[instrument(skip(state, user))]
pub async fn delete_my(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, (StatusCode, String)> {
    let existing = Profile::find_by_owner(&state.db, user.user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;

    Profile::delete(&state.db, existing.profile_id)
        .await
        .map_err(internal)?;
    if let Some(path) = existing.image_path.as_deref() {
        state.uploads.delete(path).await.map_err(internal)?;
    }
    info!(profile_id = existing.profile_id, user_id = user.user_id, "profile deleted");
    Ok(Redirect::to("/profiles/my").into_response())
}

#[instrument(skip(state))]
pub async fn all_profiles(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, String)> {
    let profiles = Profile::list_all(&state.db).await.map_err(internal)?;
    Ok(views::profiles_page(&profiles))
}

#[instrument(skip(state, user))]
pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    CsrfToken(csrf): CsrfToken,
) -> Result<Html<String>, (StatusCode, String)> {
    let profile = Profile::find_by_id(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;
    ensure_owner(&profile, &user)?;
    Ok(views::edit_profile_page(&profile, &csrf))
}

#[instrument(skip(state, user, form))]
pub async fn update_by_id(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<ProfileFields>,
) -> Result<Response, (StatusCode, String)> {
    // Re-fetch before mutating; ownership is decided by the stored row.
    let profile = Profile::find_by_id(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;
    ensure_owner(&profile, &user)?;

    let data = form
        .validate()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
    Profile::update(&state.db, id, &data, profile.image_path.as_deref())
        .await
        .map_err(internal)?;
    Ok(Redirect::to("/profiles/all").into_response())
}

#[instrument(skip(state, user))]
pub async fn delete_by_id(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, (StatusCode, String)> {
    let profile = Profile::find_by_id(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;
    ensure_owner(&profile, &user)?;

    Profile::delete(&state.db, id).await.map_err(internal)?;
    if let Some(path) = profile.image_path.as_deref() {
        state.uploads.delete(path).await.map_err(internal)?;
    }
    Ok(Redirect::to("/profiles/all").into_response())
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
