//! Operator dashboard: aggregate counts, the audit log tail, and a note
//! form that appends to the log. Gated by session admin + HTTP Basic.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tracing::instrument;

use crate::profiles::repo::Profile;
use crate::state::AppState;
use crate::users::repo::User;
use crate::views::{self, AdminStats};

const LOG_TAIL_LINES: usize = 200;
const UPTIME_CMD_TIMEOUT: Duration = Duration::from_millis(1500);

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/log", post(append_note))
}

/// Bounded external status query; the only call in the system with its
/// own deadline.
async fn system_uptime() -> String {
    let run = tokio::process::Command::new("uptime").output();
    match tokio::time::timeout(UPTIME_CMD_TIMEOUT, run).await {
        Ok(Ok(out)) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        }
        _ => "uptime unavailable".to_string(),
    }
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Html<String>, (StatusCode, String)> {
    let total_users = User::count(&state.db).await.map_err(internal)?;
    let total_profiles = Profile::count(&state.db).await.map_err(internal)?;
    let log_tail = state.audit.tail(LOG_TAIL_LINES).await;
    let uptime_out = system_uptime().await;

    Ok(views::admin_page(&AdminStats {
        total_users,
        total_profiles,
        app_uptime_secs: state.started_at.elapsed().as_secs(),
        uptime_out,
        log_tail,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    #[serde(default)]
    pub message: String,
}

#[instrument(skip(state, form))]
pub async fn append_note(State(state): State<AppState>, Form(form): Form<NoteForm>) -> Response {
    let msg = form.message.trim();
    if !msg.is_empty() {
        state.audit.append(&format!("ADMIN_NOTE: {msg}")).await;
    }
    Redirect::to("/admin").into_response()
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
