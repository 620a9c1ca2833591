use axum::Router;

use crate::state::AppState;

mod dto;
pub mod csrf;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod password;
pub mod rate_limit;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
