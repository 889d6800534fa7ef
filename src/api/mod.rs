pub mod auth;
pub mod events;
pub mod following;
pub mod forum;
pub mod friends;
pub mod health;
pub mod leaderboard;
pub mod linkcode;
pub mod minecraft;
pub mod notifications;
pub mod player;
pub mod swagger;

use actix_web::{HttpResponse, ResponseError};

use crate::utils::error::AppError;

/// Renders a failed request. Server errors are logged by `error_response`.
pub(crate) fn failure(context: &str, e: AppError) -> HttpResponse {
    if !e.status_code().is_server_error() {
        log::warn!("⚠️  {} rejected: {}", context, e);
    }
    e.error_response()
}
