use actix_web::HttpRequest;

use crate::{config::Config, utils::error::AppError};

pub const SERVER_KEY_HEADER: &str = "X-Server-Key";

/// Checks the Minecraft plugin's shared key. The body field wins over the
/// `X-Server-Key` header when both are present.
pub fn require_server_key(
    config: &Config,
    req: &HttpRequest,
    body_key: Option<&str>,
) -> Result<(), AppError> {
    let header_key = req
        .headers()
        .get(SERVER_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match body_key.or(header_key) {
        Some(key) if constant_time_eq(key.as_bytes(), config.minecraft_server_key.as_bytes()) => {
            Ok(())
        }
        Some(_) => Err(AppError::unauthorized("Invalid server key")),
        None => Err(AppError::unauthorized("Server key required")),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
