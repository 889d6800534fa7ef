pub mod auth_service;
pub mod forum_service;
pub mod leaderboard_service;
pub mod link_service;
pub mod notification_service;
pub mod player_service;
pub mod security_log_service;
pub mod social_service;

use mongodb::bson::oid::ObjectId;

use crate::utils::error::AppError;

pub(crate) fn parse_object_id(hex: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(hex.trim()).map_err(|_| AppError::invalid(format!("Invalid {} id", what)))
}
