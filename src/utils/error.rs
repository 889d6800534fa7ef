use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

/// Every failure a handler can answer with.
///
/// Rendered as `{"success": false, "error": "..."}`; database and internal
/// failures are logged in full and answered with a generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Locked {
        message: String,
        until: DateTime<Utc>,
    },
    #[error("Database error: {0}")]
    Database(mongodb::error::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Duplicate-key failures (code 11000) are client errors, everything else
/// from the driver is a server error.
impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        let message = match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref write_error))
                if write_error.code == DUPLICATE_KEY =>
            {
                Some(write_error.message.clone())
            }
            ErrorKind::Command(ref command_error) if command_error.code == DUPLICATE_KEY => {
                Some(command_error.message.clone())
            }
            _ => None,
        };

        match message {
            Some(message) => {
                let field = duplicate_key_field(&message).unwrap_or("field");
                AppError::InvalidRequest(format!("Duplicate value entered for {}", field))
            }
            None => AppError::Database(err),
        }
    }
}

const DUPLICATE_KEY: i32 = 11000;

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(ref command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::Internal(format!("BSON serialization failed: {}", err))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {}", err))
    }
}

/// Pulls the indexed field out of a driver message such as
/// `E11000 duplicate key error collection: db.users index: username_1 dup key: { username: "steve" }`.
fn duplicate_key_field(message: &str) -> Option<&str> {
    let rest = message.split("dup key: {").nth(1)?;
    let field = rest.trim_start().split(':').next()?.trim();
    if field.is_empty() {
        None
    } else {
        Some(field)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Locked { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("❌ {}", self);
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.public_message(),
        });
        if let AppError::Locked { until, .. } = self {
            body["lockExpires"] = serde_json::json!(until.to_rfc3339());
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}
