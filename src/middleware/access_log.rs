use actix_web::middleware::Logger;

/// Request path without the query string: SSE clients pass their JWT as `?token=`.
pub const ACCESS_LOG_FORMAT: &str = r#"%a "%{METHOD}xi %U" %s %b "%{User-Agent}i" %T"#;

pub fn access_log() -> Logger {
    Logger::new(ACCESS_LOG_FORMAT)
        .custom_request_replace("METHOD", |req| req.method().to_string())
}
