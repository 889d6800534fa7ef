pub mod access_log;
pub mod auth;
pub mod security_headers;

pub use access_log::access_log;
pub use auth::AuthMiddleware;
pub use security_headers::SecurityHeaders;
