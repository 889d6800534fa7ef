// Utility functions
pub mod error;
pub mod link_code;
pub mod password;
pub mod server_key;
pub mod time;

pub use error::*;
