pub mod forum;
pub mod friend_request;
pub mod notification;
pub mod security_log;
pub mod user;

pub use forum::*;
pub use friend_request::*;
pub use notification::Notification;
pub use security_log::*;
pub use user::*;
