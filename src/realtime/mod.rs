//! Server-Sent Events: the per-user hub behind `/api/events` and the
//! reconnecting client that consumes it.

pub mod client;
pub mod event;
pub mod hub;

pub use event::UserEvent;
pub use hub::{EventHub, EventStream};
