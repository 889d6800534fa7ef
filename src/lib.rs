//! BizzyLink community backend: REST API, MongoDB persistence, Minecraft
//! account linking and per-user Server-Sent Events.

pub mod api;
pub mod config;
pub mod database;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod services;
pub mod utils;
