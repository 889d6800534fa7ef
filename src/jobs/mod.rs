pub mod link_code_cleanup;
pub mod sse_heartbeat;
