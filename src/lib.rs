pub mod access_guard;
pub mod agent_client;
pub mod config;
pub mod errors;
pub mod models;
pub mod rate_limiter;
pub mod server;
pub mod shaping;
