pub mod api_client;
pub mod config;
pub mod flow;
pub mod handlers;
pub mod rate_limit;
