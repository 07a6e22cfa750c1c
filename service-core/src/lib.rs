//! service-core: shared infrastructure for the student verification services.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
