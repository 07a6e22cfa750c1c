pub mod database;
pub mod email;
pub mod jwt;

pub use database::Database;
pub use email::{EmailProvider, EmailService, MockEmailService};
pub use jwt::{JwtService, SessionClaims};
