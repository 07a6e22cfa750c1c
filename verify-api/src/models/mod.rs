mod user;
mod verification_code;

pub use user::User;
pub use verification_code::VerificationCode;
