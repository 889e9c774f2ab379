pub mod authentication;
pub mod user;

pub use authentication::*;
pub use user::*;
