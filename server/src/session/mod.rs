pub mod manager;
pub mod token;

pub use manager::{Session, SessionError, SessionRegistry};
pub use token::{TokenGenerator, UuidTokenGenerator, TOKEN_LEN};
