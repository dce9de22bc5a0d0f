pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, authorization_value, AuthenticationGateway, AUTH_SCHEME};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
