pub mod accounts;
pub mod health;
pub mod sessions;

use actix_web::{error::UrlencodedError, guard, middleware::from_fn, web, HttpRequest};

use crate::error::ApiError;
use crate::middleware::{auth_middleware, rate_limit_middleware};

pub use accounts::{create_account, delete_account, Credentials};
pub use health::health_check;
pub use sessions::{get_session, list_sessions, open_session, revoke_session};

/// Mounts every route. Expects `AccountManager`, `SessionRegistry` and
/// `AuthenticationGateway` as app data; a `RateLimiter` is optional.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().error_handler(form_error))
        .service(health_check)
        // Credential routes run unauthenticated.
        .service(
            web::resource("/accounts")
                .route(web::post().to(create_account))
                .route(web::delete().to(delete_account))
                .wrap(from_fn(rate_limit_middleware)),
        )
        .service(
            web::resource("/sessions")
                .guard(guard::Post())
                .to(open_session)
                .wrap(from_fn(rate_limit_middleware)),
        )
        .service(
            web::scope("/sessions")
                .wrap(from_fn(auth_middleware))
                .service(list_sessions)
                .service(get_session)
                .service(revoke_session),
        );
}

fn form_error(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected form body: {}", err);
    ApiError::BadRequest("expected form fields uname and pass".to_string()).into()
}
