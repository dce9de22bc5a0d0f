use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header::{HeaderValue, AUTHORIZATION},
    middleware::Next,
    web, HttpMessage, ResponseError,
};

use crate::error::ApiError;
use crate::session::{Session, SessionRegistry};

/// Prefix of the `Authorization` header value, followed by one space and the token.
pub const AUTH_SCHEME: &str = "Celebration";

/// Turns a presented `Authorization` header into a live session.
///
/// A missing header, a malformed one and an unknown token all end in the same
/// `ApiError::Unauthorized`, so callers cannot tell them apart.
#[derive(Clone)]
pub struct AuthenticationGateway {
    sessions: SessionRegistry,
}

impl AuthenticationGateway {
    pub fn new(sessions: SessionRegistry) -> Self {
        Self { sessions }
    }

    pub fn authenticate(&self, header: Option<&HeaderValue>) -> Result<Session, ApiError> {
        let token = header
            .and_then(|value| value.to_str().ok())
            .and_then(extract_token)
            .ok_or(ApiError::Unauthorized)?;

        self.sessions.lookup(token).map_err(|_| {
            log::debug!("Rejected unknown or expired session token");
            ApiError::Unauthorized
        })
    }
}

fn extract_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if scheme != AUTH_SCHEME || token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

pub fn authorization_value(token: &str) -> String {
    format!("{} {}", AUTH_SCHEME, token)
}

/// Rejections are answered here as JSON responses and never reach the handlers.
pub async fn auth_middleware<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let outcome = match req.app_data::<web::Data<AuthenticationGateway>>() {
        Some(gateway) => gateway.authenticate(req.headers().get(AUTHORIZATION)),
        None => Err(ApiError::Internal(
            "authentication gateway not configured".into(),
        )),
    };

    match outcome {
        Ok(session) => {
            // Handlers read it back through `web::ReqData<Session>`.
            req.extensions_mut().insert(session);
            Ok(next.call(req).await?.map_into_left_body())
        }
        Err(err) => Ok(req.into_response(err.error_response()).map_into_right_body()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Account;

    fn gateway_with_session() -> (AuthenticationGateway, Session) {
        let registry = SessionRegistry::new(None);
        let account = Account::new("alice".to_string(), "hash".to_string());
        let session = registry.issue(&account).unwrap();
        (AuthenticationGateway::new(registry), session)
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token("Celebration abc123"), Some("abc123"));
        assert_eq!(extract_token("Bearer abc123"), None);
        assert_eq!(extract_token("celebration abc123"), None);
        assert_eq!(extract_token("Celebration "), None);
        assert_eq!(extract_token("Celebration a b"), None);
        assert_eq!(extract_token("Celebrationabc123"), None);
    }

    #[test]
    fn test_valid_token_authenticates() {
        let (gateway, session) = gateway_with_session();
        let header = HeaderValue::from_str(&authorization_value(&session.session_id)).unwrap();

        let resolved = gateway.authenticate(Some(&header)).unwrap();
        assert_eq!(resolved.session_id, session.session_id);
        assert_eq!(resolved.account_id, session.account_id);
    }

    #[test]
    fn test_every_rejection_is_the_same() {
        let (gateway, _) = gateway_with_session();
        let unknown = HeaderValue::from_static("Celebration 00000000000000000000000000000000");
        let malformed = HeaderValue::from_static("Basic dXNlcjpwYXNz");

        let outcomes = [
            gateway.authenticate(None),
            gateway.authenticate(Some(&unknown)),
            gateway.authenticate(Some(&malformed)),
        ];

        for outcome in outcomes {
            let err = outcome.unwrap_err();
            assert!(matches!(err, ApiError::Unauthorized));
            assert_eq!(err.to_string(), "Authentication required");
        }
    }
}
