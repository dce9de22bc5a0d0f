use actix_web::{
    delete,
    http::{header::ContentType, Method, StatusCode},
    route, web, HttpRequest, HttpResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::accounts::Credentials;
use crate::{
    accounts::AccountManager,
    error::{ApiError, Result},
    session::{Session, SessionRegistry},
};

#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
    #[serde(rename = "issuedAt")]
    pub issued_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            account_id: session.account_id.clone(),
            issued_at: session.issued_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

// HEAD answers with the status and content type GET would have, without a body.
fn respond<T: Serialize>(req: &HttpRequest, body: &T) -> HttpResponse {
    if req.method() == Method::HEAD {
        return HttpResponse::build(StatusCode::OK)
            .content_type(ContentType::json())
            .finish();
    }
    HttpResponse::Ok().json(body)
}

pub async fn open_session(
    form: web::Form<Credentials>,
    accounts: web::Data<AccountManager>,
) -> Result<HttpResponse> {
    form.validate()?;

    log::info!("Login attempt for user: {}", form.uname);
    let (account, session) = accounts.open_session(&form.uname, &form.pass).await?;

    Ok(HttpResponse::Created().json(SessionCreatedResponse {
        session_id: session.session_id,
        account_id: account.account_id,
    }))
}

#[route("", method = "GET", method = "HEAD")]
pub async fn list_sessions(
    req: HttpRequest,
    sessions: web::Data<SessionRegistry>,
    current: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let listed: Vec<SessionInfo> = sessions
        .list_by_account(&current.account_id)
        .iter()
        .map(SessionInfo::from)
        .collect();

    log::debug!(
        "Listed {} sessions for account {}",
        listed.len(),
        current.account_id
    );

    Ok(respond(&req, &SessionListResponse { sessions: listed }))
}

/// Sessions of other accounts are reported exactly like unknown ones.
fn owned_session(
    sessions: &SessionRegistry,
    current: &Session,
    session_id: &str,
) -> Result<Session> {
    sessions
        .lookup(session_id)
        .ok()
        .filter(|session| session.account_id == current.account_id)
        .ok_or(ApiError::Unauthorized)
}

#[route("/{session_id}", method = "GET", method = "HEAD")]
pub async fn get_session(
    req: HttpRequest,
    path: web::Path<String>,
    sessions: web::Data<SessionRegistry>,
    current: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let session = owned_session(&sessions, &current, &path)?;

    Ok(respond(&req, &SessionInfo::from(&session)))
}

#[delete("/{session_id}")]
pub async fn revoke_session(
    path: web::Path<String>,
    sessions: web::Data<SessionRegistry>,
    current: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let session = owned_session(&sessions, &current, &path)?;
    sessions.revoke(&session.session_id);

    log::info!("User logged out (session: {})", session.session_id);

    Ok(HttpResponse::NoContent().finish())
}
