use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::{error::Result, session::SessionRegistry};

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    #[serde(rename = "activeSessions")]
    pub active_sessions: usize,
}

#[get("/health")]
pub async fn health_check(sessions: Option<web::Data<SessionRegistry>>) -> Result<HttpResponse> {
    let active_sessions = sessions
        .map(|registry| registry.active_session_count())
        .unwrap_or(0);

    Ok(HttpResponse::Ok().json(HealthCheckResponse {
        status: "healthy".to_string(),
        active_sessions,
    }))
}
