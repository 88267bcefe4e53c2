use actix_web::{HttpResponse, Result};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe
///
/// # Errors
///
/// Never fails; the `Result` matches the other handlers' signatures
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}
