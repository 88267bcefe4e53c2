//! Ceremony request handlers
//!
//! Thin transport over [`CeremonyService`]: the handlers extract JSON bodies,
//! park pending ceremonies in the server-side session store and turn results
//! into JSON replies.

use std::sync::Arc;

use actix_web::{error::InternalError, web, HttpRequest, HttpResponse};
use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;

use super::health::health;
use super::responses::{error_response, no_ceremony_response, success_response};
use crate::ceremony::CeremonyService;
use crate::credentials::{CredentialRecordManager, CredentialStore, FileStore, MemoryStore};
use crate::settings::PassgateSettings;
use crate::session::{
    clear_session_cookie, session_cookie, session_id_from_request, CeremonySessionStore,
    PendingCeremony,
};
use crate::webauthn::{LoginResponse, RegistrationResponse};

const MAX_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Shared state behind every ceremony route
pub struct AppState {
    pub ceremonies: CeremonyService,
    pub sessions: CeremonySessionStore,
    pub session_ttl_seconds: u64,
}

impl AppState {
    /// Sessions live as long as a ceremony may take, capped at a day
    #[must_use]
    pub fn new(ceremonies: CeremonyService, session_ttl_seconds: u64) -> Self {
        let session_ttl_seconds = session_ttl_seconds.min(MAX_SESSION_TTL_SECONDS);
        let ttl = chrono::Duration::try_seconds(i64::try_from(session_ttl_seconds).unwrap_or(60))
            .unwrap_or_else(|| chrono::Duration::seconds(60));
        Self {
            ceremonies,
            sessions: CeremonySessionStore::new(ttl),
            session_ttl_seconds,
        }
    }

    /// Wire the credential store, record manager and ceremony service
    /// described by `settings`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The relying party identity or ceremony policy is invalid
    /// - The store backend is unknown
    pub fn from_settings(settings: &PassgateSettings) -> anyhow::Result<Self> {
        let rp = settings
            .relying_party_identity()
            .map_err(|e| anyhow!("Invalid relying party settings: {e}"))?;
        let policy = settings
            .ceremony
            .policy()
            .map_err(|e| anyhow!("Invalid ceremony settings: {e}"))?;

        let store: Arc<dyn CredentialStore> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryStore::new()),
            "file" => Arc::new(FileStore::new(&settings.store.path)),
            other => return Err(anyhow!("Unknown store backend: {other}")),
        };
        log::info!("Using {} credential store", settings.store.backend);

        let records = CredentialRecordManager::new(store, settings.store_timeout());
        let ceremonies = CeremonyService::new(rp, policy, Arc::new(records));
        Ok(Self::new(ceremonies, settings.ceremony.timeout_seconds))
    }

    /// Park `ceremony` under a fresh session id, dropping the one the
    /// client held before
    fn start_session(&self, req: &HttpRequest, ceremony: PendingCeremony) -> String {
        if let Some(previous) = session_id_from_request(req) {
            let _ = self.sessions.take(&previous);
        }
        let session_id = CeremonySessionStore::new_session_id();
        self.sessions.insert(&session_id, ceremony);
        session_id
    }

    fn take_session(&self, req: &HttpRequest) -> Option<PendingCeremony> {
        session_id_from_request(req).and_then(|id| self.sessions.take(&id))
    }
}

/// Registration request (HTTP endpoint format)
#[derive(Deserialize)]
pub struct RegisterBeginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct LoginBeginRequest {
    #[serde(default)]
    pub username: String,
}

/// `POST /auth/register-begin`
pub async fn register_begin(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegisterBeginRequest>,
) -> HttpResponse {
    match state
        .ceremonies
        .begin_registration(&body.username, &body.display_name)
    {
        Ok(start) => {
            let session_id =
                state.start_session(&req, PendingCeremony::Registration(start.pending));
            HttpResponse::Ok()
                .cookie(session_cookie(&session_id, state.session_ttl_seconds))
                .json(start.options)
        }
        Err(e) => error_response(&e),
    }
}

/// `POST /auth/register-complete`
pub async fn register_complete(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RegistrationResponse>,
) -> HttpResponse {
    let pending = match state.take_session(&req) {
        Some(PendingCeremony::Registration(pending)) => pending,
        other => {
            log::warn!(
                "Registration response without a pending registration (found {})",
                other.as_ref().map_or("nothing", PendingCeremony::kind)
            );
            return no_ceremony_response(clear_session_cookie());
        }
    };

    match state.ceremonies.complete_registration(&body, pending).await {
        Ok(_) => success_response(clear_session_cookie()),
        Err(e) => error_response(&e),
    }
}

/// `POST /auth/login-begin`
pub async fn login_begin(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginBeginRequest>,
) -> HttpResponse {
    match state.ceremonies.begin_login(&body.username).await {
        Ok(start) => {
            let session_id = state.start_session(&req, PendingCeremony::Login(start.pending));
            HttpResponse::Ok()
                .cookie(session_cookie(&session_id, state.session_ttl_seconds))
                .json(start.options)
        }
        Err(e) => error_response(&e),
    }
}

/// `POST /auth/login-complete`
pub async fn login_complete(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LoginResponse>,
) -> HttpResponse {
    let pending = match state.take_session(&req) {
        Some(PendingCeremony::Login(pending)) => pending,
        other => {
            log::warn!(
                "Login response without a pending login (found {})",
                other.as_ref().map_or("nothing", PendingCeremony::kind)
            );
            return no_ceremony_response(clear_session_cookie());
        }
    };

    match state.ceremonies.complete_login(&body, pending).await {
        Ok(_) => success_response(clear_session_cookie()),
        Err(e) => error_response(&e),
    }
}

/// Mount the ceremony routes and a JSON extractor that answers malformed
/// bodies in the same `{ "error": ... }` shape
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected request body: {err}");
        let response = HttpResponse::BadRequest().json(json!({
            "error": "Malformed request body"
        }));
        InternalError::from_response(err, response).into()
    });

    cfg.app_data(json_config)
        .route("/auth/register-begin", web::post().to(register_begin))
        .route("/auth/register-complete", web::post().to(register_complete))
        .route("/auth/login-begin", web::post().to(login_begin))
        .route("/auth/login-complete", web::post().to(login_complete))
        .route("/health", web::get().to(health));
}
