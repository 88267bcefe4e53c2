//! JSON replies shared by the ceremony handlers

use actix_web::cookie::Cookie;
use actix_web::HttpResponse;
use serde_json::json;

use crate::webauthn::CeremonyError;

/// Convert a `CeremonyError` to an HTTP response
///
/// The body only ever carries the generic public message; the precise error
/// kind has already been logged by the ceremony layer.
#[must_use]
pub fn error_response(error: &CeremonyError) -> HttpResponse {
    let body = json!({ "error": error.public_message() });
    match error {
        CeremonyError::StoreUnavailable(_) => HttpResponse::ServiceUnavailable()
            .insert_header(("Retry-After", "1"))
            .json(body),
        CeremonyError::InternalEntropyFailure => HttpResponse::InternalServerError().json(body),
        CeremonyError::InvalidInput(_)
        | CeremonyError::MalformedInput(_)
        | CeremonyError::UnknownUser(_) => HttpResponse::BadRequest().json(body),
        CeremonyError::DuplicateUser(_) => HttpResponse::Conflict().json(body),
        _ => HttpResponse::Unauthorized().json(body),
    }
}

/// Reply for a `complete` request without a live pending ceremony
#[must_use]
pub fn no_ceremony_response(clear: Cookie<'static>) -> HttpResponse {
    HttpResponse::BadRequest().cookie(clear).json(json!({
        "error": "No ceremony in progress for this session"
    }))
}

#[must_use]
pub fn success_response(clear: Cookie<'static>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(clear)
        .json(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                CeremonyError::StoreUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CeremonyError::InvalidInput("empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CeremonyError::UnknownUser("bob".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                CeremonyError::DuplicateUser("alice".into()),
                StatusCode::CONFLICT,
            ),
            (CeremonyError::ChallengeMismatch, StatusCode::UNAUTHORIZED),
            (CeremonyError::SignatureInvalid, StatusCode::UNAUTHORIZED),
            (
                CeremonyError::InternalEntropyFailure,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error_response(&error).status(), status, "{error}");
        }
    }

    #[test]
    fn test_store_outage_is_marked_retryable() {
        let response = error_response(&CeremonyError::StoreUnavailable("timeout".into()));
        assert_eq!(
            response.headers().get("Retry-After").unwrap(),
            "1"
        );
    }
}
