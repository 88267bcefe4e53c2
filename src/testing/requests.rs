//! HTTP request helpers for testing handlers

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test::TestRequest;
use serde::Serialize;

use crate::session::SESSION_COOKIE;

/// POST `body` as JSON to `uri`, presenting `session` as the ceremony cookie
#[must_use]
pub fn post_json<T: Serialize>(uri: &str, body: &T, session: Option<&Cookie<'_>>) -> TestRequest {
    let request = TestRequest::post().uri(uri).set_json(body);
    match session {
        Some(cookie) => request.cookie(Cookie::new(SESSION_COOKIE, cookie.value().to_string())),
        None => request,
    }
}

/// Ceremony cookie set by a `begin` response
#[must_use]
pub fn ceremony_cookie<B>(response: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(Cookie::into_owned)
}
