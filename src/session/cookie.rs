use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::HttpRequest;

/// Cookie carrying the ceremony session id
pub const SESSION_COOKIE: &str = "passgate_ceremony";

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: time::Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
            path: "/auth".to_string(),
            max_age: time::Duration::minutes(5),
        }
    }
}

/// Session cookie holding `session_id` for `max_age_seconds`
#[must_use]
pub fn session_cookie(session_id: &str, max_age_seconds: u64) -> Cookie<'static> {
    let options = CookieOptions {
        max_age: time::Duration::seconds(i64::try_from(max_age_seconds).unwrap_or(300)),
        ..Default::default()
    };
    build_cookie(session_id.to_string(), options)
}

/// Expired cookie that makes the browser forget the session id
#[must_use]
pub fn clear_session_cookie() -> Cookie<'static> {
    build_cookie(
        String::new(),
        CookieOptions {
            max_age: time::Duration::ZERO,
            ..Default::default()
        },
    )
}

/// Session id presented by the client, if any
#[must_use]
pub fn session_id_from_request(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn build_cookie(value: String, options: CookieOptions) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .http_only(options.http_only)
        .secure(options.secure)
        .same_site(options.same_site)
        .path(options.path)
        .max_age(options.max_age)
        .finish()
}
