//! Ceremony session management
//!
//! Pending ceremonies live server-side between the `begin` and `complete`
//! requests, keyed by an opaque random id carried in a cookie. Each entry is
//! overwritten by the next `begin` on the same session, expires with the
//! ceremony timeout, and is removed by the first read.
//!
//! # Modules
//!
//! - [`store`] - In-memory store of pending ceremonies
//! - [`cookie`] - Session cookie creation and extraction

pub mod cookie;
pub mod store;

pub use cookie::{clear_session_cookie, session_cookie, session_id_from_request, SESSION_COOKIE};
pub use store::{CeremonySessionStore, PendingCeremony};
