//! Testing utilities for passgate
//!
//! Available to unit tests and, behind the `testing` feature, to the
//! integration tests in `tests/`.
//!
//! ## Organization
//!
//! - [`authenticator`] - Software authenticator producing real signed responses
//! - [`fixtures`] - Pre-built relying party, policy, services and settings
//! - [`mock`] - Credential stores that fail or stall on demand
//! - [`requests`] - HTTP request helpers that carry the ceremony cookie
//!
//! ## Usage
//!
//! ```rust,ignore
//! use passgate::testing::TestFixtures;
//!
//! async fn register_and_login() {
//!     let service = TestFixtures::ceremony_service();
//!     let mut authenticator = TestFixtures::enrolled(&service, "alice").await;
//!
//!     let start = service.begin_login("alice").await.unwrap();
//!     let response = authenticator.login(&start.options);
//!     service.complete_login(&response, start.pending).await.unwrap();
//! }
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod mock;
pub mod requests;

// Re-export commonly used items for convenience
pub use authenticator::{AttestationCertificate, AttestationStyle, SoftAuthenticator, Tamper};
pub use fixtures::TestFixtures;
pub use mock::FlakyStore;
pub use requests::{ceremony_cookie, post_json};

/// Common test constants
pub mod constants {
    pub const TEST_RP_ID: &str = "example.test";

    pub const TEST_RP_NAME: &str = "Example";

    pub const TEST_ORIGIN: &str = "https://example.test";

    /// Origin of a phishing site relaying a genuine authenticator
    pub const EVIL_ORIGIN: &str = "https://evil.test";
}
