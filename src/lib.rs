#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ceremony;
pub mod credentials;
pub mod handlers;
pub mod session;
pub mod settings;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use ceremony::{CeremonyService, CeremonyState, PendingLogin, PendingRegistration};
pub use credentials::{CredentialRecord, CredentialRecordManager, CredentialStore};
pub use handlers::{configure_routes, AppState};
pub use settings::PassgateSettings;
pub use webauthn::CeremonyError;
