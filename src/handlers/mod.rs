// HTTP request handlers for the registration and login ceremonies
pub mod ceremony;
pub mod health;
pub mod responses;

// Re-export the main handler functions
pub use ceremony::{
    configure_routes, login_begin, login_complete, register_begin, register_complete, AppState,
    LoginBeginRequest, RegisterBeginRequest,
};
pub use health::health;
pub use responses::error_response;
