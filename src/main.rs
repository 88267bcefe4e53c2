#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use passgate::{configure_routes, settings::PassgateSettings, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = PassgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let state = AppState::from_settings(&settings)
        .map_err(|e| std::io::Error::other(format!("Failed to initialize ceremonies: {e}")))?;

    start_server(state, &settings).await
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(state: AppState, settings: &PassgateSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    let state = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &PassgateSettings) {
    log::info!("Starting passgate {} on {bind_address}", passgate::VERSION);
    log::info!(
        "Relying party {} ({}) at {}",
        settings.relying_party.id,
        settings.relying_party.name,
        settings.relying_party.origin
    );
    log::info!(
        "Attestation factor {}, assertion factor {}, attestation policy {}",
        settings.ceremony.attestation_factor,
        settings.ceremony.assertion_factor,
        settings.ceremony.attestation_policy
    );
}
