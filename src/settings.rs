use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::webauthn::{
    AttestationConveyance, AttestationPolicy, AuthenticatorAttachment, CeremonyPolicy,
    RelyingPartyIdentity, UserVerificationFactor, UserVerificationRequirement,
    MIN_CHALLENGE_SIZE,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassgateSettings {
    pub application: ApplicationSettings,
    pub relying_party: RelyingPartySettings,
    pub ceremony: CeremonySettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartySettings {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonySettings {
    pub timeout_seconds: u64,
    pub challenge_size: usize,
    pub user_id_size: usize,
    /// Conveyance preference sent to clients ("none", "indirect", "direct")
    pub attestation: String,
    pub crypto_params: Vec<i64>,
    /// "platform", "cross-platform", or empty for no preference
    pub authenticator_attachment: String,
    pub require_resident_key: bool,
    /// "required", "preferred", "discouraged"
    pub user_verification: String,
    /// "first" requires user verification (PIN), "second" requires user
    /// presence (touch), "either" accepts both
    pub attestation_factor: String,
    pub assertion_factor: String,
    /// "none" checks attestation structure only, "direct" requires a verified statement
    pub attestation_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// "memory" or "file"
    pub backend: String,
    pub path: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for RelyingPartySettings {
    fn default() -> Self {
        Self {
            id: "localhost".to_string(),
            name: "Local Host".to_string(),
            icon: None,
            origin: "https://localhost:8080".to_string(),
        }
    }
}

impl Default for CeremonySettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            challenge_size: 128,
            user_id_size: 32,
            attestation: "none".to_string(),
            crypto_params: vec![-7, -257],
            authenticator_attachment: "cross-platform".to_string(),
            require_resident_key: false,
            user_verification: "preferred".to_string(),
            attestation_factor: "either".to_string(),
            assertion_factor: "either".to_string(),
            attestation_policy: "none".to_string(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path: "users.json".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl LoggingSettings {
    /// Logger filtered by `level`, in `env_logger` filter syntax
    /// (`info`, `passgate=debug,actix_web=warn`, ...)
    #[must_use]
    pub fn logger(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&self.level);
        builder
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PassgateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    /// - The resulting settings fail validation
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        // `RUST_LOG` has already been folded into `logging.level`
        settings.logging.logger().try_init()?;

        settings.relying_party_identity()?;
        settings.ceremony.policy()?;

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSGATE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read
    /// - TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml(&fs::read_to_string(&default_config_path)?)?;
            log::info!("Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("PASSGATE_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_toml(&fs::read_to_string(&secrets_path)?)?;
                log::info!("Overriding settings from {}", secrets_path.display());
            } else {
                log::info!(
                    "PASSGATE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a TOML settings document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid settings TOML
    pub fn from_toml(content: &str) -> Result<Self, basic_toml::Error> {
        basic_toml::from_str(content)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_ceremony_env_overrides(&mut settings.ceremony);
        Self::apply_store_env_overrides(&mut settings.store);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
    }

    fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(id) = std::env::var("RP_ID") {
            rp_settings.id = id;
        }
        if let Ok(name) = std::env::var("RP_NAME") {
            rp_settings.name = name;
        }
        if let Ok(origin) = std::env::var("RP_ORIGIN") {
            rp_settings.origin = origin;
        }
        if let Ok(icon) = std::env::var("RP_ICON") {
            rp_settings.icon = Some(icon).filter(|i| !i.is_empty());
        }
    }

    fn apply_ceremony_env_overrides(ceremony_settings: &mut CeremonySettings) {
        Self::apply_numeric_env_override(
            "CEREMONY_TIMEOUT_SECONDS",
            &mut ceremony_settings.timeout_seconds,
        );
        if let Ok(size) = std::env::var("CHALLENGE_SIZE") {
            if let Ok(size) = size.parse::<usize>() {
                ceremony_settings.challenge_size = size;
            }
        }
        if let Ok(factor) = std::env::var("ATTESTATION_FACTOR") {
            ceremony_settings.attestation_factor = factor;
        }
        if let Ok(factor) = std::env::var("ASSERTION_FACTOR") {
            ceremony_settings.assertion_factor = factor;
        }
    }

    fn apply_store_env_overrides(store_settings: &mut StoreSettings) {
        if let Ok(backend) = std::env::var("STORE_BACKEND") {
            store_settings.backend = backend;
        }
        if let Ok(path) = std::env::var("STORE_PATH") {
            store_settings.path = path;
        }
        Self::apply_numeric_env_override("STORE_TIMEOUT_MS", &mut store_settings.timeout_ms);
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Validated, immutable relying party identity
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty, the origin is not a URL, or the
    /// origin is not https (plain http is allowed for localhost only)
    pub fn relying_party_identity(&self) -> Result<RelyingPartyIdentity, String> {
        let rp = &self.relying_party;
        if rp.id.is_empty() {
            return Err("Relying party ID cannot be empty".to_string());
        }

        let origin = url::Url::parse(&rp.origin)
            .map_err(|e| format!("Invalid relying party origin {}: {e}", rp.origin))?;
        let is_localhost = origin.host_str() == Some("localhost");
        if origin.scheme() != "https" && !(origin.scheme() == "http" && is_localhost) {
            return Err("Origin must be https:// except for localhost".to_string());
        }
        let host = origin.host_str().unwrap_or_default();
        if host != rp.id && !host.ends_with(&format!(".{}", rp.id)) {
            return Err(format!(
                "Relying party ID {} is not a registrable suffix of origin host {host}",
                rp.id
            ));
        }

        Ok(RelyingPartyIdentity {
            id: rp.id.clone(),
            name: rp.name.clone(),
            icon: rp.icon.clone(),
            // Url normalises away a trailing slash browsers never send
            origin: origin.origin().ascii_serialization(),
        })
    }

    /// Store call timeout
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }
}

impl CeremonySettings {
    /// Convert string settings into a typed ceremony policy
    ///
    /// # Errors
    ///
    /// Returns an error naming the first setting with an unrecognised value
    pub fn policy(&self) -> Result<CeremonyPolicy, String> {
        if self.challenge_size < MIN_CHALLENGE_SIZE {
            return Err(format!(
                "challenge_size must be at least {MIN_CHALLENGE_SIZE} bytes"
            ));
        }
        if self.user_id_size == 0 || self.user_id_size > 64 {
            return Err("user_id_size must be between 1 and 64 bytes".to_string());
        }
        if self.crypto_params.is_empty() {
            return Err("crypto_params cannot be empty".to_string());
        }

        let authenticator_attachment = if self.authenticator_attachment.is_empty() {
            None
        } else {
            Some(parse_setting::<AuthenticatorAttachment>(
                "authenticator_attachment",
                &self.authenticator_attachment,
            )?)
        };

        Ok(CeremonyPolicy {
            timeout_ms: u32::try_from(self.timeout_seconds.saturating_mul(1000))
                .unwrap_or(u32::MAX),
            challenge_size: self.challenge_size,
            user_id_size: self.user_id_size,
            attestation: parse_setting::<AttestationConveyance>("attestation", &self.attestation)?,
            algorithms: self.crypto_params.clone(),
            authenticator_attachment,
            require_resident_key: self.require_resident_key,
            user_verification: parse_setting::<UserVerificationRequirement>(
                "user_verification",
                &self.user_verification,
            )?,
            attestation_factor: parse_setting::<UserVerificationFactor>(
                "attestation_factor",
                &self.attestation_factor,
            )?,
            assertion_factor: parse_setting::<UserVerificationFactor>(
                "assertion_factor",
                &self.assertion_factor,
            )?,
            attestation_policy: parse_setting::<AttestationPolicy>(
                "attestation_policy",
                &self.attestation_policy,
            )?,
        })
    }
}

/// Policy enums share their serde names with the settings strings
fn parse_setting<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("Unrecognised value {value:?} for {name}"))
}
