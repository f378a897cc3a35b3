use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config::{self as core_config, Environment};
use service_core::error::AppError;
use std::time::Duration;

/// Minimum HMAC key length accepted for session signing in production.
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

const MAX_LOCKOUT_WINDOW_SECONDS: u64 = 7 * 24 * 60 * 60;

const MAX_HOURS: i64 = 365 * 24;

#[derive(Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    pub server: ServerSettings,
    pub session: SessionSettings,
    #[serde(default)]
    pub lockout: LockoutSettings,
    pub storefront: StorefrontSettings,
    #[serde(default)]
    pub activation: ActivationSettings,
    pub database: DatabaseSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct SessionSettings {
    /// HS256 key for operator session tokens.
    pub secret: Secret<String>,
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_session_ttl_hours() -> i64 {
    24
}

#[derive(Deserialize, Clone, Debug)]
pub struct LockoutSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_seconds: default_window_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl LockoutSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    15 * 60
}

fn default_sweep_interval_seconds() -> u64 {
    5 * 60
}

#[derive(Deserialize, Clone)]
pub struct StorefrontSettings {
    /// GraphQL endpoint of the commerce identity provider.
    pub endpoint: String,
    /// Public storefront access token sent with every provider call.
    pub access_token: Secret<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl StorefrontSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

#[derive(Deserialize, Clone, Debug)]
pub struct ActivationSettings {
    /// How long a consumed artifact is remembered.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
        }
    }
}

fn default_retention_hours() -> i64 {
    30 * 24
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Deserialize, Clone, Debug)]
pub struct TelemetrySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "storefront-auth".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(config_error("server.port must be greater than 0"));
        }

        if !(1..=MAX_HOURS).contains(&self.session.ttl_hours) {
            return Err(config_error("session.ttl_hours must be between 1 and 8760"));
        }

        if !(1..=MAX_HOURS).contains(&self.activation.retention_hours) {
            return Err(config_error(
                "activation.retention_hours must be between 1 and 8760",
            ));
        }

        if self.lockout.max_attempts == 0 {
            return Err(config_error("lockout.max_attempts must be greater than 0"));
        }

        if self.lockout.window_seconds == 0
            || self.lockout.window_seconds > MAX_LOCKOUT_WINDOW_SECONDS
        {
            return Err(config_error(
                "lockout.window_seconds must be between 1 and 604800",
            ));
        }

        if self.lockout.sweep_interval_seconds == 0 {
            return Err(config_error(
                "lockout.sweep_interval_seconds must be greater than 0",
            ));
        }

        if self.storefront.timeout_seconds == 0 {
            return Err(config_error("storefront.timeout_seconds must be greater than 0"));
        }

        if !(self.storefront.endpoint.starts_with("https://")
            || self.storefront.endpoint.starts_with("http://"))
        {
            return Err(config_error("storefront.endpoint must be an http(s) URL"));
        }

        if self.environment.is_production() {
            if self.session.secret.expose_secret().len() < MIN_PRODUCTION_SECRET_LEN {
                return Err(config_error(
                    "session.secret must be at least 32 bytes in production",
                ));
            }

            if !self.storefront.endpoint.starts_with("https://") {
                return Err(config_error("storefront.endpoint must use https in production"));
            }
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let configuration_directory = core_config::configuration_directory("storefront-auth")?;
    let settings: Settings = core_config::load(&configuration_directory)?;
    settings.validate()?;
    Ok(settings)
}
