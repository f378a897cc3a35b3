use crate::error::AppError;
use config::{Config as Cfg, Environment as EnvSource, File};
use serde::{Deserialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

/// Deployment environment. Production switches on Secure cookies and HSTS.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Prod
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Locates `<crate>/config` whether the process runs from the workspace root or the crate.
pub fn configuration_directory(crate_name: &str) -> Result<PathBuf, AppError> {
    let base_path = std::env::current_dir()?;

    if base_path.ends_with(crate_name) {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join(crate_name).join("config"))
    }
}

/// Loads layered settings: `base.yaml`, then `<environment>.yaml` if present, then
/// `APP_`-prefixed environment variables (`__` separates nested keys).
pub fn load<T: DeserializeOwned>(configuration_directory: &Path) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| Environment::Dev.as_str().to_string())
        .parse()
        .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

    let settings = Cfg::builder()
        .add_source(File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            File::from(configuration_directory.join(format!("{}.yaml", environment.as_str())))
                .required(false),
        )
        .add_source(
            EnvSource::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
