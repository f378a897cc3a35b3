use service_core::error::AppError;
use thiserror::Error;

use crate::services::storefront::ProviderError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session rejected")]
    SessionRejected,

    #[error("Login temporarily locked")]
    Locked { retry_after_secs: u64 },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::InvalidInput(msg),
            ServiceError::InvalidCredentials | ServiceError::SessionRejected => {
                AppError::Unauthenticated
            }
            ServiceError::Locked { retry_after_secs } => AppError::TooManyRequests(
                "Too many failed login attempts. Please try again later.".to_string(),
                Some(retry_after_secs),
            ),
            ServiceError::Provider(e) => AppError::BadGateway(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
