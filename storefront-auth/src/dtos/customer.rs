use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::models::{CustomerAccessToken, CustomerUserError, SignupProfile};

const REDACTED: &str = "[REDACTED]";

#[derive(Deserialize, Validate)]
pub struct CustomerLoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    pub password: String,
}

impl fmt::Debug for CustomerLoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerLoginRequest")
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 1024, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 255))]
    pub first_name: Option<String>,

    #[validate(length(max = 255))]
    pub last_name: Option<String>,

    #[serde(default)]
    pub accepts_marketing: bool,
}

impl fmt::Debug for CustomerSignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomerSignupRequest")
            .field("email", &self.email)
            .field("password", &REDACTED)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("accepts_marketing", &self.accepts_marketing)
            .finish()
    }
}

impl From<CustomerSignupRequest> for SignupProfile {
    fn from(req: CustomerSignupRequest) -> Self {
        Self {
            email: req.email.trim().to_string(),
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            accepts_marketing: req.accepts_marketing,
        }
    }
}

/// Either `activationUrl` alone or `identifier` + `token` + `newPassword`.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    #[validate(length(max = 2048))]
    pub activation_url: Option<String>,

    #[validate(length(max = 255))]
    pub identifier: Option<String>,

    #[validate(length(max = 512))]
    pub token: Option<String>,

    #[validate(length(max = 1024))]
    pub new_password: Option<String>,
}

/// Only reports which fields are present; every one of them can unlock an account.
impl fmt::Debug for ActivationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationRequest")
            .field("activation_url", &self.activation_url.as_ref().map(|_| REDACTED))
            .field("identifier", &self.identifier)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("new_password", &self.new_password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSessionResponse {
    pub expires_at: DateTime<Utc>,
}

impl From<&CustomerAccessToken> for CustomerSessionResponse {
    fn from(token: &CustomerAccessToken) -> Self {
        Self {
            expires_at: token.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerErrorsResponse {
    pub errors: Vec<CustomerUserError>,
}

#[derive(Debug, Serialize)]
pub struct SignupPendingResponse {
    pub message: String,
    pub errors: Vec<CustomerUserError>,
}
