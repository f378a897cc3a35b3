use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::models::OperatorSession;

/// Login form posted by the admin sign-in page.
#[derive(Deserialize, Validate)]
pub struct AdminLoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    pub password: String,
}

impl fmt::Debug for AdminLoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminLoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct OperatorSessionResponse {
    pub operator_id: Uuid,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&OperatorSession> for OperatorSessionResponse {
    fn from(session: &OperatorSession) -> Self {
        Self {
            operator_id: session.sub,
            issued_at: DateTime::from_timestamp(session.iat, 0),
            expires_at: DateTime::from_timestamp(session.exp, 0),
        }
    }
}
