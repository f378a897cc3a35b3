use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::models::{CustomerAccessToken, CustomerProfile, CustomerUserError, SignupProfile};
use crate::services::error::ServiceError;
use crate::services::storefront::{CustomerIdentityProvider, ProviderOutcome};
use crate::utils::cookies::{auth_cookie, removal_cookie};

pub const CUSTOMER_TOKEN_COOKIE: &str = "customerAccessToken";

/// Result of the two-step signup. The steps are not atomic: the customer can
/// exist at the provider without a local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    Authenticated(CustomerAccessToken),
    Rejected(Vec<CustomerUserError>),
    CreatedWithoutSession(Vec<CustomerUserError>),
}

/// Exchanges customer credentials for provider tokens and keeps the token in a cookie.
#[derive(Clone)]
pub struct CustomerTokenClient {
    provider: Arc<dyn CustomerIdentityProvider>,
    secure_cookies: bool,
}

impl CustomerTokenClient {
    pub fn new(provider: Arc<dyn CustomerIdentityProvider>, secure_cookies: bool) -> Self {
        Self {
            provider,
            secure_cookies,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ServiceError> {
        let outcome = self.provider.create_access_token(email, password).await?;
        if let ProviderOutcome::Rejected(errors) = &outcome {
            tracing::info!(errors = errors.len(), "Customer login rejected by provider");
        }
        Ok(outcome)
    }

    /// Creates the customer, then logs in with the same credentials. No retry and no
    /// compensation if the second step fails.
    pub async fn signup(&self, profile: SignupProfile) -> Result<SignupOutcome, ServiceError> {
        let customer_id = match self.provider.create_customer(&profile).await? {
            ProviderOutcome::Accepted(id) => id,
            ProviderOutcome::Rejected(errors) => return Ok(SignupOutcome::Rejected(errors)),
        };

        tracing::info!(customer_id = %customer_id, "Customer created");

        match self
            .provider
            .create_access_token(&profile.email, &profile.password)
            .await
        {
            Ok(ProviderOutcome::Accepted(token)) => Ok(SignupOutcome::Authenticated(token)),
            Ok(ProviderOutcome::Rejected(errors)) => {
                tracing::warn!(
                    customer_id = %customer_id,
                    "Customer created but token exchange was rejected"
                );
                Ok(SignupOutcome::CreatedWithoutSession(errors))
            }
            Err(e) => {
                tracing::error!(
                    customer_id = %customer_id,
                    error = %e,
                    "Customer created but token exchange failed"
                );
                Ok(SignupOutcome::CreatedWithoutSession(vec![CustomerUserError::new(
                    "SESSION_UNAVAILABLE",
                    "Your account was created. Please sign in.",
                )]))
            }
        }
    }

    /// Stores the token; the cookie expires exactly when the token does.
    pub fn persist(
        &self,
        jar: CookieJar,
        token: &CustomerAccessToken,
    ) -> Result<CookieJar, ServiceError> {
        let expires = OffsetDateTime::from_unix_timestamp(token.expires_at.timestamp())
            .map_err(|e| anyhow::anyhow!("Token expiry out of range: {}", e))?;

        Ok(jar.add(auth_cookie(
            CUSTOMER_TOKEN_COOKIE,
            token.access_token.clone(),
            expires,
            self.secure_cookies,
        )))
    }

    /// Clears the cookie. Safe to call with no cookie present.
    pub fn logout(&self, jar: CookieJar) -> CookieJar {
        jar.remove(removal_cookie(CUSTOMER_TOKEN_COOKIE))
    }

    pub fn current_token(jar: &CookieJar) -> Option<String> {
        jar.get(CUSTOMER_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Profile for the token in the jar; `None` if absent or no longer accepted.
    pub async fn customer_profile(
        &self,
        jar: &CookieJar,
    ) -> Result<Option<CustomerProfile>, ServiceError> {
        let Some(token) = Self::current_token(jar) else {
            return Ok(None);
        };
        Ok(self.provider.customer(&token).await?)
    }
}
