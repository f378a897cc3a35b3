//! Storefront GraphQL client for the external customer identity provider.
//!
//! Calls are made once with a timeout and never retried: a retried
//! `customerCreate` could register the same customer twice.

use async_trait::async_trait;
use chrono::SubsecRound;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use crate::config::StorefrontSettings;
use crate::models::{CustomerAccessToken, CustomerProfile, CustomerUserError, SignupProfile};

pub const STOREFRONT_TOKEN_HEADER: &str = "X-Shopify-Storefront-Access-Token";

/// Provider answered: either the payload or the user-facing reasons it refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome<T> {
    Accepted(T),
    Rejected(Vec<CustomerUserError>),
}

/// Infrastructure faults. Domain refusals are `ProviderOutcome::Rejected`, never these.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider returned GraphQL errors: {0}")]
    Graphql(String),

    #[error("provider response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("provider response is missing {0}")]
    MissingPayload(&'static str),

    #[error("provider unavailable")]
    Unavailable,
}

#[async_trait]
pub trait CustomerIdentityProvider: Send + Sync {
    async fn create_access_token(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError>;

    /// Returns the provider's customer id.
    async fn create_customer(
        &self,
        profile: &SignupProfile,
    ) -> Result<ProviderOutcome<String>, ProviderError>;

    async fn activate_by_url(
        &self,
        activation_url: &Url,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError>;

    async fn activate(
        &self,
        identifier: &str,
        token: &str,
        new_password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError>;

    /// `None` when the provider no longer recognizes the token.
    async fn customer(&self, access_token: &str) -> Result<Option<CustomerProfile>, ProviderError>;
}

const ACCESS_TOKEN_CREATE: &str = r#"
mutation customerAccessTokenCreate($input: CustomerAccessTokenCreateInput!) {
  customerAccessTokenCreate(input: $input) {
    customerAccessToken { accessToken expiresAt }
    customerUserErrors { code field message }
  }
}"#;

const CUSTOMER_CREATE: &str = r#"
mutation customerCreate($input: CustomerCreateInput!) {
  customerCreate(input: $input) {
    customer { id }
    customerUserErrors { code field message }
  }
}"#;

const CUSTOMER_ACTIVATE_BY_URL: &str = r#"
mutation customerActivateByUrl($activationUrl: URL!) {
  customerActivateByUrl(activationUrl: $activationUrl) {
    customerAccessToken { accessToken expiresAt }
    customerUserErrors { code field message }
  }
}"#;

const CUSTOMER_ACTIVATE: &str = r#"
mutation customerActivate($id: ID!, $input: CustomerActivateInput!) {
  customerActivate(id: $id, input: $input) {
    customerAccessToken { accessToken expiresAt }
    customerUserErrors { code field message }
  }
}"#;

const CUSTOMER_QUERY: &str = r#"
query customer($customerAccessToken: String!) {
  customer(customerAccessToken: $customerAccessToken) { id email firstName lastName }
}"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    customer_access_token: Option<CustomerAccessToken>,
    #[serde(default)]
    customer_user_errors: Vec<CustomerUserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerCreatePayload {
    customer: Option<CustomerRef>,
    #[serde(default)]
    customer_user_errors: Vec<CustomerUserError>,
}

#[derive(Deserialize)]
struct CustomerRef {
    id: String,
}

#[derive(Deserialize)]
struct CustomerQueryData {
    customer: Option<CustomerProfile>,
}

#[derive(Clone)]
pub struct StorefrontClient {
    client: Client,
    endpoint: String,
    access_token: Secret<String>,
}

impl StorefrontClient {
    pub fn new(settings: &StorefrontSettings) -> Result<Self, ProviderError> {
        Self::build(
            settings.endpoint.clone(),
            settings.access_token.clone(),
            settings.timeout(),
        )
    }

    pub fn build(
        endpoint: String,
        access_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(STOREFRONT_TOKEN_HEADER, self.access_token.expose_secret())
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Storefront request failed");
                ProviderError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(operation, status = %status, "Storefront returned an error status");
            return Err(ProviderError::Status(status.as_u16()));
        }

        let parsed: GraphQlResponse<T> = serde_json::from_str(&body)?;

        if !parsed.errors.is_empty() {
            let messages = parsed
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!(operation, errors = %messages, "Storefront GraphQL errors");
            return Err(ProviderError::Graphql(messages));
        }

        parsed.data.ok_or(ProviderError::MissingPayload("data"))
    }

    async fn token_mutation(
        &self,
        operation: &'static str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        let mut data: HashMap<String, Option<TokenPayload>> =
            self.execute(operation, query, variables).await?;
        let payload = data
            .remove(operation)
            .flatten()
            .ok_or(ProviderError::MissingPayload(operation))?;

        if !payload.customer_user_errors.is_empty() {
            return Ok(ProviderOutcome::Rejected(payload.customer_user_errors));
        }

        payload
            .customer_access_token
            .map(ProviderOutcome::Accepted)
            .ok_or(ProviderError::MissingPayload("customerAccessToken"))
    }
}

#[async_trait]
impl CustomerIdentityProvider for StorefrontClient {
    async fn create_access_token(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.token_mutation(
            "customerAccessTokenCreate",
            ACCESS_TOKEN_CREATE,
            json!({ "input": { "email": email, "password": password } }),
        )
        .await
    }

    async fn create_customer(
        &self,
        profile: &SignupProfile,
    ) -> Result<ProviderOutcome<String>, ProviderError> {
        let variables = json!({
            "input": {
                "email": profile.email,
                "password": profile.password,
                "firstName": profile.first_name,
                "lastName": profile.last_name,
                "acceptsMarketing": profile.accepts_marketing,
            }
        });

        let mut data: HashMap<String, Option<CustomerCreatePayload>> =
            self.execute("customerCreate", CUSTOMER_CREATE, variables).await?;
        let payload = data
            .remove("customerCreate")
            .flatten()
            .ok_or(ProviderError::MissingPayload("customerCreate"))?;

        if !payload.customer_user_errors.is_empty() {
            return Ok(ProviderOutcome::Rejected(payload.customer_user_errors));
        }

        payload
            .customer
            .map(|customer| ProviderOutcome::Accepted(customer.id))
            .ok_or(ProviderError::MissingPayload("customer"))
    }

    async fn activate_by_url(
        &self,
        activation_url: &Url,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.token_mutation(
            "customerActivateByUrl",
            CUSTOMER_ACTIVATE_BY_URL,
            json!({ "activationUrl": activation_url.as_str() }),
        )
        .await
    }

    async fn activate(
        &self,
        identifier: &str,
        token: &str,
        new_password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.token_mutation(
            "customerActivate",
            CUSTOMER_ACTIVATE,
            json!({
                "id": identifier,
                "input": { "activationToken": token, "password": new_password }
            }),
        )
        .await
    }

    async fn customer(&self, access_token: &str) -> Result<Option<CustomerProfile>, ProviderError> {
        let data: CustomerQueryData = self
            .execute(
                "customer",
                CUSTOMER_QUERY,
                json!({ "customerAccessToken": access_token }),
            )
            .await?;
        Ok(data.customer)
    }
}

/// In-process provider for tests and local development.
pub struct MockStorefront {
    state: Mutex<MockState>,
    token_lifetime: chrono::Duration,
    unavailable: AtomicBool,
    reject_token_creation: AtomicBool,
    calls: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    customers: HashMap<String, MockCustomer>,
    tokens: HashMap<String, String>,
    activation_urls: HashMap<String, String>,
    activation_tokens: HashMap<(String, String), String>,
}

struct MockCustomer {
    id: String,
    email: String,
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

/// What a pending mock customer needs to be activated with.
#[derive(Debug, Clone)]
pub struct PendingActivation {
    pub customer_id: String,
    pub activation_url: String,
    pub activation_token: String,
}

impl Default for MockStorefront {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStorefront {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            token_lifetime: chrono::Duration::days(30),
            unavailable: AtomicBool::new(false),
            reject_token_creation: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every subsequent call fails with `ProviderError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// `create_access_token` refuses every customer.
    pub fn set_reject_token_creation(&self, reject: bool) {
        self.reject_token_creation.store(reject, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Registers an active customer that can log in immediately.
    pub fn add_customer(&self, email: &str, password: &str) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.customers.insert(
            email.to_lowercase(),
            MockCustomer {
                id: id.clone(),
                email: email.to_lowercase(),
                password: Some(password.to_string()),
                first_name: None,
                last_name: None,
            },
        );
        id
    }

    /// Registers an invited customer that has no password until activated.
    pub fn add_pending_customer(&self, email: &str) -> PendingActivation {
        let mut state = self.lock();
        let id = state.allocate_id();
        let activation_token = uuid::Uuid::new_v4().simple().to_string();
        let numeric_id = id.rsplit('/').next().unwrap_or_default().to_string();
        let activation_url = format!(
            "https://shop.example.com/account/activate/{}/{}",
            numeric_id, activation_token
        );

        state.customers.insert(
            email.to_lowercase(),
            MockCustomer {
                id: id.clone(),
                email: email.to_lowercase(),
                password: None,
                first_name: None,
                last_name: None,
            },
        );
        state
            .activation_urls
            .insert(activation_url.clone(), id.clone());
        state
            .activation_tokens
            .insert((id.clone(), activation_token.clone()), id.clone());

        PendingActivation {
            customer_id: id,
            activation_url,
            activation_token,
        }
    }

    fn begin_call(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable);
        }
        Ok(())
    }

    fn issue_token(&self, state: &mut MockState, customer_id: &str) -> CustomerAccessToken {
        let access_token = uuid::Uuid::new_v4().simple().to_string();
        state
            .tokens
            .insert(access_token.clone(), customer_id.to_string());
        CustomerAccessToken {
            access_token,
            expires_at: (chrono::Utc::now() + self.token_lifetime).trunc_subsecs(0),
        }
    }

    fn activate_customer(
        &self,
        state: &mut MockState,
        customer_id: &str,
        password: Option<&str>,
    ) -> CustomerAccessToken {
        if let (Some(customer), Some(password)) = (
            state.customers.values_mut().find(|c| c.id == customer_id),
            password,
        ) {
            customer.password = Some(password.to_string());
        }
        self.issue_token(state, customer_id)
    }
}

impl MockState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("gid://shopify/Customer/{}", self.next_id)
    }
}

fn invalid_activation() -> ProviderOutcome<CustomerAccessToken> {
    ProviderOutcome::Rejected(vec![CustomerUserError::new(
        "TOKEN_INVALID",
        "Activation link is invalid or has already been used",
    )])
}

#[async_trait]
impl CustomerIdentityProvider for MockStorefront {
    async fn create_access_token(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.begin_call()?;
        let unidentified = ProviderOutcome::Rejected(vec![CustomerUserError::new(
            "UNIDENTIFIED_CUSTOMER",
            "Unidentified customer",
        )]);

        if self.reject_token_creation.load(Ordering::SeqCst) {
            return Ok(unidentified);
        }

        let mut state = self.lock();
        let customer_id = state
            .customers
            .get(&email.to_lowercase())
            .filter(|c| c.password.as_deref() == Some(password))
            .map(|c| c.id.clone());

        Ok(match customer_id {
            Some(id) => ProviderOutcome::Accepted(self.issue_token(&mut state, &id)),
            None => unidentified,
        })
    }

    async fn create_customer(
        &self,
        profile: &SignupProfile,
    ) -> Result<ProviderOutcome<String>, ProviderError> {
        self.begin_call()?;
        let email = profile.email.to_lowercase();
        let mut state = self.lock();

        if state.customers.contains_key(&email) {
            return Ok(ProviderOutcome::Rejected(vec![CustomerUserError {
                code: Some("TAKEN".to_string()),
                field: Some(vec!["input".to_string(), "email".to_string()]),
                message: "Email has already been taken".to_string(),
            }]));
        }

        let id = state.allocate_id();
        state.customers.insert(
            email.clone(),
            MockCustomer {
                id: id.clone(),
                email,
                password: Some(profile.password.clone()),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
            },
        );
        Ok(ProviderOutcome::Accepted(id))
    }

    async fn activate_by_url(
        &self,
        activation_url: &Url,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.begin_call()?;
        let mut state = self.lock();
        let Some(customer_id) = state.activation_urls.remove(activation_url.as_str()) else {
            return Ok(invalid_activation());
        };
        state.activation_tokens.retain(|_, id| *id != customer_id);
        Ok(ProviderOutcome::Accepted(self.activate_customer(
            &mut state,
            &customer_id,
            None,
        )))
    }

    async fn activate(
        &self,
        identifier: &str,
        token: &str,
        new_password: &str,
    ) -> Result<ProviderOutcome<CustomerAccessToken>, ProviderError> {
        self.begin_call()?;
        let mut state = self.lock();
        let key = (identifier.to_string(), token.to_string());
        let Some(customer_id) = state.activation_tokens.remove(&key) else {
            return Ok(invalid_activation());
        };
        state.activation_urls.retain(|_, id| *id != customer_id);
        Ok(ProviderOutcome::Accepted(self.activate_customer(
            &mut state,
            &customer_id,
            Some(new_password),
        )))
    }

    async fn customer(&self, access_token: &str) -> Result<Option<CustomerProfile>, ProviderError> {
        self.begin_call()?;
        let state = self.lock();
        let Some(customer_id) = state.tokens.get(access_token) else {
            return Ok(None);
        };
        Ok(state
            .customers
            .values()
            .find(|c| &c.id == customer_id)
            .map(|c| CustomerProfile {
                id: c.id.clone(),
                email: Some(c.email.clone()),
                first_name: c.first_name.clone(),
                last_name: c.last_name.clone(),
            }))
    }
}
