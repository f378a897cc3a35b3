pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use service_core::config::Environment;
use service_core::middleware::security_headers::SecurityHeaders;
use std::sync::Arc;

use services::{
    ActivationFlow, ActivationLedger, AdminSessionManager, Clock, CredentialStore,
    CustomerIdentityProvider, CustomerTokenClient, LoginAttemptTracker, OperatorAuthService,
};

/// Everything the application is assembled from. Production and tests differ only here.
pub struct AppComponents {
    pub service_name: String,
    pub environment: Environment,
    pub clock: Arc<dyn Clock>,
    pub credentials: Arc<dyn CredentialStore>,
    pub login_attempts: Arc<dyn LoginAttemptTracker>,
    pub sessions: AdminSessionManager,
    pub provider: Arc<dyn CustomerIdentityProvider>,
    pub activation_ledger: Arc<ActivationLedger>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub environment: Environment,
    pub credentials: Arc<dyn CredentialStore>,
    pub operators: OperatorAuthService,
    pub sessions: AdminSessionManager,
    pub customers: CustomerTokenClient,
    pub activation: ActivationFlow,
    pub security_headers: SecurityHeaders,
}

impl AppState {
    pub fn new(components: AppComponents) -> Self {
        let AppComponents {
            service_name,
            environment,
            clock,
            credentials,
            login_attempts,
            sessions,
            provider,
            activation_ledger,
        } = components;

        let operators = OperatorAuthService::new(
            credentials.clone(),
            login_attempts,
            sessions.clone(),
            clock,
        );
        let customers = CustomerTokenClient::new(provider.clone(), environment.is_production());
        let activation = ActivationFlow::new(provider, activation_ledger, customers.clone());

        Self {
            service_name,
            environment,
            credentials,
            operators,
            sessions,
            customers,
            activation,
            security_headers: SecurityHeaders::for_environment(environment),
        }
    }
}
