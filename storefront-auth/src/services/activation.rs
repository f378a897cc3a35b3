//! Single-use consumption of activation artifacts.

use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

use crate::models::{ActivationArtifact, ActivationState, CustomerAccessToken, CustomerUserError};
use crate::services::clock::Clock;
use crate::services::customer::CustomerTokenClient;
use crate::services::error::ServiceError;
use crate::services::storefront::{CustomerIdentityProvider, ProviderOutcome};

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    state: ActivationState,
    updated_at: DateTime<Utc>,
}

/// Remembers which artifacts have been submitted, keyed by `ActivationArtifact::ledger_key`.
pub struct ActivationLedger {
    entries: DashMap<String, LedgerEntry>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl ActivationLedger {
    pub fn new(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
            clock,
        }
    }

    /// Moves `key` from `Pending` to `Activating`. Any other current state is returned
    /// as the error.
    pub fn begin(self: &Arc<Self>, key: String) -> Result<ActivationGuard, ActivationState> {
        let now = self.clock.now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => Err(entry.get().state),
            Entry::Vacant(entry) => {
                entry.insert(LedgerEntry {
                    state: ActivationState::Activating,
                    updated_at: now,
                });
                Ok(ActivationGuard {
                    ledger: Arc::clone(self),
                    key,
                    finished: false,
                })
            }
        }
    }

    pub fn state(&self, key: &str) -> ActivationState {
        self.entries
            .get(key)
            .map(|entry| entry.state)
            .unwrap_or(ActivationState::Pending)
    }

    /// Forgets terminal entries older than the retention period.
    pub fn prune_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.retention;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.state.is_terminal() && entry.updated_at < cutoff));
        before.saturating_sub(self.entries.len())
    }

    fn finish(&self, key: &str, state: ActivationState) {
        let now = self.clock.now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.state = state;
            entry.updated_at = now;
        }
    }
}

/// Holds an artifact in `Activating`. Dropping it unfinished marks the artifact `Failed`.
pub struct ActivationGuard {
    ledger: Arc<ActivationLedger>,
    key: String,
    finished: bool,
}

impl ActivationGuard {
    pub fn complete(mut self, state: ActivationState) {
        self.finished = true;
        self.ledger.finish(&self.key, state);
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Activation abandoned mid-flight; artifact marked failed");
            self.ledger.finish(&self.key, ActivationState::Failed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated(CustomerAccessToken),
    Rejected(Vec<CustomerUserError>),
}

#[derive(Clone)]
pub struct ActivationFlow {
    provider: Arc<dyn CustomerIdentityProvider>,
    ledger: Arc<ActivationLedger>,
    customers: CustomerTokenClient,
}

impl ActivationFlow {
    pub fn new(
        provider: Arc<dyn CustomerIdentityProvider>,
        ledger: Arc<ActivationLedger>,
        customers: CustomerTokenClient,
    ) -> Self {
        Self {
            provider,
            ledger,
            customers,
        }
    }

    pub async fn activate_by_url(
        &self,
        jar: CookieJar,
        activation_url: &str,
    ) -> Result<(CookieJar, ActivationOutcome), ServiceError> {
        let artifact =
            ActivationArtifact::from_parts(Some(activation_url.to_string()), None, None, None)
                .map_err(|e| ServiceError::Validation(e.to_string()))?;
        self.consume(jar, artifact).await
    }

    pub async fn activate(
        &self,
        jar: CookieJar,
        identifier: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(CookieJar, ActivationOutcome), ServiceError> {
        let artifact = ActivationArtifact::from_parts(
            None,
            Some(identifier.to_string()),
            Some(token.to_string()),
            Some(new_password.to_string()),
        )
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
        self.consume(jar, artifact).await
    }

    /// Consumes the artifact at most once. On success the token is persisted into the jar.
    pub async fn consume(
        &self,
        jar: CookieJar,
        artifact: ActivationArtifact,
    ) -> Result<(CookieJar, ActivationOutcome), ServiceError> {
        let guard = match self.ledger.begin(artifact.ledger_key()) {
            Ok(guard) => guard,
            Err(state) => {
                tracing::info!(
                    kind = artifact.kind(),
                    state = ?state,
                    "Activation artifact reused"
                );
                return Ok((jar, already_used()));
            }
        };

        let result = match &artifact {
            ActivationArtifact::Url { activation_url } => {
                self.provider.activate_by_url(activation_url).await
            }
            ActivationArtifact::Token {
                identifier,
                token,
                new_password,
            } => self.provider.activate(identifier, token, new_password).await,
        };

        match result {
            Ok(ProviderOutcome::Accepted(token)) => match self.customers.persist(jar, &token) {
                Ok(jar) => {
                    guard.complete(ActivationState::Activated);
                    tracing::info!(kind = artifact.kind(), "Customer account activated");
                    Ok((jar, ActivationOutcome::Activated(token)))
                }
                Err(e) => {
                    guard.complete(ActivationState::Failed);
                    Err(e)
                }
            },
            Ok(ProviderOutcome::Rejected(errors)) => {
                guard.complete(ActivationState::Failed);
                tracing::info!(kind = artifact.kind(), "Activation rejected by provider");
                Ok((jar, ActivationOutcome::Rejected(errors)))
            }
            Err(e) => {
                guard.complete(ActivationState::Failed);
                Err(e.into())
            }
        }
    }
}

fn already_used() -> ActivationOutcome {
    ActivationOutcome::Rejected(vec![CustomerUserError::new(
        "ALREADY_USED",
        "This activation link has already been used. Request a new activation email.",
    )])
}
