use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::models::operator::normalize_identifier;
use crate::services::clock::Clock;
use crate::services::credentials::CredentialStore;
use crate::services::error::ServiceError;
use crate::services::lockout::{AttemptAdmission, LoginAttemptTracker};
use crate::services::session::{AdminSessionManager, IssuedSession};
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};

/// Hash checked when the email is unknown, so both paths pay for one Argon2 verification.
static DUMMY_HASH: Lazy<Option<PasswordHashString>> = Lazy::new(|| {
    hash_password(&Password::new("storefront-auth-dummy-password".to_string())).ok()
});

/// Operator login: attempt admission, credential check, session issue.
#[derive(Clone)]
pub struct OperatorAuthService {
    store: Arc<dyn CredentialStore>,
    attempts: Arc<dyn LoginAttemptTracker>,
    sessions: AdminSessionManager,
    clock: Arc<dyn Clock>,
}

impl OperatorAuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        attempts: Arc<dyn LoginAttemptTracker>,
        sessions: AdminSessionManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            attempts,
            sessions,
            clock,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: Password,
    ) -> Result<IssuedSession, ServiceError> {
        let identifier = normalize_identifier(email);

        // The attempt counts as a failure from here until a verified password clears it.
        let failures = match self.attempts.begin_attempt(&identifier).await? {
            AttemptAdmission::Admitted { failures } => failures,
            AttemptAdmission::Locked { until } => {
                let retry_after_secs = (until - self.clock.now()).num_seconds().max(1) as u64;
                tracing::info!(retry_after_secs, "Login refused while locked");
                return Err(ServiceError::Locked { retry_after_secs });
            }
        };

        let account = self.store.find_by_email(&identifier).await?;
        let stored_hash = account
            .as_ref()
            .map(|account| PasswordHashString::new(account.password_hash.clone()));

        let verified = check_password(password, stored_hash).await?;

        match account {
            Some(account) if verified => {
                self.attempts.record_success(&identifier).await?;
                let session = self.sessions.issue(account.id)?;
                tracing::info!(operator_id = %account.id, "Operator logged in");
                Ok(session)
            }
            _ => {
                tracing::info!(failures, "Operator login failed");
                Err(ServiceError::InvalidCredentials)
            }
        }
    }
}

/// Argon2 runs on the blocking pool. An unreadable stored hash counts as a mismatch.
async fn check_password(
    password: Password,
    stored_hash: Option<PasswordHashString>,
) -> Result<bool, ServiceError> {
    let outcome = tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Stored operator hash is unreadable");
            false
        }),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_ref() {
                let _ = verify_password(&password, dummy);
            }
            false
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperatorAccount;
    use crate::services::clock::ManualClock;
    use crate::services::credentials::InMemoryCredentialStore;
    use crate::services::lockout::{InMemoryLoginAttemptTracker, LockoutPolicy};
    use chrono::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryCredentialStore>,
        attempts: Arc<InMemoryLoginAttemptTracker>,
        service: OperatorAuthService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryCredentialStore::new());
        let attempts = Arc::new(InMemoryLoginAttemptTracker::new(
            LockoutPolicy::default(),
            clock.clone(),
        ));
        let sessions = AdminSessionManager::from_secret(
            b"operator-service-test-secret",
            Duration::hours(24),
            store.clone(),
            clock.clone(),
        );
        let service =
            OperatorAuthService::new(store.clone(), attempts.clone(), sessions, clock.clone());
        Fixture {
            clock,
            store,
            attempts,
            service,
        }
    }

    fn seed(store: &InMemoryCredentialStore, email: &str, password: &str) {
        let hash = hash_password(&Password::new(password.to_string())).unwrap();
        store.insert(OperatorAccount::new(email, hash.into_string()));
    }

    fn pw(s: &str) -> Password {
        Password::new(s.to_string())
    }

    #[tokio::test]
    async fn correct_credentials_issue_session_and_clear_failures() {
        let f = fixture();
        seed(&f.store, "ops@example.com", "right-password");

        f.service.login("ops@example.com", pw("wrong")).await.unwrap_err();
        assert_eq!(f.attempts.failure_count("ops@example.com").await.unwrap(), 1);

        let session = f.service.login("OPS@example.com ", pw("right-password")).await.unwrap();
        assert_eq!(session.claims.exp - session.claims.iat, 24 * 3600);
        assert_eq!(f.attempts.failure_count("ops@example.com").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_email_counts_as_failure() {
        let f = fixture();

        let err = f.service.login("ghost@example.com", pw("x")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
        assert_eq!(f.attempts.failure_count("ghost@example.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn locked_identifier_refuses_correct_password() {
        let f = fixture();
        seed(&f.store, "ops@example.com", "right-password");

        for _ in 0..5 {
            f.service.login("ops@example.com", pw("wrong")).await.unwrap_err();
        }

        let err = f
            .service
            .login("ops@example.com", pw("right-password"))
            .await
            .unwrap_err();
        match err {
            ServiceError::Locked { retry_after_secs } => assert_eq!(retry_after_secs, 900),
            other => panic!("expected lockout, got {:?}", other),
        }

        f.clock.advance(Duration::minutes(15));
        assert!(f.service.login("ops@example.com", pw("right-password")).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_guesses_cannot_outrun_lockout() {
        let f = fixture();
        seed(&f.store, "ops@example.com", "right-password");
        let service = Arc::new(f.service);

        let handles: Vec<_> = (0..30)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .login("ops@example.com", pw(&format!("guess-{}", i)))
                        .await
                })
            })
            .collect();

        let (mut checked, mut locked) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Err(ServiceError::InvalidCredentials) => checked += 1,
                Err(ServiceError::Locked { .. }) => locked += 1,
                other => panic!("unexpected outcome: {:?}", other.map(|s| s.claims)),
            }
        }

        assert_eq!(checked, 5);
        assert_eq!(locked, 25);
        assert_eq!(f.attempts.failure_count("ops@example.com").await.unwrap(), 5);
    }
}
