use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::models::OperatorSession;
use crate::services::clock::Clock;
use crate::services::credentials::CredentialStore;
use crate::services::error::ServiceError;

/// A freshly signed session token and the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: OperatorSession,
}

impl IssuedSession {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.claims.exp, 0)
    }
}

/// Why a token was refused. Only ever logged; callers see a single rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Undecodable,
    Expired,
    SubjectGone,
}

/// Signs and checks operator session tokens (HS256).
///
/// Expiry is judged against the injected clock, not the token library, and
/// every validation re-reads the operator record so a removed operator loses
/// access on their next request.
#[derive(Clone)]
pub struct AdminSessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl AdminSessionManager {
    pub fn new(
        settings: &SessionSettings,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_secret(
            settings.secret.expose_secret().as_bytes(),
            Duration::hours(settings.ttl_hours),
            store,
            clock,
        )
    }

    pub fn from_secret(
        secret: &[u8],
        ttl: Duration,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
            store,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: Uuid) -> Result<IssuedSession, ServiceError> {
        let now = self.clock.now();
        let claims = OperatorSession {
            sub: subject,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;

        Ok(IssuedSession { token, claims })
    }

    /// Signature, expiry and subject existence. Every failure is `SessionRejected`;
    /// only a store fault surfaces as something else.
    pub async fn validate(&self, token: &str) -> Result<OperatorSession, ServiceError> {
        let claims = match self.decode_claims(token) {
            Ok(claims) => claims,
            Err(reason) => return Err(reject(reason)),
        };

        match self.store.find_by_id(claims.sub).await? {
            Some(_) => Ok(claims),
            None => Err(reject(Rejection::SubjectGone)),
        }
    }

    fn decode_claims(&self, token: &str) -> Result<OperatorSession, Rejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<OperatorSession>(token, &self.decoding_key, &validation)
            .map_err(|_| Rejection::Undecodable)?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(Rejection::Expired);
        }

        Ok(claims)
    }
}

fn reject(reason: Rejection) -> ServiceError {
    tracing::debug!(reason = ?reason, "Operator session rejected");
    ServiceError::SessionRejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperatorAccount;
    use crate::services::clock::ManualClock;
    use crate::services::credentials::InMemoryCredentialStore;

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret";

    fn manager() -> (Arc<ManualClock>, Arc<InMemoryCredentialStore>, AdminSessionManager) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = AdminSessionManager::from_secret(
            SECRET,
            Duration::hours(24),
            store.clone(),
            clock.clone(),
        );
        (clock, store, manager)
    }

    fn assert_rejected(result: Result<OperatorSession, ServiceError>) {
        assert!(matches!(result, Err(ServiceError::SessionRejected)));
    }

    #[tokio::test]
    async fn issued_token_validates() {
        let (clock, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));

        let issued = manager.issue(id).unwrap();
        assert_eq!(issued.claims.exp - issued.claims.iat, 24 * 3600);
        assert_eq!(issued.claims.iat, clock.now().timestamp());

        let session = manager.validate(&issued.token).await.unwrap();
        assert_eq!(session, issued.claims);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (clock, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));
        let issued = manager.issue(id).unwrap();

        clock.advance(Duration::hours(24));
        assert_rejected(manager.validate(&issued.token).await);
    }

    #[tokio::test]
    async fn removed_operator_is_rejected() {
        let (_, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));
        let issued = manager.issue(id).unwrap();

        store.remove(id);
        assert_rejected(manager.validate(&issued.token).await);
    }

    #[tokio::test]
    async fn foreign_signature_is_rejected() {
        let (clock, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));
        let other =
            AdminSessionManager::from_secret(b"another-secret", Duration::hours(24), store, clock);

        let forged = other.issue(id).unwrap();
        assert_rejected(manager.validate(&forged.token).await);
    }

    #[tokio::test]
    async fn tampered_and_garbage_tokens_are_rejected() {
        let (_, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));
        let mut token = manager.issue(id).unwrap().token;
        token.push('x');

        assert_rejected(manager.validate(&token).await);
        assert_rejected(manager.validate("not-a-token").await);
        assert_rejected(manager.validate("").await);
    }

    #[tokio::test]
    async fn other_algorithm_is_rejected() {
        let (_, store, manager) = manager();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));
        let claims = manager.issue(id).unwrap().claims;

        let header = jsonwebtoken::Header::new(Algorithm::HS512);
        let token = encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        assert_rejected(manager.validate(&token).await);
    }
}
