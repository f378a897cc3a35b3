//! Operator credential lookup.
//!
//! The service only reads operator records; provisioning happens elsewhere.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::models::operator::normalize_identifier;
use crate::models::OperatorAccount;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `email` is matched after normalization.
    async fn find_by_email(&self, email: &str) -> Result<Option<OperatorAccount>, anyhow::Error>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OperatorAccount>, anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

const OPERATOR_COLUMNS: &str = "id, email, password_hash, created_at, updated_at";

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(settings.url.expose_secret())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;

        tracing::info!("Successfully connected to PostgreSQL");

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), anyhow::Error> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<OperatorAccount>, anyhow::Error> {
        let query = format!(
            "SELECT {} FROM operators WHERE lower(email) = $1",
            OPERATOR_COLUMNS
        );
        let account = sqlx::query_as::<_, OperatorAccount>(&query)
            .bind(normalize_identifier(email))
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OperatorAccount>, anyhow::Error> {
        let query = format!("SELECT {} FROM operators WHERE id = $1", OPERATOR_COLUMNS);
        let account = sqlx::query_as::<_, OperatorAccount>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local store for tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    accounts: DashMap<Uuid, OperatorAccount>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: OperatorAccount) -> Uuid {
        let id = account.id;
        self.accounts.insert(id, account);
        id
    }

    pub fn remove(&self, id: Uuid) -> Option<OperatorAccount> {
        self.accounts.remove(&id).map(|(_, account)| account)
    }

    pub fn set_password_hash(&self, id: Uuid, password_hash: String) -> bool {
        match self.accounts.get_mut(&id) {
            Some(mut account) => {
                account.password_hash = password_hash;
                account.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<OperatorAccount>, anyhow::Error> {
        let email = normalize_identifier(email);
        Ok(self
            .accounts
            .iter()
            .find(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OperatorAccount>, anyhow::Error> {
        Ok(self.accounts.get(&id).map(|account| account.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let store = InMemoryCredentialStore::new();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));

        let found = store.find_by_email("  OPS@Example.com").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(id));
    }

    #[tokio::test]
    async fn removed_account_is_gone() {
        let store = InMemoryCredentialStore::new();
        let id = store.insert(OperatorAccount::new("ops@example.com", "hash"));

        assert!(store.remove(id).is_some());
        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert!(store.find_by_email("ops@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_change_updates_record() {
        let store = InMemoryCredentialStore::new();
        let id = store.insert(OperatorAccount::new("ops@example.com", "old"));

        assert!(store.set_password_hash(id, "new".to_string()));
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().password_hash, "new");
        assert!(!store.set_password_hash(Uuid::new_v4(), "x".to_string()));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn connects_to_postgres() {
        let settings = DatabaseSettings {
            url: secrecy::Secret::new("postgres://localhost/storefront_auth_test".to_string()),
            max_connections: 5,
        };
        assert!(PgCredentialStore::connect(&settings).await.is_ok());
    }
}
