//! Shared setup for storefront-auth integration tests.
//!
//! Builds the real router over in-memory credentials, a mock storefront and a
//! manual clock, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use axum_extra::extract::cookie::Cookie;
use chrono::Duration;
use serde_json::Value;
use service_core::config::Environment;
use std::sync::Arc;
use storefront_auth::{
    models::OperatorAccount,
    services::{
        ActivationLedger, AdminSessionManager, InMemoryCredentialStore,
        InMemoryLoginAttemptTracker, LockoutPolicy, ManualClock, MockStorefront,
    },
    startup::build_router,
    utils::{hash_password, Password},
    AppComponents, AppState,
};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const TEST_SESSION_SECRET: &[u8] = b"integration-test-session-secret-0123456789";
pub const OPERATOR_EMAIL: &str = "ops@example.com";
pub const OPERATOR_PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub attempts: Arc<InMemoryLoginAttemptTracker>,
    pub provider: Arc<MockStorefront>,
    pub sessions: AdminSessionManager,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_environment(Environment::Dev)
    }

    pub fn with_environment(environment: Environment) -> Self {
        let clock = Arc::new(ManualClock::default());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let attempts = Arc::new(InMemoryLoginAttemptTracker::new(
            LockoutPolicy::default(),
            clock.clone(),
        ));
        let sessions = AdminSessionManager::from_secret(
            TEST_SESSION_SECRET,
            Duration::hours(24),
            credentials.clone(),
            clock.clone(),
        );
        let provider = Arc::new(MockStorefront::new());
        let activation_ledger =
            Arc::new(ActivationLedger::new(Duration::hours(720), clock.clone()));

        let state = AppState::new(AppComponents {
            service_name: "storefront-auth-test".to_string(),
            environment,
            clock: clock.clone(),
            credentials: credentials.clone(),
            login_attempts: attempts.clone(),
            sessions: sessions.clone(),
            provider: provider.clone(),
            activation_ledger,
        });

        Self {
            router: build_router(state),
            clock,
            credentials,
            attempts,
            provider,
            sessions,
        }
    }

    pub fn seed_operator(&self, email: &str, password: &str) -> Uuid {
        let hash = hash_password(&Password::new(password.to_string())).expect("hash");
        self.credentials
            .insert(OperatorAccount::new(email, hash.into_string()))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn admin_login(&self, email: &str, password: &str) -> Response<Body> {
        let body = format!("email={}&password={}", email, password);
        self.send(
            Request::builder()
                .method("POST")
                .uri("/admin/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Logs the seeded operator in and returns the session cookie value.
    pub async fn operator_session(&self) -> String {
        let response = self.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        set_cookie(&response, "admin_session")
            .expect("session cookie")
            .value()
            .to_string()
    }

    pub async fn get(&self, uri: &str, cookie: Option<(&str, &str)>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some((name, value)) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", name, value));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: Value,
        cookie: Option<(&str, &str)>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some((name, value)) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", name, value));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

/// The `Set-Cookie` entry for `name`, if the response carries one.
pub fn set_cookie(response: &Response<Body>, name: &str) -> Option<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value.to_string()).ok())
        .find(|cookie| cookie.name() == name)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub fn assert_security_headers(response: &Response<Body>) {
    let headers = response.headers();
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert!(headers.contains_key(header::REFERRER_POLICY));
    assert!(headers.contains_key("permissions-policy"));
}
