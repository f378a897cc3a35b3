mod common;

use axum::http::{header, StatusCode};
use axum_extra::extract::cookie::SameSite;
use chrono::Duration;
use common::{
    body_json, location, set_cookie, TestApp, OPERATOR_EMAIL, OPERATOR_PASSWORD,
};
use service_core::config::Environment;
use std::sync::Arc;
use storefront_auth::services::{Clock, LoginAttemptTracker};

#[tokio::test]
async fn login_sets_session_cookie_and_redirects() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    let response = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let cookie = set_cookie(&response, "admin_session").expect("session cookie");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.path(), Some("/"));
    assert_ne!(cookie.secure(), Some(true));

    let expires = cookie.expires_datetime().expect("expiry").unix_timestamp();
    assert_eq!(expires, (app.clock.now() + Duration::hours(24)).timestamp());

    let dashboard = app
        .get("/dashboard", Some(("admin_session", cookie.value())))
        .await;
    assert_eq!(dashboard.status(), StatusCode::OK);
}

#[tokio::test]
async fn production_cookie_is_secure() {
    let app = TestApp::with_environment(Environment::Prod);
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    let response = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    let cookie = set_cookie(&response, "admin_session").expect("session cookie");

    assert_eq!(cookie.secure(), Some(true));
    assert!(response
        .headers()
        .contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    let wrong = app.admin_login(OPERATOR_EMAIL, "not-the-password").await;
    let unknown = app.admin_login("nobody@example.com", "not-the-password").await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&wrong, "admin_session").is_none());
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn five_failures_lock_even_the_correct_password() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    for _ in 0..5 {
        let response = app.admin_login(OPERATOR_EMAIL, "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let locked = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(locked.headers()[header::RETRY_AFTER], "900");
    assert!(set_cookie(&locked, "admin_session").is_none());

    app.clock.advance(Duration::minutes(14));
    let still_locked = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    assert_eq!(still_locked.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(still_locked.headers()[header::RETRY_AFTER], "60");

    app.clock.advance(Duration::minutes(1));
    let unlocked = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    assert_eq!(unlocked.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.attempts.failure_count(OPERATOR_EMAIL).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_guesses_are_held_to_the_attempt_limit() {
    let app = Arc::new(TestApp::new());
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                app.admin_login(OPERATOR_EMAIL, &format!("guess-{}", i))
                    .await
                    .status()
            })
        })
        .collect();

    let mut rejected = 0;
    let mut rate_limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::UNAUTHORIZED => rejected += 1,
            StatusCode::TOO_MANY_REQUESTS => rate_limited += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(rejected, 5);
    assert_eq!(rate_limited, 25);

    let correct = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    assert_eq!(correct.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn lockout_is_per_identifier_and_case_insensitive() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);
    app.seed_operator("other@example.com", OPERATOR_PASSWORD);

    for _ in 0..5 {
        app.admin_login("OPS@example.com", "wrong-password").await;
    }

    let locked = app.admin_login(OPERATOR_EMAIL, OPERATOR_PASSWORD).await;
    assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.admin_login("other@example.com", OPERATOR_PASSWORD).await;
    assert_eq!(other.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn malformed_form_is_rejected_before_any_lookup() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);

    let response = app.admin_login("not-an-email", "whatever").await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.attempts.tracked_identifiers(), 0);
}

#[tokio::test]
async fn logout_clears_cookie() {
    let app = TestApp::new();
    app.seed_operator(OPERATOR_EMAIL, OPERATOR_PASSWORD);
    let token = app.operator_session().await;

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/admin/logout")
                .header(header::COOKIE, format!("admin_session={}", token))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login");
    let cleared = set_cookie(&response, "admin_session").expect("removal cookie");
    assert_eq!(cleared.value(), "");
}
