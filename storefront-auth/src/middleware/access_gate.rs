//! Single choke point in front of every route.
//!
//! Protected paths need a valid operator session; pages redirect to the login
//! page and API calls get 401. Security headers go on every response that
//! leaves this layer, including rejections.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::models::OperatorSession;
use crate::services::ServiceError;
use crate::utils::cookies::removal_cookie;
use crate::AppState;

pub const ADMIN_SESSION_COOKIE: &str = "admin_session";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ADMIN_API_PREFIX: &str = "/api/admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    ProtectedPage,
    ProtectedApi,
}

pub fn classify(path: &str) -> RouteClass {
    if is_under(path, DASHBOARD_PATH) {
        RouteClass::ProtectedPage
    } else if is_under(path, ADMIN_API_PREFIX) {
        RouteClass::ProtectedApi
    } else {
        RouteClass::Public
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Session cookie first, then a Bearer header. Empty values are skipped.
fn session_tokens(jar: &CookieJar, req: &Request) -> Vec<String> {
    let cookie = jar
        .get(ADMIN_SESSION_COOKIE)
        .map(|cookie| cookie.value().trim().to_string());
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    cookie
        .into_iter()
        .chain(bearer)
        .filter(|token| !token.is_empty())
        .collect()
}

/// A stale cookie does not shadow a valid Bearer token.
async fn authenticate(
    state: &AppState,
    candidates: Vec<String>,
) -> Result<OperatorSession, ServiceError> {
    for token in candidates {
        match state.sessions.validate(&token).await {
            Err(ServiceError::SessionRejected) => continue,
            outcome => return outcome,
        }
    }
    Err(ServiceError::SessionRejected)
}

fn reject(class: RouteClass, jar: CookieJar) -> Response {
    let jar = jar.remove(removal_cookie(ADMIN_SESSION_COOKIE));
    match class {
        RouteClass::ProtectedPage => (jar, Redirect::to(ADMIN_LOGIN_PATH)).into_response(),
        _ => (jar, AppError::Unauthenticated).into_response(),
    }
}

pub async fn access_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let class = classify(req.uri().path());

    let mut response = match class {
        RouteClass::Public => next.run(req).await,
        protected => match authenticate(&state, session_tokens(&jar, &req)).await {
            Ok(session) => {
                req.extensions_mut().insert(session);
                next.run(req).await
            }
            Err(ServiceError::SessionRejected) => reject(protected, jar),
            Err(e) => AppError::from(e).into_response(),
        },
    };

    state.security_headers.apply(response.headers_mut());
    response
}

/// The session the gate validated for this request.
pub struct CurrentOperator(pub OperatorSession);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentOperator
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorSession>()
            .cloned()
            .map(CurrentOperator)
            .ok_or(AppError::Unauthenticated)
    }
}
