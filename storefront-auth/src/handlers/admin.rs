use axum::{extract::State, response::Redirect, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use time::OffsetDateTime;

use crate::dtos::admin::{AdminLoginRequest, OperatorSessionResponse};
use crate::middleware::access_gate::{
    CurrentOperator, ADMIN_LOGIN_PATH, ADMIN_SESSION_COOKIE, DASHBOARD_PATH,
};
use crate::models::OperatorSession;
use crate::utils::cookies::{auth_cookie, removal_cookie};
use crate::utils::{Password, ValidatedForm};
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<AdminLoginRequest>,
) -> Result<(CookieJar, Redirect), AppError> {
    let issued = state
        .operators
        .login(&form.email, Password::new(form.password))
        .await?;

    let expires = OffsetDateTime::from_unix_timestamp(issued.claims.exp)
        .map_err(|e| anyhow::anyhow!("Session expiry out of range: {}", e))?;
    let cookie = auth_cookie(
        ADMIN_SESSION_COOKIE,
        issued.token,
        expires,
        state.environment.is_production(),
    );

    Ok((jar.add(cookie), Redirect::to(DASHBOARD_PATH)))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    (
        jar.remove(removal_cookie(ADMIN_SESSION_COOKIE)),
        Redirect::to(ADMIN_LOGIN_PATH),
    )
}

pub async fn dashboard(CurrentOperator(session): CurrentOperator) -> Json<OperatorSessionResponse> {
    Json(OperatorSessionResponse::from(&session))
}

/// Raw session claims for API clients.
pub async fn session_info(CurrentOperator(session): CurrentOperator) -> Json<OperatorSession> {
    Json(session)
}
