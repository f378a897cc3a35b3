use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::dtos::customer::{
    ActivationRequest, CustomerErrorsResponse, CustomerLoginRequest, CustomerSessionResponse,
    CustomerSignupRequest, SignupPendingResponse,
};
use crate::models::{ActivationArtifact, CustomerUserError};
use crate::services::{ActivationOutcome, ProviderOutcome, SignupOutcome};
use crate::utils::ValidatedJson;
use crate::AppState;

fn user_errors(status: StatusCode, errors: Vec<CustomerUserError>) -> Response {
    (status, Json(CustomerErrorsResponse { errors })).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<CustomerLoginRequest>,
) -> Result<Response, AppError> {
    match state.customers.login(req.email.trim(), &req.password).await? {
        ProviderOutcome::Accepted(token) => {
            let jar = state.customers.persist(jar, &token)?;
            Ok((jar, Json(CustomerSessionResponse::from(&token))).into_response())
        }
        ProviderOutcome::Rejected(errors) => Ok(user_errors(StatusCode::UNAUTHORIZED, errors)),
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<CustomerSignupRequest>,
) -> Result<Response, AppError> {
    match state.customers.signup(req.into()).await? {
        SignupOutcome::Authenticated(token) => {
            let jar = state.customers.persist(jar, &token)?;
            Ok((
                StatusCode::CREATED,
                jar,
                Json(CustomerSessionResponse::from(&token)),
            )
                .into_response())
        }
        SignupOutcome::Rejected(errors) => {
            Ok(user_errors(StatusCode::UNPROCESSABLE_ENTITY, errors))
        }
        SignupOutcome::CreatedWithoutSession(errors) => Ok((
            StatusCode::ACCEPTED,
            Json(SignupPendingResponse {
                message: "Account created. Sign in to continue.".to_string(),
                errors,
            }),
        )
            .into_response()),
    }
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    (state.customers.logout(jar), StatusCode::NO_CONTENT)
}

pub async fn activate(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ActivationRequest>,
) -> Result<Response, AppError> {
    let artifact = ActivationArtifact::from_parts(
        req.activation_url,
        req.identifier,
        req.token,
        req.new_password,
    )
    .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    match state.activation.consume(jar, artifact).await? {
        (jar, ActivationOutcome::Activated(token)) => {
            Ok((jar, Json(CustomerSessionResponse::from(&token))).into_response())
        }
        (_, ActivationOutcome::Rejected(errors)) => {
            Ok(user_errors(StatusCode::UNPROCESSABLE_ENTITY, errors))
        }
    }
}

/// Customer profile for the token in the cookie. A stale token is cleared.
pub async fn account(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    match state.customers.customer_profile(&jar).await? {
        Some(profile) => Ok(Json(profile).into_response()),
        None => Ok((state.customers.logout(jar), AppError::Unauthenticated).into_response()),
    }
}
