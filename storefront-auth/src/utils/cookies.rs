//! Cookie attributes shared by the operator session and the customer token.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// HttpOnly, SameSite=Strict, Path=/ cookie; `Secure` outside development.
pub fn auth_cookie(
    name: &'static str,
    value: String,
    expires: OffsetDateTime,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .expires(expires)
        .build()
}

/// Removal cookie matching the path the auth cookie was set on.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}
