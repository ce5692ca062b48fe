use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use warehousex_auth::Role;
use warehousex_core::UserId;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Attach a [`PrincipalContext`] built from the identity headers.
///
/// Credential checks happen upstream; this layer only refuses requests that
/// arrive without a usable identity.
pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = extract_principal(req.headers())
        .map_err(|msg| json_error(StatusCode::UNAUTHORIZED, "unauthenticated", msg))?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

fn extract_principal(headers: &HeaderMap) -> Result<PrincipalContext, &'static str> {
    let user_id = header(headers, USER_ID_HEADER).ok_or("missing x-user-id header")?;
    let user_id: UserId = user_id.parse().map_err(|_| "x-user-id must be a uuid")?;

    let role = header(headers, USER_ROLE_HEADER).ok_or("missing x-user-role header")?;

    Ok(PrincipalContext::new(user_id, Role::new(role.to_ascii_lowercase())))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
