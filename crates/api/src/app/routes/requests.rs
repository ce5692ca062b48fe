use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use warehousex_auth::Role;
use warehousex_core::RequestId;
use warehousex_infra::{ApprovalError, ListRequests};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests))
        .route("/inbound", post(create_inbound))
        .route("/outbound", post(create_outbound))
        .route("/:id", get(get_request))
        .route("/:id/approve", put(approve))
        .route("/:id/reject", put(reject))
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ListRequests>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(v) => v,
        Err(rejection) => return errors::invalid_input(rejection.body_text()),
    };

    match services.list_requests(query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

pub async fn create_inbound(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::SubmitRequestBody>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = require_submitter(&services, &principal) {
        return resp;
    }
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => return errors::invalid_input(rejection.body_text()),
    };

    match services
        .create_inbound_request(body.into(), principal.user_id())
        .await
    {
        Ok(details) => (StatusCode::CREATED, Json(details)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

pub async fn create_outbound(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::SubmitRequestBody>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = require_submitter(&services, &principal) {
        return resp;
    }
    let Json(body) = match body {
        Ok(v) => v,
        Err(rejection) => return errors::invalid_input(rejection.body_text()),
    };

    match services
        .create_outbound_request(body.into(), principal.user_id())
        .await
    {
        Ok(details) => (StatusCode::CREATED, Json(details)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.get_request(request_id).await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

pub async fn approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_reviewer(&services, &principal) {
        return resp;
    }
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .approve_request(request_id, &principal.reviewer())
        .await
    {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_reviewer(&services, &principal) {
        return resp;
    }
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.reject_request(request_id, &principal.reviewer()).await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => errors::approval_error_to_response(e),
    }
}

/// Route-level guard: staff and above may submit. Auditors are read-only.
fn require_submitter(
    services: &AppServices,
    principal: &PrincipalContext,
) -> Result<(), axum::response::Response> {
    require_role(services, principal, &Role::STAFF, "submit")
}

/// Route-level guard: supervisors and above only.
fn require_reviewer(
    services: &AppServices,
    principal: &PrincipalContext,
) -> Result<(), axum::response::Response> {
    require_role(services, principal, &Role::SUPERVISOR, "review")
}

fn require_role(
    services: &AppServices,
    principal: &PrincipalContext,
    min: &Role,
    action: &str,
) -> Result<(), axum::response::Response> {
    if services.policy().has_at_least(principal.role(), min) {
        return Ok(());
    }
    Err(errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("role '{}' may not {action} requests", principal.role()),
    ))
}

fn parse_request_id(raw: &str) -> Result<RequestId, axum::response::Response> {
    raw.parse::<RequestId>()
        .map_err(|e| errors::approval_error_to_response(ApprovalError::from(e)))
}
