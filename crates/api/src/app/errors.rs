use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use warehousex_infra::ApprovalError;

pub fn approval_error_to_response(err: ApprovalError) -> axum::response::Response {
    let status = match &err {
        ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
        ApprovalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ApprovalError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ApprovalError::InvalidTransition(_) => StatusCode::CONFLICT,
        ApprovalError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ApprovalError::Conflict(_) => StatusCode::CONFLICT,
        ApprovalError::Internal(msg) => {
            tracing::error!(error = %msg, "approval failed");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                "internal error",
            );
        }
    };

    json_error(status, err.code(), err.to_string())
}

/// Body or query string that failed to deserialize.
pub fn invalid_input(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_input", message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
