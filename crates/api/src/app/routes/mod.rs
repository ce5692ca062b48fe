use axum::Router;

pub mod requests;
pub mod system;

/// Router for all endpoints that require caller identity.
pub fn router() -> Router {
    Router::new().nest("/requests", requests::router())
}
