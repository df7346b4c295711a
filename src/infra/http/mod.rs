//! HTTP front door: request intake, auth, and task polling.

pub mod error;
mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::queue::RenderQueue;
use crate::application::registry::TemplateRegistry;

/// Shared state for the public router.
#[derive(Clone)]
pub struct HttpState {
    pub queue: RenderQueue,
    pub registry: Arc<TemplateRegistry>,
    pub api_key: Arc<str>,
}

/// Build the public router. Generation and polling sit behind the API key;
/// liveness and the template listing do not.
pub fn build_router(state: HttpState) -> Router {
    let auth_state = state.clone();

    let protected = Router::new()
        .route("/generate/{template_type}", post(handlers::generate))
        .route("/tasks/{id}", get(handlers::task_status))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::require_api_key,
        ));

    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/templates", get(handlers::list_templates))
        .merge(protected)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
