//! Service router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Patient-facing routes live under `/api/ai/`, operational routes under
//! `/api/admin/`. Authentication for admin routes is expected from the
//! fronting gateway, which is also where transport auth for the rest of
//! the platform lives.

use axum::routing::{get, post};
use axum::Router;

use super::endpoints;
use super::types::ApiContext;

/// Build the service router.
pub fn service_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(endpoints::health::check))
        .route("/api/ai/answers", post(endpoints::answers::create))
        .route(
            "/api/admin/policies/reload",
            post(endpoints::admin::reload_policies),
        )
        .route("/api/admin/telemetry", get(endpoints::admin::telemetry))
        .with_state(ctx)
}
