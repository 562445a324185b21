//! Operational endpoints: policy hot-reload and telemetry snapshot.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::telemetry::TelemetrySnapshot;

#[derive(Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    /// Load errors, one per document that kept its previous snapshot.
    pub errors: Vec<String>,
}

/// `POST /api/admin/policies/reload` — re-read both policy documents.
///
/// Safe to call at any time: in-flight requests keep the snapshot they
/// started with, and a bad file keeps the last good document in force.
pub async fn reload_policies(State(ctx): State<ApiContext>) -> Json<ReloadResponse> {
    match ctx.policies.reload() {
        Ok(()) => Json(ReloadResponse {
            reloaded: true,
            errors: Vec::new(),
        }),
        Err(errors) => Json(ReloadResponse {
            reloaded: false,
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }),
    }
}

/// `GET /api/admin/telemetry` — current counter values.
pub async fn telemetry(State(ctx): State<ApiContext>) -> Json<TelemetrySnapshot> {
    Json(ctx.telemetry.snapshot())
}
