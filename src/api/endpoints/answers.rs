//! `POST /api/ai/answers` — the answering pipeline.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::model::schema::StructuredAnswer;
use crate::pipeline::PipelineOutcome;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswersRequest {
    pub question: String,
    pub patient_id: String,
}

/// 429 body: the structured answer plus machine-readable retry guidance.
#[derive(Serialize)]
struct RateLimitedBody {
    #[serde(flatten)]
    answer: StructuredAnswer,
    #[serde(rename = "retryAfterSec")]
    retry_after_sec: u64,
}

/// Answer a patient question about their last consultation.
///
/// Always responds with a `StructuredAnswer` body: 200 for every pipeline
/// outcome, 429 with a `Retry-After` header on admission rejection.
pub async fn create(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(req): Json<AnswersRequest>,
) -> Result<Response, ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::MissingQuestion);
    }
    if req.patient_id.trim().is_empty() {
        return Err(ApiError::MissingPatient);
    }

    let ip = client_ip(&headers);
    let outcome = ctx
        .pipeline
        .answer(req.question.trim(), req.patient_id.trim(), &ip)
        .await;

    Ok(match outcome {
        PipelineOutcome::Answer(answer) => (StatusCode::OK, Json(answer)).into_response(),
        PipelineOutcome::RateLimited {
            retry_after_secs,
            answer,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", retry_after_secs.to_string())],
            Json(RateLimitedBody {
                answer,
                retry_after_sec: retry_after_secs,
            }),
        )
            .into_response(),
    })
}

/// Client IP for the rate limiter: first `X-Forwarded-For` entry when a
/// proxy fronted the request, otherwise unknown (one shared bucket).
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
