//! API error types with structured JSON responses.
//!
//! Even transport-level failures answer in the `StructuredAnswer` shape,
//! so clients have exactly one body format to parse.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::model::schema::{AnswerKind, AnswerMetadata, StructuredAnswer};

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Question is required")]
    MissingQuestion,
    #[error("Patient identifier is required")]
    MissingPatient,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mensagem = match &self {
            ApiError::MissingQuestion => "Pergunta é obrigatória",
            ApiError::MissingPatient => "Identificação do paciente é obrigatória",
        };
        let body = StructuredAnswer {
            tipo: AnswerKind::Erro,
            mensagem: mensagem.to_string(),
            metadados: AnswerMetadata::default(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
