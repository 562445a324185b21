//! The structured answer contract.
//!
//! Models are instructed to answer with a single JSON object, but model
//! text may still carry leading or trailing prose. Parsing therefore
//! extracts the first balanced JSON object from the raw text before
//! enforcing the schema: `tipo` enum, non-empty `mensagem`,
//! `metadados.data_consulta` either empty or `dd/mm/yyyy`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ModelError;

static CONSULT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").expect("Invalid consult date regex"));

/// Answer classification. Fully determines caller-visible behavior, e.g.
/// whether the client renders an emergency call-to-action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// A grounded clarification of existing orientations.
    Esclarecimento,
    /// Escalate to human medical staff now.
    EscalaEmergencia,
    /// Outside what the assistant may clarify.
    ForaEscopo,
    /// Processing failed; the safe default message applies.
    Erro,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::Esclarecimento => "esclarecimento",
            AnswerKind::EscalaEmergencia => "escala_emergencia",
            AnswerKind::ForaEscopo => "fora_escopo",
            AnswerKind::Erro => "erro",
        }
    }

    /// Escalation tipos route the patient to humans.
    pub fn is_escalation(&self) -> bool {
        matches!(self, AnswerKind::EscalaEmergencia | AnswerKind::ForaEscopo)
    }
}

/// Answer metadata surfaced to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    #[serde(default)]
    pub medico: String,
    #[serde(default)]
    pub data_consulta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub especialidade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dias_desde_consulta: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limite_dias: Option<u32>,
}

/// The canonical pipeline output. Created once per request by whichever
/// stage terminates it; never mutated afterward, never persisted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub tipo: AnswerKind,
    pub mensagem: String,
    #[serde(default)]
    pub metadados: AnswerMetadata,
}

impl StructuredAnswer {
    /// The fixed safe default returned when every model attempt fails or
    /// the deny-list suppresses the generated answer.
    pub fn safe_fallback() -> Self {
        Self {
            tipo: AnswerKind::Erro,
            mensagem: "Não consegui processar sua pergunta de forma segura. \
                       Vou te conectar com a equipe médica agora."
                .to_string(),
            metadados: AnswerMetadata::default(),
        }
    }

    /// Enforce the schema invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.mensagem.trim().is_empty() {
            return Err(ModelError::Schema("mensagem must be non-empty".into()));
        }
        let date = &self.metadados.data_consulta;
        if !date.is_empty() && !CONSULT_DATE_RE.is_match(date) {
            return Err(ModelError::Schema(format!(
                "data_consulta must be dd/mm/yyyy or empty, got {date:?}"
            )));
        }
        Ok(())
    }
}

/// Extract the first balanced JSON object from raw model text.
///
/// Brace matching skips string contents and escapes, so messages containing
/// `{` or `"` do not break extraction. Returns the object's source slice.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse raw model text into a schema-valid answer.
pub fn parse_structured_answer(raw: &str) -> Result<StructuredAnswer, ModelError> {
    if raw.trim().is_empty() {
        return Err(ModelError::EmptyCompletion);
    }
    let json = extract_first_json(raw).ok_or(ModelError::MissingJson)?;
    let answer: StructuredAnswer =
        serde_json::from_str(json).map_err(|e| ModelError::InvalidJson(e.to_string()))?;
    answer.validate()?;
    Ok(answer)
}
