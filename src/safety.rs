//! Question and response safety gates.
//!
//! Incoming questions are screened against the safety policy's keyword
//! groups in strict priority order; generated answers are screened against
//! the deny-list as the last line of defense against a model inventing new
//! clinical instructions.

use std::sync::Arc;

use serde::Serialize;

use crate::normalize::find_keyword;
use crate::policy::{PolicyStore, SafetyPolicy};

/// Classification of an incoming question, first match wins.
///
/// The variant order IS the clinical priority: a question matching both an
/// emergency term and an out-of-scope term must classify as emergency,
/// because a false negative on safety costs more than one on scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionScreen {
    /// Signs of a medical emergency. Escalate, never answer.
    Emergency { keyword: String },
    /// A new or worsening symptom. Escalate to human staff.
    NewSymptom { keyword: String },
    /// A request the assistant must not handle (new drugs, dosage changes).
    OutOfScope { keyword: String },
    /// No keyword group matched; the question may proceed to the model.
    Safe,
}

impl QuestionScreen {
    pub fn is_safe(&self) -> bool {
        matches!(self, QuestionScreen::Safe)
    }

    /// Stable label for telemetry and audit records.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionScreen::Emergency { .. } => "emergency",
            QuestionScreen::NewSymptom { .. } => "new_symptom",
            QuestionScreen::OutOfScope { .. } => "out_of_scope",
            QuestionScreen::Safe => "none",
        }
    }

    /// Human-readable reason, mirroring what audit investigators expect.
    pub fn reason(&self) -> Option<String> {
        match self {
            QuestionScreen::Emergency { keyword } => Some(format!(
                "Palavra-chave de emergência detectada: \"{keyword}\""
            )),
            QuestionScreen::NewSymptom { keyword } => {
                Some(format!("Possível sintoma novo detectado: \"{keyword}\""))
            }
            QuestionScreen::OutOfScope { keyword } => {
                Some(format!("Pergunta fora do escopo: \"{keyword}\""))
            }
            QuestionScreen::Safe => None,
        }
    }
}

/// A deny-list hit in a generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyListHit {
    pub phrase: String,
}

/// Screens questions and generated answers against the safety policy.
///
/// Stateless apart from the shared policy store; each call reads the
/// current policy snapshot, so hot reloads apply to the next question
/// without restarting in-flight requests.
pub struct SafetyValidator {
    policies: Arc<PolicyStore>,
}

impl SafetyValidator {
    pub fn new(policies: Arc<PolicyStore>) -> Self {
        Self { policies }
    }

    /// Classify a question, in strict priority order.
    pub fn screen_question(&self, question: &str) -> QuestionScreen {
        let policy = self.policies.safety();
        Self::screen_with_policy(&policy, question)
    }

    /// Classification against an explicit policy snapshot. The pipeline
    /// uses this to screen and later re-screen (emergency override) against
    /// the same snapshot within one request.
    pub fn screen_with_policy(policy: &SafetyPolicy, question: &str) -> QuestionScreen {
        if let Some(keyword) = find_keyword(question, &policy.emergency_keywords) {
            return QuestionScreen::Emergency {
                keyword: keyword.to_string(),
            };
        }
        if let Some(keyword) = find_keyword(question, &policy.new_symptom_keywords) {
            return QuestionScreen::NewSymptom {
                keyword: keyword.to_string(),
            };
        }
        if let Some(keyword) = find_keyword(question, &policy.out_of_scope_keywords) {
            return QuestionScreen::OutOfScope {
                keyword: keyword.to_string(),
            };
        }
        QuestionScreen::Safe
    }

    /// Deny-list gate for generated answers.
    ///
    /// Applied after schema validation, regardless of the answer's declared
    /// tipo. A hit means the model overstepped its grounding and the whole
    /// answer must be replaced with the safe default.
    pub fn check_response(&self, response: &str) -> Result<(), DenyListHit> {
        let policy = self.policies.safety();
        match find_keyword(response, &policy.deny_phrases) {
            Some(phrase) => Err(DenyListHit {
                phrase: phrase.to_string(),
            }),
            None => Ok(()),
        }
    }
}
