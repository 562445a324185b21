use std::sync::Arc;

use crate::policy::PolicyStore;
use crate::safety::{QuestionScreen, SafetyValidator};
use crate::telemetry::Telemetry;

use super::client::ChatModel;
use super::prompt::{build_grounded_context, build_system_prompt, build_user_message};
use super::retry::{run_with_retry, BackoffPolicy, RetryOutcome};
use super::schema::{parse_structured_answer, AnswerKind, AnswerMetadata, StructuredAnswer};

/// Invoker configuration: which models, how patient to be with them.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub primary_model: String,
    /// Tried after the primary exhausts its retries. Ignored when equal to
    /// the primary, since retrying the same model twice over buys nothing.
    pub fallback_model: Option<String>,
    pub backoff: BackoffPolicy,
}

/// Everything the model needs to answer one question.
#[derive(Debug, Clone)]
pub struct AnswerContext<'a> {
    pub question: &'a str,
    pub orientations_text: &'a str,
    pub doctor_name: &'a str,
    pub consult_date: &'a str,
    pub specialty: Option<&'a str>,
}

/// The §"ask the model" state machine:
///
/// ```text
/// START → guardrail (empty orientations → fora_escopo)
///       → primary (retry w/ backoff) → fallback (retry w/ backoff)
///       → schema-valid answer | safe default
///       → deny-list gate → emergency override → DONE
/// ```
///
/// Infallible by contract: every failure mode folds into a safe,
/// schema-valid `StructuredAnswer`. Nothing here returns `Err` to the
/// pipeline.
pub struct ModelInvoker {
    chat: Box<dyn ChatModel>,
    policies: Arc<PolicyStore>,
    telemetry: Arc<Telemetry>,
    config: InvokerConfig,
}

impl ModelInvoker {
    pub fn new(
        chat: Box<dyn ChatModel>,
        policies: Arc<PolicyStore>,
        telemetry: Arc<Telemetry>,
        config: InvokerConfig,
    ) -> Self {
        Self {
            chat,
            policies,
            telemetry,
            config,
        }
    }

    /// Produce a validated structured answer for a safe question.
    pub async fn ask(&self, ctx: AnswerContext<'_>) -> StructuredAnswer {
        // Guardrail: nothing grounded to answer from. The model is never
        // called with an empty context.
        if ctx.orientations_text.trim().is_empty() {
            return StructuredAnswer {
                tipo: AnswerKind::ForaEscopo,
                mensagem: "Não localizei orientações registradas na sua última consulta. \
                           Posso encaminhar para o médico?"
                    .to_string(),
                metadados: self.base_metadata(&ctx),
            };
        }

        let grounded = build_grounded_context(
            ctx.orientations_text,
            ctx.doctor_name,
            ctx.consult_date,
            ctx.specialty,
        );
        let system = build_system_prompt(&grounded);
        let user = build_user_message(ctx.question);

        let answer = match self.attempt_model(&self.config.primary_model, &system, &user).await {
            Some(answer) => Some(answer),
            None => match self.fallback_model() {
                Some(fallback) => {
                    tracing::warn!(model = %fallback, "Primary model exhausted, trying fallback");
                    let answer = self.attempt_model(fallback, &system, &user).await;
                    if answer.is_some() {
                        self.telemetry.ai_fallback_used();
                    }
                    answer
                }
                None => None,
            },
        };

        let answer = match answer {
            Some(answer) => answer,
            None => {
                tracing::error!("All model attempts failed, returning safe default");
                StructuredAnswer::safe_fallback()
            }
        };

        let answer = self.apply_deny_gate(answer);
        self.apply_emergency_override(ctx.question, answer)
    }

    /// Retry one model until it yields a schema-valid answer or the policy
    /// is exhausted.
    async fn attempt_model(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Option<StructuredAnswer> {
        let outcome = run_with_retry(self.config.backoff, |attempt| async move {
            self.telemetry.ai_attempt();
            let raw = self.chat.generate(model, system, user).await.map_err(|e| {
                tracing::warn!(model, attempt, error = %e, "Model call failed");
                e
            })?;
            parse_structured_answer(&raw).map_err(|e| {
                self.telemetry.schema_invalid();
                tracing::warn!(model, attempt, error = %e, "Model response rejected");
                e
            })
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                tracing::debug!(model, attempts, tipo = value.tipo.as_str(), "Model answered");
                Some(value)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                tracing::warn!(model, attempts, error = %last_error, "Model exhausted");
                None
            }
        }
    }

    /// Response-side deny-list: a hit is equivalent to total model failure.
    fn apply_deny_gate(&self, answer: StructuredAnswer) -> StructuredAnswer {
        let validator = SafetyValidator::new(Arc::clone(&self.policies));
        match validator.check_response(&answer.mensagem) {
            Ok(()) => answer,
            Err(hit) => {
                self.telemetry.deny_list_hit();
                tracing::warn!(
                    phrase = %hit.phrase,
                    "Generated answer suppressed by deny-list"
                );
                StructuredAnswer::safe_fallback()
            }
        }
    }

    /// The keyword gate outranks model judgment: if the question itself
    /// carries emergency keywords but the model answered with any other
    /// tipo, force the escalation.
    fn apply_emergency_override(
        &self,
        question: &str,
        mut answer: StructuredAnswer,
    ) -> StructuredAnswer {
        let screen = SafetyValidator::screen_with_policy(&self.policies.safety(), question);
        if let QuestionScreen::Emergency { keyword } = screen {
            if answer.tipo != AnswerKind::EscalaEmergencia {
                tracing::warn!(
                    keyword = %keyword,
                    tipo = answer.tipo.as_str(),
                    "Emergency keyword in question, overriding model tipo"
                );
                answer.tipo = AnswerKind::EscalaEmergencia;
                answer.mensagem = format!(
                    "ATENÇÃO: Detectei sinais de possível emergência. {}",
                    answer.mensagem
                );
            }
        }
        answer
    }

    fn fallback_model(&self) -> Option<&str> {
        self.config
            .fallback_model
            .as_deref()
            .filter(|fallback| *fallback != self.config.primary_model)
    }

    fn base_metadata(&self, ctx: &AnswerContext<'_>) -> AnswerMetadata {
        AnswerMetadata {
            medico: ctx.doctor_name.to_string(),
            data_consulta: ctx.consult_date.to_string(),
            especialidade: ctx.specialty.map(str::to_string),
            ..AnswerMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::model::client::MockChatModel;
    use crate::model::ModelError;
    use crate::policy::{ConsultationAgePolicy, SafetyPolicy};

    fn policies() -> Arc<PolicyStore> {
        Arc::new(PolicyStore::from_documents(
            SafetyPolicy::builtin_fallback(),
            ConsultationAgePolicy::builtin_fallback(),
        ))
    }

    fn invoker_with(mock: MockChatModel, fallback: Option<&str>) -> (ModelInvoker, Arc<Telemetry>) {
        let telemetry = Arc::new(Telemetry::new());
        let invoker = ModelInvoker::new(
            Box::new(mock),
            policies(),
            Arc::clone(&telemetry),
            InvokerConfig {
                primary_model: "modelo-principal".into(),
                fallback_model: fallback.map(str::to_string),
                backoff: BackoffPolicy::new(1, Duration::from_millis(1)),
            },
        );
        (invoker, telemetry)
    }

    fn ctx<'a>(question: &'a str, orientations: &'a str) -> AnswerContext<'a> {
        AnswerContext {
            question,
            orientations_text: orientations,
            doctor_name: "Dr. Silva",
            consult_date: "02/03/2026",
            specialty: Some("Cardiologia"),
        }
    }

    const VALID_JSON: &str = r#"{"tipo":"esclarecimento","mensagem":"Com base nas orientações do Dr. Silva em 02/03/2026, o uso é pela manhã.","metadados":{"medico":"Dr. Silva","data_consulta":"02/03/2026"}}"#;

    #[tokio::test]
    async fn empty_orientations_short_circuits_without_model_call() {
        let mock = MockChatModel::always(VALID_JSON);
        let (invoker, telemetry) = invoker_with(mock, None);
        let answer = invoker.ask(ctx("qual o horário?", "   ")).await;
        assert_eq!(answer.tipo, AnswerKind::ForaEscopo);
        assert!(answer.mensagem.contains("Não localizei orientações"));
        assert_eq!(telemetry.snapshot().ai_attempts, 0);
    }

    #[tokio::test]
    async fn valid_primary_answer_passes_through() {
        let mock = MockChatModel::always(VALID_JSON);
        let (invoker, telemetry) = invoker_with(mock, Some("modelo-reserva"));
        let answer = invoker.ask(ctx("qual o horário?", "- medicação: uso pela manhã")).await;
        assert_eq!(answer.tipo, AnswerKind::Esclarecimento);
        let snap = telemetry.snapshot();
        assert_eq!(snap.ai_attempts, 1);
        assert_eq!(snap.ai_fallback_used, 0);
    }

    #[tokio::test]
    async fn primary_timeouts_fall_back_to_secondary() {
        let mock = MockChatModel::new(vec![
            Err(ModelError::Timeout(10)),
            Err(ModelError::Timeout(10)),
            Ok(VALID_JSON.into()),
        ]);
        let (invoker, telemetry) = invoker_with(mock, Some("modelo-reserva"));
        let answer = invoker.ask(ctx("qual o horário?", "- geral: repouso")).await;
        assert_eq!(answer.tipo, AnswerKind::Esclarecimento);
        let snap = telemetry.snapshot();
        // Two primary attempts + one fallback attempt.
        assert_eq!(snap.ai_attempts, 3);
        assert_eq!(snap.ai_fallback_used, 1);
    }

    #[tokio::test]
    async fn fallback_used_counts_once_per_request() {
        let mock = MockChatModel::new(vec![
            Err(ModelError::Connection("down".into())),
            Err(ModelError::Connection("down".into())),
            Err(ModelError::Timeout(10)),
            Ok(VALID_JSON.into()),
        ]);
        let (invoker, telemetry) = invoker_with(mock, Some("modelo-reserva"));
        let _ = invoker.ask(ctx("pergunta", "- geral: repouso")).await;
        assert_eq!(telemetry.snapshot().ai_fallback_used, 1);
    }

    #[tokio::test]
    async fn all_attempts_failing_yields_safe_default() {
        let mock = MockChatModel::new(vec![
            Ok("sem json nenhum".into()),
            Ok("ainda sem json".into()),
            Ok("continua sem json".into()),
            Ok("nada".into()),
        ]);
        let (invoker, telemetry) = invoker_with(mock, Some("modelo-reserva"));
        let answer = invoker.ask(ctx("pergunta", "- geral: repouso")).await;
        assert_eq!(answer, StructuredAnswer::safe_fallback());
        let snap = telemetry.snapshot();
        assert_eq!(snap.ai_attempts, 4);
        assert_eq!(snap.schema_invalid, 4);
        // The fallback model never produced an answer.
        assert_eq!(snap.ai_fallback_used, 0);
    }

    #[tokio::test]
    async fn deny_list_hit_replaces_answer_with_safe_default() {
        let raw = r#"{"tipo":"esclarecimento","mensagem":"Recomendo que você dobre a dose hoje."}"#;
        let mock = MockChatModel::always(raw);
        let (invoker, telemetry) = invoker_with(mock, None);
        let answer = invoker.ask(ctx("posso ajustar?", "- geral: dose atual")).await;
        assert_eq!(answer, StructuredAnswer::safe_fallback());
        assert_eq!(telemetry.snapshot().deny_list_hits, 1);
    }

    #[tokio::test]
    async fn emergency_keyword_overrides_model_tipo() {
        // Model answers calmly, but the question itself is an emergency.
        let mock = MockChatModel::always(VALID_JSON);
        let (invoker, _) = invoker_with(mock, None);
        let answer = invoker
            .ask(ctx("estou com dor no peito, e o remédio?", "- geral: repouso"))
            .await;
        assert_eq!(answer.tipo, AnswerKind::EscalaEmergencia);
        assert!(answer.mensagem.starts_with("ATENÇÃO: Detectei sinais"));
    }

    #[tokio::test]
    async fn emergency_tipo_from_model_is_not_double_prefixed() {
        let raw = r#"{"tipo":"escala_emergencia","mensagem":"Procure atendimento agora."}"#;
        let mock = MockChatModel::always(raw);
        let (invoker, _) = invoker_with(mock, None);
        let answer = invoker
            .ask(ctx("estou com dor no peito", "- geral: repouso"))
            .await;
        assert_eq!(answer.tipo, AnswerKind::EscalaEmergencia);
        assert!(!answer.mensagem.contains("ATENÇÃO: Detectei"));
    }

    #[tokio::test]
    async fn fallback_equal_to_primary_is_not_retried() {
        let mock = MockChatModel::new(vec![
            Err(ModelError::Timeout(10)),
            Err(ModelError::Timeout(10)),
        ]);
        let (invoker, telemetry) = invoker_with(mock, Some("modelo-principal"));
        let answer = invoker.ask(ctx("pergunta", "- geral: repouso")).await;
        assert_eq!(answer, StructuredAnswer::safe_fallback());
        // Only the primary's two attempts; no redundant fallback pass.
        assert_eq!(telemetry.snapshot().ai_attempts, 2);
    }
}
