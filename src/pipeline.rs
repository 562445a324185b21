//! The answering pipeline.
//!
//! Stages run in strict order (rate limiter, safety screen, encounter
//! lookup, consultation-age gate, model invoker, audit) and any stage may
//! terminate the request with a classified answer. No stage propagates a
//! raw error to the transport layer: every path ends in a schema-valid
//! [`StructuredAnswer`], with admission rejection as the one distinct,
//! explicitly typed outcome.

use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink, ModelMetadata};
use crate::consultation::{validate_consultation_age, ConsultationAge};
use crate::encounter::{EncounterContext, EncounterDirectory};
use crate::model::schema::{AnswerKind, AnswerMetadata, StructuredAnswer};
use crate::model::{AnswerContext, ModelInvoker};
use crate::policy::PolicyStore;
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::safety::{QuestionScreen, SafetyValidator};
use crate::telemetry::Telemetry;

/// Version tag recorded in audit model metadata.
const PROMPT_VERSION: &str = "v1";

/// Outcome of one question.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The pipeline produced a classified answer.
    Answer(StructuredAnswer),
    /// Admission rejected; the caller must retry later. Not an error: the
    /// answer body tells the patient how long to wait.
    RateLimited {
        retry_after_secs: u64,
        answer: StructuredAnswer,
    },
}

/// Process-wide pipeline services, constructed once at startup and shared
/// across request handlers.
pub struct AnswerPipeline {
    limiter: RateLimiter,
    policies: Arc<PolicyStore>,
    directory: Arc<dyn EncounterDirectory>,
    invoker: ModelInvoker,
    audit: AuditSink,
    telemetry: Arc<Telemetry>,
    model_name: String,
}

impl AnswerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        limiter: RateLimiter,
        policies: Arc<PolicyStore>,
        directory: Arc<dyn EncounterDirectory>,
        invoker: ModelInvoker,
        audit: AuditSink,
        telemetry: Arc<Telemetry>,
        model_name: String,
    ) -> Self {
        Self {
            limiter,
            policies,
            directory,
            invoker,
            audit,
            telemetry,
            model_name,
        }
    }

    /// Answer one patient question.
    pub async fn answer(&self, question: &str, patient_id: &str, ip: &str) -> PipelineOutcome {
        // Stage 1: admission.
        if let RateDecision::Rejected {
            retry_after_secs,
            key_kind,
        } = self.limiter.allow(patient_id, ip).await
        {
            self.telemetry.rate_limited(key_kind.as_str());
            tracing::info!(
                key = key_kind.as_str(),
                retry_after_secs,
                "Request rejected by rate limiter"
            );
            return PipelineOutcome::RateLimited {
                retry_after_secs,
                answer: StructuredAnswer {
                    tipo: AnswerKind::Erro,
                    mensagem: format!(
                        "Muitas requisições. Tente novamente em {retry_after_secs} segundos."
                    ),
                    metadados: AnswerMetadata::default(),
                },
            };
        }

        // Stage 2: question screening, in clinical priority order.
        let screen = SafetyValidator::new(Arc::clone(&self.policies)).screen_question(question);
        self.telemetry.screened(screen.label());
        if !screen.is_safe() {
            let answer = self.screened_answer(&screen);
            self.finish(question, patient_id, None, &screen, &answer);
            return PipelineOutcome::Answer(answer);
        }

        // Stage 3: encounter lookup (read-only collaborator).
        let context = match self.directory.last_encounter(patient_id).await {
            Ok(Some(context)) => context,
            Ok(None) => {
                let answer = StructuredAnswer {
                    tipo: AnswerKind::ForaEscopo,
                    mensagem: "Não encontrei sua última consulta no sistema. \
                               Posso encaminhar ao médico?"
                        .to_string(),
                    metadados: AnswerMetadata::default(),
                };
                self.finish(question, patient_id, None, &screen, &answer);
                return PipelineOutcome::Answer(answer);
            }
            Err(err) => {
                // Infrastructure failure: degrade to the safe default
                // rather than aborting the request.
                tracing::error!(error = %err, "Encounter lookup failed");
                let answer = StructuredAnswer::safe_fallback();
                self.finish(question, patient_id, None, &screen, &answer);
                return PipelineOutcome::Answer(answer);
            }
        };

        let doctor = context
            .encounter
            .doctor
            .clone()
            .unwrap_or_else(|| "seu médico".to_string());
        let consult_date = context.consult_date_br();
        let specialty = context.encounter.specialty.clone();

        // Stage 4: consultation-age gate.
        let days_since = context.days_since(chrono::Utc::now().date_naive());
        let age = validate_consultation_age(
            &self.policies.consultation(),
            days_since,
            specialty.as_deref(),
        );
        if let ConsultationAge::Expired { limit, message } = &age {
            let answer = StructuredAnswer {
                tipo: AnswerKind::ForaEscopo,
                mensagem: message.clone(),
                metadados: AnswerMetadata {
                    medico: doctor.clone(),
                    data_consulta: consult_date.clone(),
                    especialidade: specialty.clone(),
                    dias_desde_consulta: Some(days_since),
                    limite_dias: Some(*limit),
                },
            };
            self.finish(question, patient_id, Some(&context), &screen, &answer);
            return PipelineOutcome::Answer(answer);
        }

        // Stage 5: the model, under guardrails.
        let orientations_text = context.orientations_text();
        let mut answer = self
            .invoker
            .ask(AnswerContext {
                question,
                orientations_text: &orientations_text,
                doctor_name: &doctor,
                consult_date: &consult_date,
                specialty: specialty.as_deref(),
            })
            .await;

        // A near-limit consultation rides along as a follow-up nudge on
        // successful clarifications.
        if answer.tipo == AnswerKind::Esclarecimento {
            if let Some(warning) = age.warning() {
                answer.mensagem = format!("{}\n\n{warning}", answer.mensagem);
            }
        }

        self.finish(question, patient_id, Some(&context), &screen, &answer);
        PipelineOutcome::Answer(answer)
    }

    /// Terminal answer for an unsafe question, message wording per policy.
    fn screened_answer(&self, screen: &QuestionScreen) -> StructuredAnswer {
        match screen {
            QuestionScreen::Emergency { keyword } => StructuredAnswer {
                tipo: AnswerKind::EscalaEmergencia,
                mensagem: format!(
                    "ATENÇÃO: Detectei sinais de possível emergência médica ({keyword}). \
                     Vou te conectar com a equipe médica AGORA. Por favor, aguarde."
                ),
                metadados: AnswerMetadata::default(),
            },
            QuestionScreen::NewSymptom { keyword } => StructuredAnswer {
                tipo: AnswerKind::EscalaEmergencia,
                mensagem: format!(
                    "Percebo que você está relatando algo novo ({keyword}). Preciso \
                     encaminhar você para avaliação médica. Vou conectar você com a \
                     equipe agora."
                ),
                metadados: AnswerMetadata::default(),
            },
            QuestionScreen::OutOfScope { keyword } => StructuredAnswer {
                tipo: AnswerKind::ForaEscopo,
                mensagem: format!(
                    "Essa questão ({keyword}) está fora do meu escopo de esclarecer \
                     orientações existentes. Posso agendar um contato com seu médico \
                     para discutir isso?"
                ),
                metadados: AnswerMetadata::default(),
            },
            QuestionScreen::Safe => unreachable!("safe questions do not short-circuit"),
        }
    }

    /// Escalation accounting and the one audit record per completed request.
    fn finish(
        &self,
        question: &str,
        patient_id: &str,
        context: Option<&EncounterContext>,
        screen: &QuestionScreen,
        answer: &StructuredAnswer,
    ) {
        if answer.tipo.is_escalation() {
            self.telemetry.escalated(answer.tipo.as_str());
        }

        let escalation_reason = if answer.tipo != AnswerKind::Esclarecimento {
            Some(answer.tipo.as_str())
        } else {
            None
        };
        // A blocked question carries its screening reason for investigators.
        let reason = screen.reason();

        self.audit.record(AuditEvent {
            encounter_id: context.map(|c| c.encounter.id.as_str()),
            patient_id,
            question,
            answer: &answer.mensagem,
            escalation: answer.tipo.is_escalation(),
            emergency: answer.tipo == AnswerKind::EscalaEmergencia,
            escalation_reason: reason.as_deref().or(escalation_reason),
            model_metadata: ModelMetadata {
                model: self.model_name.clone(),
                prompt_version: PROMPT_VERSION.to_string(),
                specialty: context.and_then(|c| c.encounter.specialty.clone()),
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::encounter::{Encounter, Orientation, StaticDirectory};
    use crate::model::{BackoffPolicy, InvokerConfig, MockChatModel, ModelError};
    use crate::policy::{ConsultationAgePolicy, SafetyPolicy};
    use crate::rate_limit::MemoryRateLimiter;

    const VALID_JSON: &str = r#"{"tipo":"esclarecimento","mensagem":"Com base nas orientações do Dr. Silva em 02/03/2026, tome pela manhã.","metadados":{"medico":"Dr. Silva","data_consulta":"02/03/2026"}}"#;

    struct Harness {
        pipeline: AnswerPipeline,
        telemetry: Arc<Telemetry>,
        directory: Arc<StaticDirectory>,
    }

    fn harness(mock: MockChatModel, patient_limit: u32) -> Harness {
        harness_with_audit(mock, patient_limit, AuditSink::log_only("sal-de-teste"))
    }

    fn harness_with_audit(mock: MockChatModel, patient_limit: u32, audit: AuditSink) -> Harness {
        let policies = Arc::new(PolicyStore::from_documents(
            SafetyPolicy::builtin_fallback(),
            ConsultationAgePolicy::builtin_fallback(),
        ));
        let telemetry = Arc::new(Telemetry::new());
        let directory = Arc::new(StaticDirectory::new());
        let invoker = ModelInvoker::new(
            Box::new(mock),
            Arc::clone(&policies),
            Arc::clone(&telemetry),
            InvokerConfig {
                primary_model: "modelo-principal".into(),
                fallback_model: None,
                backoff: BackoffPolicy::new(0, Duration::from_millis(1)),
            },
        );
        let pipeline = AnswerPipeline::new(
            RateLimiter::Memory(MemoryRateLimiter::new(patient_limit, 100)),
            policies,
            Arc::clone(&directory) as Arc<dyn EncounterDirectory>,
            invoker,
            audit,
            Arc::clone(&telemetry),
            "modelo-principal".into(),
        );
        Harness {
            pipeline,
            telemetry,
            directory,
        }
    }

    fn recent_encounter() -> EncounterContext {
        EncounterContext {
            encounter: Encounter {
                id: "enc-1".into(),
                // Recent enough that no age gate fires for default 90 days.
                date: chrono::Utc::now().date_naive() - chrono::Duration::days(5),
                specialty: Some("Cardiologia".into()),
                doctor: Some("Dr. Silva".into()),
            },
            orientations: vec![Orientation {
                orientation_type: Some("medicação".into()),
                content: "Losartana 50mg pela manhã".into(),
            }],
        }
    }

    fn answer_of(outcome: PipelineOutcome) -> StructuredAnswer {
        match outcome {
            PipelineOutcome::Answer(answer) => answer,
            PipelineOutcome::RateLimited { .. } => panic!("unexpected rate limit"),
        }
    }

    #[tokio::test]
    async fn chest_pain_escalates_without_model_call() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);
        h.directory.insert("p1", recent_encounter());

        let answer = answer_of(h.pipeline.answer("estou com dor no peito", "p1", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::EscalaEmergencia);
        assert!(answer.mensagem.contains("dor no peito"));

        let snap = h.telemetry.snapshot();
        assert_eq!(snap.ai_attempts, 0, "model must never be called");
        assert_eq!(snap.screened_emergency, 1);
        assert_eq!(snap.escalations_emergency, 1);
    }

    #[tokio::test]
    async fn new_drug_request_is_out_of_scope_without_model_call() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);
        h.directory.insert("p1", recent_encounter());

        let answer =
            answer_of(h.pipeline.answer("posso tomar outro remédio?", "p1", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::ForaEscopo);
        assert_eq!(h.telemetry.snapshot().ai_attempts, 0);
        assert_eq!(h.telemetry.snapshot().escalations_out_of_scope, 1);
    }

    #[tokio::test]
    async fn safe_question_reaches_model_and_returns_clarification() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);
        h.directory.insert("p1", recent_encounter());

        let answer =
            answer_of(h.pipeline.answer("qual o horário do remédio?", "p1", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::Esclarecimento);
        assert_eq!(h.telemetry.snapshot().ai_attempts, 1);
        assert_eq!(h.telemetry.snapshot().screened_safe, 1);
    }

    #[tokio::test]
    async fn missing_encounter_is_out_of_scope() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);

        let answer = answer_of(h.pipeline.answer("qual o horário?", "desconhecido", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::ForaEscopo);
        assert!(answer.mensagem.contains("Não encontrei sua última consulta"));
        assert_eq!(h.telemetry.snapshot().ai_attempts, 0);
    }

    #[tokio::test]
    async fn expired_consultation_blocks_before_model() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);
        let mut old = recent_encounter();
        old.encounter.date = chrono::Utc::now().date_naive() - chrono::Duration::days(120);
        h.directory.insert("p1", old);

        let answer = answer_of(h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::ForaEscopo);
        assert!(answer.mensagem.contains("120"));
        assert!(answer.mensagem.contains("90"));
        assert_eq!(answer.metadados.dias_desde_consulta, Some(120));
        assert_eq!(answer.metadados.limite_dias, Some(90));
        assert_eq!(h.telemetry.snapshot().ai_attempts, 0);
    }

    #[tokio::test]
    async fn near_limit_warning_rides_on_clarification() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 100);
        let mut near = recent_encounter();
        near.encounter.date = chrono::Utc::now().date_naive() - chrono::Duration::days(80);
        h.directory.insert("p1", near);

        let answer = answer_of(h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await);
        assert_eq!(answer.tipo, AnswerKind::Esclarecimento);
        assert!(answer.mensagem.contains("Considere agendar um retorno"));
    }

    #[tokio::test]
    async fn rate_limit_rejection_is_typed_with_retry_hint() {
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness(mock, 1);
        h.directory.insert("p1", recent_encounter());

        let first = h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await;
        assert!(matches!(first, PipelineOutcome::Answer(_)));

        match h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await {
            PipelineOutcome::RateLimited {
                retry_after_secs,
                answer,
            } => {
                assert!(retry_after_secs > 0);
                assert_eq!(answer.tipo, AnswerKind::Erro);
                assert!(answer.mensagem.contains(&retry_after_secs.to_string()));
            }
            PipelineOutcome::Answer(_) => panic!("second call must be rate limited"),
        }
        assert_eq!(h.telemetry.snapshot().rate_limited_patient, 1);
    }

    #[tokio::test]
    async fn emergency_leaves_audit_record_with_emergency_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness_with_audit(mock, 100, AuditSink::new("sal-de-teste", Some(&path)));
        h.directory.insert("p1", recent_encounter());

        let _ = h.pipeline.answer("estou com dor no peito", "p1", "10.0.0.1").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record["emergency"], true);
        assert_eq!(record["escalation_triggered"], true);
        assert!(record["escalation_reason"]
            .as_str()
            .unwrap()
            .contains("emergência"));
        // Redacted storage, never the raw pipeline state.
        assert_eq!(record["question"]["truncated"], "estou com dor no peito");
        assert_eq!(record["question"]["digest"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn model_path_leaves_audit_record_without_escalation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mock = MockChatModel::always(VALID_JSON);
        let h = harness_with_audit(mock, 100, AuditSink::new("sal-de-teste", Some(&path)));
        h.directory.insert("p1", recent_encounter());

        let _ = h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record["emergency"], false);
        assert_eq!(record["escalation_triggered"], false);
        assert!(record["escalation_reason"].is_null());
        assert_eq!(record["encounter_id"], "enc-1");
        assert_eq!(record["model_metadata"]["model"], "modelo-principal");
    }

    #[tokio::test]
    async fn total_model_failure_returns_safe_default() {
        let mock = MockChatModel::new(vec![Err(ModelError::Timeout(10))]);
        let h = harness(mock, 100);
        h.directory.insert("p1", recent_encounter());

        let answer = answer_of(h.pipeline.answer("qual o horário?", "p1", "10.0.0.1").await);
        assert_eq!(answer, StructuredAnswer::safe_fallback());
    }
}
