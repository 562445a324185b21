//! Compliance-grade audit trail with PII redaction.
//!
//! Every completed request, terminal classifications and error paths
//! included, leaves exactly one record. Free text is truncated and
//! one-way hashed before it is stored; the full question or answer is
//! never persisted, which supports later pattern analysis and complaint
//! investigation without retaining unbounded PII. Recording never fails
//! the request: sink problems are logged and swallowed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Maximum stored length for question and answer text.
const MAX_STORED_CHARS: usize = 500;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_.+-]+@[A-Za-z0-9-]+\.[A-Za-z0-9-.]+").expect("Invalid email regex")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?55\s?)?(?:\(?\d{2}\)?\s?)?\d{4,5}[- ]?\d{4}\b")
        .expect("Invalid phone regex")
});
static CPF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}\.\d{3}\.\d{3}-\d{2}\b|\b\d{11}\b").expect("Invalid CPF regex")
});
static RG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}\.\d{3}\.\d{3}-[\dX]\b").expect("Invalid RG regex"));

/// Truncated text plus the SHA-256 digest of the full original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredText {
    pub truncated: String,
    pub digest: String,
}

/// Truncate for storage and digest the full text. Empty input produces an
/// empty digest, so "no answer" is distinguishable from "empty answer
/// hashed".
pub fn safe_store(text: &str, max_chars: usize) -> StoredText {
    if text.is_empty() {
        return StoredText {
            truncated: String::new(),
            digest: String::new(),
        };
    }
    let digest = hex_digest(text);
    let truncated = text.chars().take(max_chars).collect();
    StoredText { truncated, digest }
}

/// Replace Brazilian PII patterns (email, phone, CPF, RG) with tags.
/// Applied to any free text that reaches a log line.
pub fn redact_pii(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, "<email>");
    let text = PHONE_RE.replace_all(&text, "<telefone>");
    let text = CPF_RE.replace_all(&text, "<cpf>");
    RG_RE.replace_all(&text, "<rg>").into_owned()
}

/// Pseudonymize a patient id with a salted one-way hash, truncated to 16
/// hex chars: enough to correlate records, useless to reverse.
pub fn pseudonymize(patient_id: &str, salt: &str) -> String {
    hex_digest(&format!("{patient_id}:{salt}"))[..16].to_string()
}

fn hex_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Model provenance attached to each record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelMetadata {
    pub model: String,
    pub prompt_version: String,
    pub specialty: Option<String>,
}

/// One immutable audit record per completed request. Retention is enforced
/// by an external cleanup process.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: uuid::Uuid,
    pub recorded_at: String,
    pub encounter_id: Option<String>,
    pub patient_pseudonym: String,
    pub question: StoredText,
    pub answer: StoredText,
    pub escalation_triggered: bool,
    pub escalation_reason: Option<String>,
    pub emergency: bool,
    pub model_metadata: ModelMetadata,
}

/// What the pipeline hands the sink.
#[derive(Debug)]
pub struct AuditEvent<'a> {
    pub encounter_id: Option<&'a str>,
    pub patient_id: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub escalation: bool,
    pub emergency: bool,
    pub escalation_reason: Option<&'a str>,
    pub model_metadata: ModelMetadata,
}

/// Appends redacted records as JSON lines; logs a redacted summary either
/// way. Construction decides the destination once; `record` never returns
/// an error to the caller.
pub struct AuditSink {
    salt: String,
    writer: Option<Mutex<File>>,
}

impl AuditSink {
    /// Sink writing to `path` (append-only JSONL). If the file cannot be
    /// opened the sink degrades to log-only and says so once.
    pub fn new(salt: &str, path: Option<&Path>) -> Self {
        let writer = path.and_then(|p| match OpenOptions::new().create(true).append(true).open(p) {
            Ok(file) => Some(Mutex::new(file)),
            Err(err) => {
                tracing::error!(path = %p.display(), error = %err, "Audit log unavailable, records go to tracing only");
                None
            }
        });
        if salt == "change-me" {
            tracing::warn!("PSEUDONYM_SALT left at default, patient pseudonyms are guessable");
        }
        Self {
            salt: salt.to_string(),
            writer,
        }
    }

    /// Log-only sink.
    pub fn log_only(salt: &str) -> Self {
        Self::new(salt, None)
    }

    /// Build, persist, and return the record. Persistence failures are
    /// swallowed after an error log; audit must never abort a request.
    pub fn record(&self, event: AuditEvent<'_>) -> AuditRecord {
        let record = AuditRecord {
            id: uuid::Uuid::new_v4(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
            encounter_id: event.encounter_id.map(str::to_string),
            patient_pseudonym: pseudonymize(event.patient_id, &self.salt),
            question: safe_store(&redact_pii(event.question), MAX_STORED_CHARS),
            answer: safe_store(&redact_pii(event.answer), MAX_STORED_CHARS),
            escalation_triggered: event.escalation,
            escalation_reason: event.escalation_reason.map(str::to_string),
            emergency: event.emergency,
            model_metadata: event.model_metadata,
        };

        tracing::info!(
            patient = %record.patient_pseudonym,
            escalation = record.escalation_triggered,
            emergency = record.emergency,
            reason = record.escalation_reason.as_deref().unwrap_or("none"),
            "ai_interaction"
        );

        if let Some(writer) = &self.writer {
            if let Err(err) = self.append_line(writer, &record) {
                tracing::error!(error = %err, "Failed to append audit record");
            }
        }

        record
    }

    fn append_line(&self, writer: &Mutex<File>, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{line}")
    }
}
