//! In-process pipeline counters.
//!
//! Operational visibility without an exporter dependency: each counter is a
//! relaxed atomic, incremented on the hot path and read as a consistent-ish
//! snapshot by the admin endpoint. Counts reset on process restart.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the answering pipeline.
#[derive(Debug, Default)]
pub struct Telemetry {
    /// Model calls attempted (primary and fallback, all attempts).
    ai_attempts: AtomicU64,
    /// Requests where the fallback model produced the final answer.
    ai_fallback_used: AtomicU64,
    /// Model responses rejected for missing/invalid JSON or schema.
    schema_invalid: AtomicU64,
    /// Validated answers suppressed by the deny-list.
    deny_list_hits: AtomicU64,
    /// Admissions rejected on the patient window.
    rate_limited_patient: AtomicU64,
    /// Admissions rejected on the IP window.
    rate_limited_ip: AtomicU64,
    /// Questions screened as emergency.
    screened_emergency: AtomicU64,
    /// Questions screened as a new symptom.
    screened_new_symptom: AtomicU64,
    /// Questions screened as out of scope.
    screened_out_of_scope: AtomicU64,
    /// Questions that passed screening.
    screened_safe: AtomicU64,
    /// Terminal answers that escalated to human staff.
    escalations_emergency: AtomicU64,
    /// Terminal answers classified out of scope.
    escalations_out_of_scope: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ai_attempt(&self) {
        self.ai_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ai_fallback_used(&self) {
        self.ai_fallback_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn schema_invalid(&self) {
        self.schema_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deny_list_hit(&self) {
        self.deny_list_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate-limit rejection. `key_kind` is "patient" or "ip".
    pub fn rate_limited(&self, key_kind: &str) {
        match key_kind {
            "patient" => self.rate_limited_patient.fetch_add(1, Ordering::Relaxed),
            _ => self.rate_limited_ip.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a question screening outcome by its stable label.
    pub fn screened(&self, label: &str) {
        match label {
            "emergency" => self.screened_emergency.fetch_add(1, Ordering::Relaxed),
            "new_symptom" => self.screened_new_symptom.fetch_add(1, Ordering::Relaxed),
            "out_of_scope" => self.screened_out_of_scope.fetch_add(1, Ordering::Relaxed),
            _ => self.screened_safe.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record a terminal escalation by answer tipo label.
    pub fn escalated(&self, tipo: &str) {
        match tipo {
            "escala_emergencia" => self.escalations_emergency.fetch_add(1, Ordering::Relaxed),
            "fora_escopo" => self.escalations_out_of_scope.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ai_attempts: self.ai_attempts.load(Ordering::Relaxed),
            ai_fallback_used: self.ai_fallback_used.load(Ordering::Relaxed),
            schema_invalid: self.schema_invalid.load(Ordering::Relaxed),
            deny_list_hits: self.deny_list_hits.load(Ordering::Relaxed),
            rate_limited_patient: self.rate_limited_patient.load(Ordering::Relaxed),
            rate_limited_ip: self.rate_limited_ip.load(Ordering::Relaxed),
            screened_emergency: self.screened_emergency.load(Ordering::Relaxed),
            screened_new_symptom: self.screened_new_symptom.load(Ordering::Relaxed),
            screened_out_of_scope: self.screened_out_of_scope.load(Ordering::Relaxed),
            screened_safe: self.screened_safe.load(Ordering::Relaxed),
            escalations_emergency: self.escalations_emergency.load(Ordering::Relaxed),
            escalations_out_of_scope: self.escalations_out_of_scope.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values, serialized by the admin endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ai_attempts: u64,
    pub ai_fallback_used: u64,
    pub schema_invalid: u64,
    pub deny_list_hits: u64,
    pub rate_limited_patient: u64,
    pub rate_limited_ip: u64,
    pub screened_emergency: u64,
    pub screened_new_symptom: u64,
    pub screened_out_of_scope: u64,
    pub screened_safe: u64,
    pub escalations_emergency: u64,
    pub escalations_out_of_scope: u64,
}
