use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use super::{ConsultationAgePolicy, PolicyError, SafetyPolicy};

/// Shared, hot-reloadable policy snapshots.
///
/// Each document lives behind an `RwLock<Arc<_>>`: readers clone the `Arc`
/// (a pointer copy under a momentary read lock) and keep using their
/// snapshot for the rest of the request, so a concurrent reload can never
/// expose a partially-updated document. Reload builds the replacement in
/// full before the write-lock swap.
pub struct PolicyStore {
    safety_path: PathBuf,
    consultation_path: PathBuf,
    safety: RwLock<Arc<SafetyPolicy>>,
    consultation: RwLock<Arc<ConsultationAgePolicy>>,
}

impl PolicyStore {
    /// Load both documents from disk, substituting built-in defaults for
    /// anything unreadable. Never fails: a missing or corrupt file leaves
    /// the system safe-by-default instead of crashing or disabling gates.
    pub fn load(safety_path: impl Into<PathBuf>, consultation_path: impl Into<PathBuf>) -> Self {
        let safety_path = safety_path.into();
        let consultation_path = consultation_path.into();
        let safety = load_safety(&safety_path);
        let consultation = load_consultation(&consultation_path);
        Self {
            safety_path,
            consultation_path,
            safety: RwLock::new(Arc::new(safety)),
            consultation: RwLock::new(Arc::new(consultation)),
        }
    }

    /// Construct from in-memory documents. Used by tests and embedders that
    /// manage policy content themselves.
    pub fn from_documents(safety: SafetyPolicy, consultation: ConsultationAgePolicy) -> Self {
        Self {
            safety_path: PathBuf::new(),
            consultation_path: PathBuf::new(),
            safety: RwLock::new(Arc::new(safety)),
            consultation: RwLock::new(Arc::new(consultation)),
        }
    }

    /// Current safety policy snapshot.
    pub fn safety(&self) -> Arc<SafetyPolicy> {
        self.safety
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current consultation-age policy snapshot.
    pub fn consultation(&self) -> Arc<ConsultationAgePolicy> {
        self.consultation
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-read both documents from disk and swap the snapshots wholesale.
    ///
    /// Idempotent and safe under concurrent reads. A document that fails to
    /// load keeps its current in-memory snapshot (not the built-in
    /// fallback; a bad edit must not discard the last good policy), and
    /// the error is reported so the operator can fix the file.
    pub fn reload(&self) -> Result<(), Vec<PolicyError>> {
        let mut errors = Vec::new();

        match SafetyPolicy::load(&self.safety_path) {
            Ok(doc) => {
                let (emergency, new_symptom, out_of_scope, deny) = doc.counts();
                tracing::info!(emergency, new_symptom, out_of_scope, deny, "Safety policy reloaded");
                *self
                    .safety
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(doc);
            }
            Err(err) => {
                tracing::error!(error = %err, "Safety policy reload failed, keeping current snapshot");
                errors.push(err);
            }
        }

        match ConsultationAgePolicy::load(&self.consultation_path) {
            Ok(doc) => {
                tracing::info!(specialties = doc.specialty_count(), "Consultation-age policy reloaded");
                *self
                    .consultation
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(doc);
            }
            Err(err) => {
                tracing::error!(error = %err, "Consultation-age policy reload failed, keeping current snapshot");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn load_safety(path: &std::path::Path) -> SafetyPolicy {
    match SafetyPolicy::load(path) {
        Ok(doc) => {
            let (emergency, new_symptom, out_of_scope, deny) = doc.counts();
            tracing::info!(emergency, new_symptom, out_of_scope, deny, "Safety policy loaded");
            doc
        }
        Err(err) => {
            tracing::error!(error = %err, "Safety policy unavailable, using built-in fallback");
            SafetyPolicy::builtin_fallback()
        }
    }
}

fn load_consultation(path: &std::path::Path) -> ConsultationAgePolicy {
    match ConsultationAgePolicy::load(path) {
        Ok(doc) => {
            tracing::info!(specialties = doc.specialty_count(), "Consultation-age policy loaded");
            doc
        }
        Err(err) => {
            tracing::error!(error = %err, "Consultation-age policy unavailable, using built-in fallback");
            ConsultationAgePolicy::builtin_fallback()
        }
    }
}
