//! Externally governed policy documents.
//!
//! Two human-editable YAML documents drive the pipeline's gating decisions:
//! the safety keyword policy and the per-specialty consultation-age policy.
//! Clinical governance edits the files; the service reloads them without a
//! redeploy. Absence or corruption of either file must never disable
//! validation: a conservative built-in default takes its place.

mod consultation_policy;
mod safety_policy;
mod store;

pub use consultation_policy::{AgePolicyMessages, ConsultationAgePolicy};
pub use safety_policy::SafetyPolicy;
pub use store::PolicyStore;

/// Errors from policy document loading.
///
/// Callers rarely see these: [`PolicyStore`] logs them and substitutes the
/// built-in defaults. They surface only through the admin reload endpoint,
/// where the operator wants to know the file on disk is bad.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
