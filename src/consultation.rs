//! Consultation-age gate.
//!
//! Orientations age out: answering questions about a consultation that is
//! too old for its specialty risks clarifying guidance the doctor would no
//! longer give. The limit comes from the consultation-age policy; crossing
//! it blocks the pipeline, and approaching it attaches a non-blocking
//! warning nudging the patient toward a follow-up.

use crate::policy::ConsultationAgePolicy;

/// Fraction of the limit at which the near-limit warning starts.
///
/// Fixed across specialties. Product policy with clinical stakes; confirm
/// with a clinical stakeholder before treating as immutable.
const WARN_RATIO: f64 = 0.8;

/// Outcome of the consultation-age check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsultationAge {
    /// Older than the specialty limit; block and classify out-of-scope.
    Expired { limit: u32, message: String },
    /// Within the limit but past 80% of it; proceed with a warning.
    NearLimit { limit: u32, warning: String },
    /// Comfortably within the limit.
    Current { limit: u32 },
}

impl ConsultationAge {
    pub fn is_valid(&self) -> bool {
        !matches!(self, ConsultationAge::Expired { .. })
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            ConsultationAge::NearLimit { warning, .. } => Some(warning),
            _ => None,
        }
    }
}

/// Check `days_since` against the specialty's configured limit.
pub fn validate_consultation_age(
    policy: &ConsultationAgePolicy,
    days_since: u32,
    specialty: Option<&str>,
) -> ConsultationAge {
    let limit = policy.max_days(specialty);

    if days_since > limit {
        let message = render(
            &policy.messages.expired,
            days_since,
            limit,
            specialty.unwrap_or("sua especialidade"),
        );
        return ConsultationAge::Expired { limit, message };
    }

    if days_since as f64 > limit as f64 * WARN_RATIO {
        let warning = render(
            &policy.messages.warning_near_limit,
            days_since,
            limit,
            specialty.unwrap_or("sua especialidade"),
        );
        return ConsultationAge::NearLimit { limit, warning };
    }

    ConsultationAge::Current { limit }
}

fn render(template: &str, days: u32, limit: u32, specialty: &str) -> String {
    template
        .replace("{days}", &days.to_string())
        .replace("{limit}", &limit.to_string())
        .replace("{specialty}", specialty)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::policy::AgePolicyMessages;

    fn policy() -> ConsultationAgePolicy {
        ConsultationAgePolicy {
            max_days_since_consultation: HashMap::from([
                ("default".to_string(), 90),
                ("psiquiatria".to_string(), 30),
            ]),
            messages: AgePolicyMessages::default(),
        }
    }

    #[test]
    fn expired_consultation_blocks_with_message() {
        let age = validate_consultation_age(&policy(), 100, Some("Psiquiatria"));
        match age {
            ConsultationAge::Expired { limit, ref message } => {
                assert_eq!(limit, 30);
                assert!(message.contains("100"));
                assert!(message.contains("30"));
                assert!(message.contains("Psiquiatria"));
            }
            other => panic!("expected Expired, got {other:?}"),
        }
        assert!(!age.is_valid());
    }

    #[test]
    fn near_limit_warns_without_blocking() {
        // Limit 30, threshold 24: day 25 warns.
        let age = validate_consultation_age(&policy(), 25, Some("Psiquiatria"));
        assert!(age.is_valid());
        let warning = age.warning().expect("expected warning");
        assert!(warning.contains("25"));
    }

    #[test]
    fn threshold_day_itself_does_not_warn() {
        // Exactly 80% (24 of 30) is not past the threshold.
        let age = validate_consultation_age(&policy(), 24, Some("Psiquiatria"));
        assert_eq!(age, ConsultationAge::Current { limit: 30 });
    }

    #[test]
    fn limit_day_itself_is_still_valid() {
        let age = validate_consultation_age(&policy(), 30, Some("Psiquiatria"));
        assert!(age.is_valid());
        // Day 30 of 30 is past the 24-day warning threshold.
        assert!(age.warning().is_some());
    }

    #[test]
    fn recent_consultation_is_current() {
        let age = validate_consultation_age(&policy(), 10, Some("Psiquiatria"));
        assert_eq!(age, ConsultationAge::Current { limit: 30 });
        assert!(age.warning().is_none());
    }

    #[test]
    fn unknown_specialty_uses_default_limit() {
        let age = validate_consultation_age(&policy(), 100, Some("Dermatologia"));
        match age {
            ConsultationAge::Expired { limit, .. } => assert_eq!(limit, 90),
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn missing_specialty_renders_placeholder_text() {
        let age = validate_consultation_age(&policy(), 95, None);
        match age {
            ConsultationAge::Expired { ref message, .. } => {
                assert!(message.contains("sua especialidade"));
            }
            other => panic!("expected Expired, got {other:?}"),
        }
    }
}
