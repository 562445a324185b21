use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

use super::PolicyError;

/// Default consultation-age limit when a specialty has no entry and the
/// document carries no `default` key.
const DEFAULT_MAX_DAYS: u32 = 90;

/// Per-specialty maximum consultation age, with patient-facing message
/// templates.
///
/// Specialty keys in the document are normalized (`Clínica Geral` →
/// `clinica_geral`), so lookups tolerate whatever casing the encounter
/// record carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationAgePolicy {
    /// `default` plus one entry per specialty key, in days.
    #[serde(default)]
    pub max_days_since_consultation: HashMap<String, u32>,
    #[serde(default)]
    pub messages: AgePolicyMessages,
}

/// Message templates with `{days}`, `{limit}`, `{specialty}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgePolicyMessages {
    pub warning_near_limit: String,
    pub expired: String,
}

impl Default for AgePolicyMessages {
    fn default() -> Self {
        Self {
            warning_near_limit:
                "Sua última consulta foi há {days} dias. Considere agendar um retorno em breve."
                    .to_string(),
            expired: "Sua consulta foi há {days} dias (limite: {limit} dias para {specialty}). \
                      Por segurança, você precisa agendar uma nova consulta."
                .to_string(),
        }
    }
}

impl ConsultationAgePolicy {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| PolicyError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Built-in fallback: 90-day default for every specialty.
    pub fn builtin_fallback() -> Self {
        Self {
            max_days_since_consultation: HashMap::from([(
                "default".to_string(),
                DEFAULT_MAX_DAYS,
            )]),
            messages: AgePolicyMessages::default(),
        }
    }

    /// Maximum consultation age in days for a specialty.
    ///
    /// The specialty name is normalized to a policy key (lowercase, no
    /// accents, spaces as `_`). Unknown specialties fall back to the
    /// `default` entry, and a document without one falls back to 90 days.
    pub fn max_days(&self, specialty: Option<&str>) -> u32 {
        let default = self
            .max_days_since_consultation
            .get("default")
            .copied()
            .unwrap_or(DEFAULT_MAX_DAYS);

        match specialty {
            None => default,
            Some(name) => {
                let key = normalize(name).replace(' ', "_");
                self.max_days_since_consultation
                    .get(&key)
                    .copied()
                    .unwrap_or(default)
            }
        }
    }

    /// Number of configured specialty entries, for load-time logging.
    pub fn specialty_count(&self) -> usize {
        self.max_days_since_consultation.len()
    }
}
