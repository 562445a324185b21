use std::path::Path;

use serde::{Deserialize, Serialize};

use super::PolicyError;

/// Safety keyword policy: ordered keyword groups screened against every
/// incoming question, plus the deny-list applied to generated answers.
///
/// Group order encodes clinical priority (emergency outranks new-symptom
/// outranks out-of-scope) and list order within a group is preserved so
/// the first (most specific) phrase wins when reporting a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Signs requiring immediate escalation (chest pain, dyspnea, ...).
    #[serde(default)]
    pub emergency_keywords: Vec<String>,
    /// Phrasing that indicates a new or worsening symptom.
    #[serde(default)]
    pub new_symptom_keywords: Vec<String>,
    /// Requests the assistant must not handle (new drugs, dosage changes).
    #[serde(default)]
    pub out_of_scope_keywords: Vec<String>,
    /// Post-generation filter: phrases implying the model issued new
    /// clinical instructions.
    #[serde(default)]
    pub deny_phrases: Vec<String>,
}

impl SafetyPolicy {
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

    /// Conservative built-in fallback, used when the external document is
    /// missing or unparseable. Deliberately small: it keeps the highest-risk
    /// gates alive rather than reproducing the full governed lists.
    pub fn builtin_fallback() -> Self {
        Self {
            emergency_keywords: strings(&["dor no peito", "falta de ar", "sangramento"]),
            new_symptom_keywords: strings(&["estou sentindo", "piorou"]),
            out_of_scope_keywords: strings(&["posso tomar", "outro remédio"]),
            deny_phrases: strings(&["você deve tomar", "recomendo que você"]),
        }
    }

    /// Group sizes, for load-time logging.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.emergency_keywords.len(),
            self.new_symptom_keywords.len(),
            self.out_of_scope_keywords.len(),
            self.deny_phrases.len(),
        )
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_full_document() {
        let yaml = r#"
emergency_keywords:
  - dor no peito
  - ideação suicida
new_symptom_keywords:
  - estou sentindo
out_of_scope_keywords:
  - posso tomar
deny_phrases:
  - você deve tomar
"#;
        let policy: SafetyPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.emergency_keywords.len(), 2);
        assert_eq!(policy.emergency_keywords[1], "ideação suicida");
        assert_eq!(policy.counts(), (2, 1, 1, 1));
    }

    #[test]
    fn missing_groups_default_to_empty() {
        let policy: SafetyPolicy =
            serde_yaml::from_str("emergency_keywords: [sangramento]").unwrap();
        assert_eq!(policy.emergency_keywords, vec!["sangramento"]);
        assert!(policy.new_symptom_keywords.is_empty());
        assert!(policy.deny_phrases.is_empty());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "emergency_keywords: [\"dor no peito\"]").unwrap();
        let policy = SafetyPolicy::load(file.path()).unwrap();
        assert_eq!(policy.emergency_keywords, vec!["dor no peito"]);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = SafetyPolicy::load(Path::new("/nonexistent/safety.yaml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }

    #[test]
    fn load_garbage_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "emergency_keywords: {{ not: [valid").unwrap();
        let err = SafetyPolicy::load(file.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }

    #[test]
    fn fallback_keeps_highest_risk_gates() {
        let policy = SafetyPolicy::builtin_fallback();
        assert!(policy.emergency_keywords.contains(&"dor no peito".to_string()));
        assert!(!policy.deny_phrases.is_empty());
    }
}
