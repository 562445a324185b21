//! Encounter lookup collaborator.
//!
//! The platform's persistence layer owns encounters; this pipeline only
//! reads the most recent one per patient. The trait keeps that seam
//! explicit and mockable. `StaticDirectory` serves tests and deployments
//! where the encounter feed arrives as a seed file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A recorded medical visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: String,
    pub date: NaiveDate,
    pub specialty: Option<String>,
    /// Attending doctor as the patient should see them ("Dra. Lima").
    #[serde(default)]
    pub doctor: Option<String>,
}

/// One piece of guidance recorded during an encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(default)]
    pub orientation_type: Option<String>,
    pub content: String,
}

/// The most recent encounter plus its ordered orientations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterContext {
    pub encounter: Encounter,
    pub orientations: Vec<Orientation>,
}

impl EncounterContext {
    /// Render orientations as the grounded context block the model sees.
    /// Untyped orientations render as `geral`.
    pub fn orientations_text(&self) -> String {
        self.orientations
            .iter()
            .map(|o| {
                format!(
                    "- {}: {}",
                    o.orientation_type.as_deref().unwrap_or("geral"),
                    o.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Consultation date as patients see it (dd/mm/yyyy).
    pub fn consult_date_br(&self) -> String {
        self.encounter.date.format("%d/%m/%Y").to_string()
    }

    /// Whole days elapsed from the encounter to `today`. Clock skew that
    /// puts the encounter in the future counts as zero days.
    pub fn days_since(&self, today: NaiveDate) -> u32 {
        (today - self.encounter.date).num_days().max(0) as u32
    }
}

/// Errors from the encounter lookup collaborator.
#[derive(Debug, thiserror::Error)]
pub enum EncounterError {
    #[error("Encounter lookup failed: {0}")]
    Lookup(String),
}

/// Read-only lookup of a patient's most recent encounter.
#[async_trait]
pub trait EncounterDirectory: Send + Sync {
    /// `None` when the patient has no recorded encounter.
    async fn last_encounter(
        &self,
        patient_id: &str,
    ) -> Result<Option<EncounterContext>, EncounterError>;
}

/// In-memory directory, optionally seeded from a JSON file.
#[derive(Default)]
pub struct StaticDirectory {
    by_patient: RwLock<HashMap<String, EncounterContext>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON file mapping patient id to encounter context.
    pub fn from_json_file(path: &Path) -> Result<Self, EncounterError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EncounterError::Lookup(format!("{}: {e}", path.display())))?;
        let by_patient: HashMap<String, EncounterContext> = serde_json::from_str(&contents)
            .map_err(|e| EncounterError::Lookup(format!("{}: {e}", path.display())))?;
        tracing::info!(patients = by_patient.len(), "Encounter seed loaded");
        Ok(Self {
            by_patient: RwLock::new(by_patient),
        })
    }

    pub fn insert(&self, patient_id: &str, context: EncounterContext) {
        self.by_patient
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(patient_id.to_string(), context);
    }
}

#[async_trait]
impl EncounterDirectory for StaticDirectory {
    async fn last_encounter(
        &self,
        patient_id: &str,
    ) -> Result<Option<EncounterContext>, EncounterError> {
        Ok(self
            .by_patient
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(patient_id)
            .cloned())
    }
}
