// Cadence catalog
//
// Keeps cadence definitions in memory. Enrolling a contact copies the steps
// into the workflow input, so editing a cadence never reaches enrollments
// that are already running.

use cadence_schemas::{
    require_non_empty, validate_cadence_steps, Cadence, CreateCadenceRequest,
    UpdateCadenceRequest, ValidationError,
};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

/// Errors from catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("cadence not found: {0}")]
    NotFound(String),

    #[error("invalid cadence: {0}")]
    Invalid(#[from] ValidationError),
}

/// In-memory cadence catalog
#[derive(Debug, Default)]
pub struct CadenceService {
    cadences: DashMap<String, Cadence>,
}

impl CadenceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cadence with a fresh id
    pub fn create(&self, request: CreateCadenceRequest) -> Result<Cadence, CadenceError> {
        require_non_empty("name", &request.name)?;
        validate_cadence_steps(&request.steps)?;

        let cadence = Cadence {
            id: Uuid::now_v7().to_string(),
            name: request.name,
            steps: request.steps,
        };
        self.cadences.insert(cadence.id.clone(), cadence.clone());

        info!(cadence_id = %cadence.id, steps = cadence.steps.len(), "created cadence");
        Ok(cadence)
    }

    /// All cadences, oldest first
    pub fn list(&self) -> Vec<Cadence> {
        let mut cadences: Vec<Cadence> = self
            .cadences
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        cadences.sort_by(|a, b| a.id.cmp(&b.id));
        cadences
    }

    pub fn get(&self, id: &str) -> Result<Cadence, CadenceError> {
        self.cadences
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CadenceError::NotFound(id.to_string()))
    }

    /// Apply the fields present in `request`
    pub fn update(&self, id: &str, request: UpdateCadenceRequest) -> Result<Cadence, CadenceError> {
        if let Some(name) = &request.name {
            require_non_empty("name", name)?;
        }
        if let Some(steps) = &request.steps {
            validate_cadence_steps(steps)?;
        }

        let mut entry = self
            .cadences
            .get_mut(id)
            .ok_or_else(|| CadenceError::NotFound(id.to_string()))?;
        if let Some(name) = request.name {
            entry.name = name;
        }
        if let Some(steps) = request.steps {
            entry.steps = steps;
        }

        info!(cadence_id = %id, "updated cadence");
        Ok(entry.clone())
    }
}
