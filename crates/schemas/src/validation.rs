// Input validation errors shared by the cadence catalog and the enrollment API

use thiserror::Error;

/// Reasons a request is rejected before it reaches a workflow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("wait step {step_id} must last at least one second")]
    NonPositiveWait { step_id: String },

    #[error("duplicate step id: {step_id}")]
    DuplicateStepId { step_id: String },
}

/// Check that a string looks like a deliverable email address
///
/// This is a shape check (`local@domain.tld`, no whitespace), not RFC 5322.
pub fn validate_email(address: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail(address.to_string());

    if address.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

/// Check that a required string field is present
pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(())
    }
}
