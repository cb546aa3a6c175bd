// Step domain types
//
// A step is one unit of work inside a cadence. Steps travel as JSON objects
// tagged by `type` ("SEND_EMAIL" or "WAIT").

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// One unit of work in a cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    /// Send one email to the enrolled contact
    SendEmail {
        id: String,
        subject: String,
        body: String,
    },

    /// Pause the cadence for a number of seconds
    Wait { id: String, seconds: u64 },
}

impl Step {
    /// Create a send-email step
    pub fn send_email(
        id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::SendEmail {
            id: id.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Create a wait step
    pub fn wait(id: impl Into<String>, seconds: u64) -> Self {
        Self::Wait {
            id: id.into(),
            seconds,
        }
    }

    /// Display identifier of the step
    ///
    /// Ids are metadata only; execution position is tracked by index.
    pub fn id(&self) -> &str {
        match self {
            Self::SendEmail { id, .. } | Self::Wait { id, .. } => id,
        }
    }

    /// Wire name of the step kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendEmail { .. } => "SEND_EMAIL",
            Self::Wait { .. } => "WAIT",
        }
    }

    /// Check the step on its own
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Wait { id, seconds: 0 } => Err(ValidationError::NonPositiveWait {
                step_id: id.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Validate a step list used to replace the steps of a running enrollment
pub fn validate_steps(steps: &[Step]) -> Result<(), ValidationError> {
    steps.iter().try_for_each(Step::validate)
}

/// Validate the step list of a new or edited cadence
///
/// Same as [`validate_steps`], and additionally step ids must be unique.
pub fn validate_cadence_steps(steps: &[Step]) -> Result<(), ValidationError> {
    validate_steps(steps)?;

    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if !seen.insert(step.id()) {
            return Err(ValidationError::DuplicateStepId {
                step_id: step.id().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_email_wire_format() {
        let step = Step::send_email("s1", "Welcome", "Hello there");
        let value = serde_json::to_value(&step).unwrap();

        assert_eq!(
            value,
            json!({"type": "SEND_EMAIL", "id": "s1", "subject": "Welcome", "body": "Hello there"})
        );
    }

    #[test]
    fn test_wait_wire_format() {
        let step: Step = serde_json::from_value(json!({"type": "WAIT", "id": "w1", "seconds": 10}))
            .unwrap();

        assert_eq!(step, Step::wait("w1", 10));
        assert_eq!(step.kind(), "WAIT");
        assert_eq!(step.id(), "w1");
    }

    #[test]
    fn test_unknown_step_type_rejected() {
        let result: Result<Step, _> =
            serde_json::from_value(json!({"type": "SMS", "id": "x", "body": "hi"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_wait_rejected() {
        let steps = vec![Step::send_email("a", "s", "b"), Step::wait("w", 0)];
        let err = validate_steps(&steps).unwrap_err();

        assert_eq!(
            err,
            ValidationError::NonPositiveWait {
                step_id: "w".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_ids_only_rejected_for_cadences() {
        let steps = vec![Step::wait("x", 1), Step::wait("x", 2)];

        assert!(validate_steps(&steps).is_ok());
        assert!(matches!(
            validate_cadence_steps(&steps),
            Err(ValidationError::DuplicateStepId { .. })
        ));
    }

    #[test]
    fn test_empty_step_list_is_valid() {
        assert!(validate_steps(&[]).is_ok());
        assert!(validate_cadence_steps(&[]).is_ok());
    }
}
