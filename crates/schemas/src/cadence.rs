// Cadence domain types
//
// A cadence is a named, ordered list of steps. Enrolling a contact copies
// the steps into the workflow input, so later edits to the cadence do not
// reach running enrollments.

use serde::{Deserialize, Serialize};

use crate::step::Step;

/// A named sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub id: String,
    pub name: String,
    pub steps: Vec<Step>,
}

/// Request to create a cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCadenceRequest {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Request to edit a cadence; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCadenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
}
