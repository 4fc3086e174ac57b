use crate::checks::TestKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// One step of a suite, as written in the suite file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepDescriptor {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Test run by this step; only the final report step has none
    #[serde(default)]
    pub kind: Option<TestKind>,

    /// Wait for the robot's acknowledgment before moving on
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl TestStepDescriptor {
    pub fn new(id: &str, title: &str, kind: Option<TestKind>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            kind,
            requires_confirmation: false,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}

/// Raw suite file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteFile {
    #[serde(default)]
    pub name: Option<String>,

    pub steps: Vec<TestStepDescriptor>,
}

#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    #[error("a suite needs at least one test step and a final report step, got {0} step(s)")]
    TooFewSteps(usize),
    #[error("duplicate step id: {0}")]
    DuplicateId(String),
    #[error("test kind {0} appears in more than one step")]
    DuplicateKind(TestKind),
    #[error("step {0} has no test kind; only the final step may omit it")]
    MissingKind(String),
    #[error("final step {0} must be the report step and cannot run a test")]
    FinalStepHasKind(String),
    #[error("step {0} requires confirmation but runs no test")]
    ConfirmationWithoutKind(String),
}

/// Validated, immutable ordered list of steps
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteDefinition {
    name: String,
    steps: Vec<TestStepDescriptor>,
}

impl SuiteDefinition {
    pub fn new(name: &str, steps: Vec<TestStepDescriptor>) -> Result<Self, DefinitionError> {
        if steps.len() < 2 {
            return Err(DefinitionError::TooFewSteps(steps.len()));
        }

        let mut ids = HashSet::new();
        let mut kinds = HashSet::new();
        let last = steps.len() - 1;
        for (i, step) in steps.iter().enumerate() {
            if !ids.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateId(step.id.clone()));
            }
            match step.kind {
                Some(_) if i == last => {
                    return Err(DefinitionError::FinalStepHasKind(step.id.clone()));
                }
                Some(kind) => {
                    if !kinds.insert(kind) {
                        return Err(DefinitionError::DuplicateKind(kind));
                    }
                }
                None if i != last => return Err(DefinitionError::MissingKind(step.id.clone())),
                None if step.requires_confirmation => {
                    return Err(DefinitionError::ConfirmationWithoutKind(step.id.clone()))
                }
                None => {}
            }
        }

        Ok(Self {
            name: name.to_string(),
            steps,
        })
    }

    /// Touchscreen, display and proximity tests followed by the report
    pub fn builtin() -> Self {
        let steps = vec![
            TestStepDescriptor::new("touchscreen", "Touchscreen", Some(TestKind::Touchscreen))
                .with_description("Multi-touch window, then trace the square and the second shape")
                .confirmed(),
            TestStepDescriptor::new("display", "Display defects", Some(TestKind::DisplayDefect))
                .with_description("Full-screen color phases; report any dead pixels or banding"),
            TestStepDescriptor::new("proximity", "Proximity sensor", Some(TestKind::ProximitySensor))
                .with_description("Cover the sensor within the window"),
            TestStepDescriptor::new("report", "Report", None)
                .with_description("Summary of all executed tests"),
        ];
        Self {
            name: "Touch device diagnostics".to_string(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[TestStepDescriptor] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&TestStepDescriptor> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the final (report) step
    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    /// Step that runs the given test kind
    pub fn step_for(&self, kind: TestKind) -> Option<&TestStepDescriptor> {
        self.steps.iter().find(|s| s.kind == Some(kind))
    }
}
