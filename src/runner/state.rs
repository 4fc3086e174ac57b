use crate::checks::{SuiteResult, TestKind};
use crate::parser::SuiteDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-step execution status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }
}

/// Where the suite is in its lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SuitePhase {
    #[default]
    NotStarted,
    Running,
    Paused,
    #[serde(rename_all = "camelCase")]
    AwaitingConfirmation { wait_key: TestKind },
    Terminal,
}

impl SuitePhase {
    pub fn label(&self) -> &'static str {
        match self {
            SuitePhase::NotStarted => "not started",
            SuitePhase::Running => "running",
            SuitePhase::Paused => "paused",
            SuitePhase::AwaitingConfirmation { .. } => "awaiting confirmation",
            SuitePhase::Terminal => "finished",
        }
    }
}

/// Identity of one activation of one step.
///
/// Every timer, confirmation wait and check captures the token it was
/// created for; anything arriving with a different token is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToken {
    /// Bumped on every retry
    pub generation: u64,
    pub step_index: usize,
    /// Bumped every time a step's test is (re)started, including on resume
    pub activation: u64,
}

/// Complete orchestrator state; replaced wholesale by every transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteState {
    pub phase: SuitePhase,
    pub step_index: usize,
    pub generation: u64,
    pub activation: u64,
    pub statuses: HashMap<String, StepStatus>,
    pub results: SuiteResult,
}

impl SuiteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> StepToken {
        StepToken {
            generation: self.generation,
            step_index: self.step_index,
            activation: self.activation,
        }
    }

    /// Status of a step; steps never touched are pending
    pub fn status_of(&self, step_id: &str) -> StepStatus {
        self.statuses.get(step_id).copied().unwrap_or_default()
    }

    pub fn set_status(&mut self, step_id: &str, status: StepStatus) {
        self.statuses.insert(step_id.to_string(), status);
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == SuitePhase::Terminal
    }

    /// Status of the step the suite is currently on
    pub fn current_status(&self, suite: &SuiteDefinition) -> StepStatus {
        suite
            .step(self.step_index)
            .map(|step| self.status_of(&step.id))
            .unwrap_or_default()
    }

    /// Count of steps per status, in suite order
    pub fn summary(&self, suite: &SuiteDefinition) -> StepSummary {
        suite
            .steps()
            .iter()
            .fold(StepSummary::default(), |mut acc, step| {
                match self.status_of(&step.id) {
                    StepStatus::Pending => acc.pending += 1,
                    StepStatus::Active => acc.active += 1,
                    StepStatus::Completed => acc.completed += 1,
                    StepStatus::Error => acc.error += 1,
                }
                acc
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub pending: u32,
    pub active: u32,
    pub completed: u32,
    pub error: u32,
}

/// State as published to rendering collaborators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSnapshot {
    pub session_id: Option<String>,
    pub state: SuiteState,
    pub overall_score: Option<u8>,
    /// Outcome of the most recent report publish, if any
    pub last_publish_ok: Option<bool>,
}
