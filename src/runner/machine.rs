//! Suite state machine
//!
//! [`reduce`] is a pure function from the current [`SuiteState`] and an
//! [`Action`] to the next state plus the [`Effect`]s the executor has to carry
//! out. It never touches timers, the bus or the clock, so every transition can
//! be replayed and tested without a runtime.
//!
//! Actions coming from the operator (start, pause, skip, ...) are validated and
//! rejected with a [`TransitionError`] when they do not apply. Actions coming
//! from asynchronous sources (settle timers, confirmations) are silently
//! ignored when they are stale.

use super::state::{StepStatus, StepToken, SuitePhase, SuiteState};
use crate::checks::{TestKind, TestResult};
use crate::parser::SuiteDefinition;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start,
    /// The active step's test produced its result
    StepCompleted(TestResult),
    /// The active step's test could not run
    StepFailed { reason: String },
    /// A confirmation message for `key` arrived on the bus
    ConfirmationReceived { key: TestKind },
    ManualContinue,
    /// The settle delay scheduled for `token` elapsed
    AdvanceElapsed { token: StepToken },
    Pause,
    Resume,
    Skip,
    Retry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start the test for the step identified by `token`
    ActivateStep { token: StepToken },
    /// Drop the running test and its timers
    StopCheck,
    /// Arm the settle timer that advances past `token`
    ScheduleAdvance { token: StepToken },
    CancelAdvance,
    /// Subscribe for the robot's acknowledgment of `key`
    AwaitConfirmation { token: StepToken, key: TestKind },
    CancelConfirmation,
    /// Resolve the outstanding wait on the operator's behalf
    ResolveConfirmation,
    /// A result was stored under `kind`
    ResultRecorded { kind: TestKind },
    /// The suite reached its terminal step
    PublishReport,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransitionError {
    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: &'static str,
    },
    #[error("step {step} cannot be skipped")]
    NotSkippable { step: String },
    #[error("step {step} has already finished")]
    StepAlreadyFinished { step: String },
    #[error("a {got} result does not belong to step {step}")]
    ResultMismatch { step: String, got: TestKind },
}

fn invalid(action: &'static str, state: &SuiteState) -> TransitionError {
    TransitionError::InvalidPhase {
        action,
        phase: state.phase.label(),
    }
}

fn require_running(state: &SuiteState, action: &'static str) -> Result<(), TransitionError> {
    if state.phase == SuitePhase::Running {
        Ok(())
    } else {
        Err(invalid(action, state))
    }
}

/// Compute the next state for `action`
pub fn reduce(
    suite: &SuiteDefinition,
    state: &SuiteState,
    action: Action,
) -> Result<(SuiteState, Vec<Effect>), TransitionError> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match action {
        Action::Start => {
            if state.phase != SuitePhase::NotStarted {
                return Err(invalid("start", state));
            }
            next.phase = SuitePhase::Running;
            next.step_index = 0;
            activate_current(suite, &mut next, &mut effects);
        }

        Action::StepCompleted(result) => {
            require_running(state, "complete a step")?;
            let step = current_step(suite, state);
            if state.status_of(&step.id).is_terminal() {
                return Err(TransitionError::StepAlreadyFinished {
                    step: step.id.clone(),
                });
            }
            let kind = result.kind();
            if step.kind != Some(kind) {
                return Err(TransitionError::ResultMismatch {
                    step: step.id.clone(),
                    got: kind,
                });
            }

            next.results.insert(result);
            next.set_status(&step.id, StepStatus::Completed);
            effects.push(Effect::StopCheck);
            effects.push(Effect::ResultRecorded { kind });

            if step.requires_confirmation {
                next.phase = SuitePhase::AwaitingConfirmation { wait_key: kind };
                effects.push(Effect::AwaitConfirmation {
                    token: next.token(),
                    key: kind,
                });
            } else {
                effects.push(Effect::ScheduleAdvance {
                    token: next.token(),
                });
            }
        }

        Action::StepFailed { reason } => {
            require_running(state, "fail a step")?;
            let step = current_step(suite, state);
            if state.status_of(&step.id).is_terminal() {
                return Err(TransitionError::StepAlreadyFinished {
                    step: step.id.clone(),
                });
            }
            log::warn!("step {} failed: {}", step.id, reason);
            next.set_status(&step.id, StepStatus::Error);
            effects.push(Effect::StopCheck);
            advance(suite, &mut next, &mut effects);
        }

        Action::ConfirmationReceived { key } => match &state.phase {
            SuitePhase::AwaitingConfirmation { wait_key } if *wait_key == key => {
                next.phase = SuitePhase::Running;
                effects.push(Effect::CancelConfirmation);
                advance(suite, &mut next, &mut effects);
            }
            _ => {
                log::debug!(
                    "ignoring confirmation for {} while {}",
                    key,
                    state.phase.label()
                );
            }
        },

        Action::ManualContinue => {
            if !matches!(state.phase, SuitePhase::AwaitingConfirmation { .. }) {
                return Err(invalid("continue", state));
            }
            next.phase = SuitePhase::Running;
            effects.push(Effect::ResolveConfirmation);
            advance(suite, &mut next, &mut effects);
        }

        Action::AdvanceElapsed { token } => {
            if state.phase == SuitePhase::Running
                && token == state.token()
                && state.current_status(suite).is_terminal()
            {
                advance(suite, &mut next, &mut effects);
            } else {
                log::debug!("dropping stale settle timer for step {}", token.step_index);
            }
        }

        Action::Pause => {
            require_running(state, "pause")?;
            next.phase = SuitePhase::Paused;
            effects.push(Effect::StopCheck);
            effects.push(Effect::CancelAdvance);
        }

        Action::Resume => {
            if state.phase != SuitePhase::Paused {
                return Err(invalid("resume", state));
            }
            next.phase = SuitePhase::Running;
            if state.current_status(suite).is_terminal() {
                // Finished before the pause; only the settle delay was pending
                advance(suite, &mut next, &mut effects);
            } else {
                // The interrupted test restarts from a clean slate
                activate_current(suite, &mut next, &mut effects);
            }
        }

        Action::Skip => {
            require_running(state, "skip")?;
            let step = current_step(suite, state);
            if state.step_index == 0 || state.step_index >= suite.last_index() {
                return Err(TransitionError::NotSkippable {
                    step: step.id.clone(),
                });
            }
            effects.push(Effect::StopCheck);
            if !state.status_of(&step.id).is_terminal() {
                next.set_status(&step.id, StepStatus::Completed);
            }
            advance(suite, &mut next, &mut effects);
        }

        Action::Retry => {
            next = SuiteState {
                phase: SuitePhase::Running,
                step_index: 0,
                generation: state.generation + 1,
                activation: state.activation,
                ..SuiteState::default()
            };
            effects.push(Effect::CancelConfirmation);
            effects.push(Effect::StopCheck);
            effects.push(Effect::CancelAdvance);
            activate_current(suite, &mut next, &mut effects);
        }
    }

    Ok((next, effects))
}

fn current_step<'a>(
    suite: &'a SuiteDefinition,
    state: &SuiteState,
) -> &'a crate::parser::TestStepDescriptor {
    // step_index is kept within bounds by every transition
    &suite.steps()[state.step_index.min(suite.last_index())]
}

fn activate_current(suite: &SuiteDefinition, next: &mut SuiteState, effects: &mut Vec<Effect>) {
    let id = current_step(suite, next).id.clone();
    next.set_status(&id, StepStatus::Active);
    next.activation += 1;
    effects.push(Effect::ActivateStep {
        token: next.token(),
    });
}

/// Move past the current step. Landing on the final step with at least one
/// recorded result ends the suite.
fn advance(suite: &SuiteDefinition, next: &mut SuiteState, effects: &mut Vec<Effect>) {
    effects.push(Effect::CancelAdvance);
    let last = suite.last_index();
    if next.step_index >= last {
        return;
    }

    next.step_index += 1;
    if next.step_index == last && !next.results.is_empty() {
        let id = current_step(suite, next).id.clone();
        next.set_status(&id, StepStatus::Completed);
        next.phase = SuitePhase::Terminal;
        effects.push(Effect::PublishReport);
    } else {
        activate_current(suite, next, effects);
    }
}
