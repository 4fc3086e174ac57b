pub mod display;
pub mod proximity;
pub mod touchscreen;
pub mod types;

use crate::utils::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use display::DisplayCheck;
pub use proximity::ProximityCheck;
pub use touchscreen::TouchscreenCheck;
pub use types::*;

/// Input forwarded from the capture surface or the operator UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceInput {
    #[serde(rename_all = "camelCase")]
    TouchBegin {
        id: u32,
        x: f64,
        y: f64,
        timestamp_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    TouchEnd { id: u32, timestamp_ms: u64 },
    /// Close the basic touch window before it elapses
    FinishTouchWindow,
    #[serde(rename_all = "camelCase")]
    TracePoint { x: f64, y: f64, timestamp_ms: u64 },
    /// The operator/robot finished tracing the current shape
    FinishShape,
    #[serde(rename_all = "camelCase")]
    DisplayVerdict {
        defects_found: bool,
        #[serde(default)]
        notes: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Proximity {
        near: bool,
        #[serde(default)]
        distance_cm: Option<f64>,
        timestamp_ms: u64,
    },
}

/// Timers a check can ask the executor to schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTimer {
    TouchWindowElapsed,
    DisplayPhaseElapsed(usize),
    ProximityWindowElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub timer: CheckTimer,
    pub after: Duration,
}

impl ScheduledTimer {
    pub fn after_ms(timer: CheckTimer, ms: u64) -> Self {
        Self {
            timer,
            after: Duration::from_millis(ms),
        }
    }
}

/// What the executor should do after feeding a check
#[derive(Debug, Clone, PartialEq)]
pub enum CheckProgress {
    /// Keep waiting for input
    Pending,
    /// Keep waiting and arm these timers
    Schedule(Vec<ScheduledTimer>),
    /// The test is over
    Finished(TestResult),
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("{kind} window must be longer than zero")]
    ZeroWindow { kind: TestKind },
    #[error("shape size must be positive, got {0}")]
    InvalidShapeSize(f64),
    #[error("display check needs at least one color")]
    NoDisplayColors,
}

/// A running test session for one step.
///
/// Checks are synchronous state machines; the executor owns time and calls
/// them with the current session clock in milliseconds.
pub trait DiagnosticCheck: Send {
    fn kind(&self) -> TestKind;

    /// Start the session
    fn begin(&mut self, now_ms: u64) -> CheckProgress;

    /// Feed one surface input. `latency_ms` is how long the input waited
    /// between arriving at the orchestrator and reaching the check.
    fn handle_input(&mut self, input: &SurfaceInput, now_ms: u64, latency_ms: f64) -> CheckProgress;

    /// A previously scheduled timer fired
    fn handle_timer(&mut self, timer: CheckTimer, now_ms: u64) -> CheckProgress;
}

/// Build the check for `kind` from the runtime configuration
pub fn build(kind: TestKind, config: &Config) -> Result<Box<dyn DiagnosticCheck>, CheckError> {
    match kind {
        TestKind::Touchscreen => {
            if config.touch_window_ms == 0 {
                return Err(CheckError::ZeroWindow { kind });
            }
            if !(config.shape_size > 0.0) {
                return Err(CheckError::InvalidShapeSize(config.shape_size));
            }
            Ok(Box::new(TouchscreenCheck::new(config.touchscreen_settings())))
        }
        TestKind::DisplayDefect => {
            if config.display_colors.is_empty() {
                return Err(CheckError::NoDisplayColors);
            }
            Ok(Box::new(DisplayCheck::new(
                config.display_colors.clone(),
                config.display_phase_ms,
            )))
        }
        TestKind::ProximitySensor => {
            if config.proximity_window_ms == 0 {
                return Err(CheckError::ZeroWindow { kind });
            }
            Ok(Box::new(ProximityCheck::new(config.proximity_window_ms)))
        }
    }
}
