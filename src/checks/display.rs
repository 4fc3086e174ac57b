use super::types::{DisplayResult, TestKind, TestResult};
use super::{CheckProgress, CheckTimer, DiagnosticCheck, ScheduledTimer, SurfaceInput};

/// Cycles full-screen colors for a fixed time each, then waits for the
/// defect verdict. A verdict may arrive early if a defect is spotted.
pub struct DisplayCheck {
    colors: Vec<String>,
    phase_ms: u64,
    current: usize,
    started: bool,
}

impl DisplayCheck {
    pub fn new(colors: Vec<String>, phase_ms: u64) -> Self {
        Self {
            colors,
            phase_ms,
            current: 0,
            started: false,
        }
    }

    /// Color currently on screen, `None` once every phase has been shown
    pub fn current_color(&self) -> Option<&str> {
        self.colors.get(self.current).map(String::as_str)
    }

    fn colors_shown(&self) -> Vec<String> {
        let shown = (self.current + 1).min(self.colors.len());
        self.colors[..shown].to_vec()
    }
}

impl DiagnosticCheck for DisplayCheck {
    fn kind(&self) -> TestKind {
        TestKind::DisplayDefect
    }

    fn begin(&mut self, _now_ms: u64) -> CheckProgress {
        self.current = 0;
        self.started = true;
        CheckProgress::Schedule(vec![ScheduledTimer::after_ms(
            CheckTimer::DisplayPhaseElapsed(0),
            self.phase_ms,
        )])
    }

    fn handle_input(&mut self, input: &SurfaceInput, _now_ms: u64, _latency_ms: f64) -> CheckProgress {
        match input {
            SurfaceInput::DisplayVerdict {
                defects_found,
                notes,
            } if self.started => CheckProgress::Finished(TestResult::DisplayDefect(DisplayResult {
                colors_shown: self.colors_shown(),
                defects_found: *defects_found,
                notes: notes.clone(),
                phase_duration_ms: self.phase_ms,
            })),
            other => {
                log::debug!("display check ignoring {:?}", other);
                CheckProgress::Pending
            }
        }
    }

    fn handle_timer(&mut self, timer: CheckTimer, _now_ms: u64) -> CheckProgress {
        match timer {
            CheckTimer::DisplayPhaseElapsed(phase) if phase == self.current => {
                self.current += 1;
                match self.current_color() {
                    Some(color) => {
                        log::info!("display phase {} ({})", self.current, color);
                        CheckProgress::Schedule(vec![ScheduledTimer::after_ms(
                            CheckTimer::DisplayPhaseElapsed(self.current),
                            self.phase_ms,
                        )])
                    }
                    None => {
                        log::info!("all display phases shown, awaiting verdict");
                        CheckProgress::Pending
                    }
                }
            }
            _ => CheckProgress::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Vec<String> {
        ["red", "green", "white"].iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_phases_advance_in_order() {
        let mut check = DisplayCheck::new(colors(), 2_000);
        check.begin(0);
        assert_eq!(check.current_color(), Some("red"));

        // A stale timer for a later phase does nothing
        assert_eq!(
            check.handle_timer(CheckTimer::DisplayPhaseElapsed(2), 100),
            CheckProgress::Pending
        );
        assert_eq!(check.current_color(), Some("red"));

        assert_eq!(
            check.handle_timer(CheckTimer::DisplayPhaseElapsed(0), 2_000),
            CheckProgress::Schedule(vec![ScheduledTimer::after_ms(
                CheckTimer::DisplayPhaseElapsed(1),
                2_000
            )])
        );
        check.handle_timer(CheckTimer::DisplayPhaseElapsed(1), 4_000);
        assert_eq!(
            check.handle_timer(CheckTimer::DisplayPhaseElapsed(2), 6_000),
            CheckProgress::Pending
        );
        assert_eq!(check.current_color(), None);

        let progress = check.handle_input(
            &SurfaceInput::DisplayVerdict {
                defects_found: false,
                notes: None,
            },
            7_000,
            0.0,
        );
        let CheckProgress::Finished(TestResult::DisplayDefect(result)) = progress else {
            panic!("expected display result");
        };
        assert_eq!(result.colors_shown, colors());
        assert!(result.passed());
    }

    #[test]
    fn test_early_defect_verdict() {
        let mut check = DisplayCheck::new(colors(), 2_000);
        check.begin(0);
        check.handle_timer(CheckTimer::DisplayPhaseElapsed(0), 2_000);
        let progress = check.handle_input(
            &SurfaceInput::DisplayVerdict {
                defects_found: true,
                notes: Some("dead pixel near top edge".into()),
            },
            2_500,
            0.0,
        );
        let CheckProgress::Finished(TestResult::DisplayDefect(result)) = progress else {
            panic!("expected display result");
        };
        assert_eq!(result.colors_shown, vec!["red".to_string(), "green".to_string()]);
        assert!(!result.passed());
        assert_eq!(result.notes.as_deref(), Some("dead pixel near top edge"));
    }

    #[test]
    fn test_verdict_before_begin_is_ignored() {
        let mut check = DisplayCheck::new(colors(), 2_000);
        let progress = check.handle_input(
            &SurfaceInput::DisplayVerdict {
                defects_found: false,
                notes: None,
            },
            0,
            0.0,
        );
        assert_eq!(progress, CheckProgress::Pending);
    }
}
