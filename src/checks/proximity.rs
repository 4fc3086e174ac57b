use super::types::{ProximityResult, TestKind, TestResult};
use super::{CheckProgress, CheckTimer, DiagnosticCheck, ScheduledTimer, SurfaceInput};

/// Waits for the proximity sensor to report `near` within a fixed window.
///
/// A window that elapses without activation is a normal failing result.
pub struct ProximityCheck {
    window_ms: u64,
    started_ms: Option<u64>,
    readings: u32,
}

impl ProximityCheck {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            started_ms: None,
            readings: 0,
        }
    }

    fn result(&self, activation_time_ms: Option<u64>) -> TestResult {
        TestResult::ProximitySensor(ProximityResult {
            sensor_activated: activation_time_ms.is_some(),
            activation_time_ms,
            reading_count: self.readings,
            test_duration_ms: activation_time_ms.unwrap_or(self.window_ms),
        })
    }
}

impl DiagnosticCheck for ProximityCheck {
    fn kind(&self) -> TestKind {
        TestKind::ProximitySensor
    }

    fn begin(&mut self, now_ms: u64) -> CheckProgress {
        self.started_ms = Some(now_ms);
        self.readings = 0;
        CheckProgress::Schedule(vec![ScheduledTimer::after_ms(
            CheckTimer::ProximityWindowElapsed,
            self.window_ms,
        )])
    }

    fn handle_input(&mut self, input: &SurfaceInput, now_ms: u64, _latency_ms: f64) -> CheckProgress {
        let (SurfaceInput::Proximity { near, .. }, Some(started)) = (input, self.started_ms) else {
            log::debug!("proximity check ignoring {:?}", input);
            return CheckProgress::Pending;
        };

        self.readings += 1;
        if *near {
            let elapsed = now_ms.saturating_sub(started);
            log::info!("proximity sensor activated after {}ms", elapsed);
            CheckProgress::Finished(self.result(Some(elapsed)))
        } else {
            CheckProgress::Pending
        }
    }

    fn handle_timer(&mut self, timer: CheckTimer, _now_ms: u64) -> CheckProgress {
        match timer {
            CheckTimer::ProximityWindowElapsed if self.started_ms.is_some() => {
                log::warn!(
                    "proximity sensor never activated within {}ms",
                    self.window_ms
                );
                CheckProgress::Finished(self.result(None))
            }
            _ => CheckProgress::Pending,
        }
    }
}
