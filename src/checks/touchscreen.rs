//! Touchscreen check: a basic multi-touch window followed by two traced shapes.

use super::types::{CompositeTouchResult, ShapeTracingResult, TestKind, TestResult, TouchTestResult};
use super::{CheckProgress, CheckTimer, DiagnosticCheck, ScheduledTimer, SurfaceInput};
use crate::scoring::{score_with, Point, ScoringThresholds, Shape, TouchAggregator, TracePoint};

#[derive(Debug, Clone, PartialEq)]
pub struct TouchscreenSettings {
    pub window_ms: u64,
    pub center: Point,
    pub shape_size: f64,
    pub second_shape: Shape,
    pub thresholds: ScoringThresholds,
}

/// Points recorded while one shape canvas is active
#[derive(Debug, Clone)]
struct ShapeTrace {
    shape: Shape,
    started_ms: u64,
    points: Vec<TracePoint>,
}

impl ShapeTrace {
    fn new(shape: Shape, started_ms: u64) -> Self {
        Self {
            shape,
            started_ms,
            points: Vec::new(),
        }
    }

    fn finish(self, settings: &TouchscreenSettings, now_ms: u64) -> ShapeTracingResult {
        let score = score_with(
            &self.points,
            self.shape,
            settings.center,
            settings.shape_size,
            &settings.thresholds,
        );
        ShapeTracingResult {
            shape: self.shape,
            accuracy: score.accuracy,
            completion_time_ms: now_ms.saturating_sub(self.started_ms),
            total_distance: score.total_distance,
            deviation_score: score.deviation_score(),
            trace_points: self.points,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    BasicTouch(TouchAggregator),
    Square {
        basic: TouchTestResult,
        trace: ShapeTrace,
    },
    SecondShape {
        basic: TouchTestResult,
        square: ShapeTracingResult,
        trace: ShapeTrace,
    },
    Done,
}

pub struct TouchscreenCheck {
    settings: TouchscreenSettings,
    phase: Phase,
}

impl TouchscreenCheck {
    pub fn new(settings: TouchscreenSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
        }
    }

    /// Close the basic window and open the square canvas
    fn close_window(&mut self, now_ms: u64) -> CheckProgress {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::BasicTouch(aggregator) => {
                let basic = aggregator.finalize();
                log::info!(
                    "basic touch done: {} touches, max {} simultaneous",
                    basic.total_touches,
                    basic.max_simultaneous_touches
                );
                self.phase = Phase::Square {
                    basic,
                    trace: ShapeTrace::new(Shape::Square, now_ms),
                };
            }
            other => self.phase = other,
        }
        CheckProgress::Pending
    }

    fn finish_shape(&mut self, now_ms: u64) -> CheckProgress {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Square { basic, trace } => {
                let square = trace.finish(&self.settings, now_ms);
                log::info!("square trace accuracy {}", square.accuracy);
                self.phase = Phase::SecondShape {
                    basic,
                    square,
                    trace: ShapeTrace::new(self.settings.second_shape, now_ms),
                };
                CheckProgress::Pending
            }
            Phase::SecondShape {
                basic,
                square,
                trace,
            } => {
                let second = trace.finish(&self.settings, now_ms);
                log::info!("{} trace accuracy {}", second.shape.name(), second.accuracy);
                CheckProgress::Finished(TestResult::Touchscreen(CompositeTouchResult {
                    basic_touch: basic,
                    square_tracing: square,
                    second_shape_tracing: second,
                }))
            }
            other => {
                log::debug!("finishShape outside a shape canvas ignored");
                self.phase = other;
                CheckProgress::Pending
            }
        }
    }
}

impl DiagnosticCheck for TouchscreenCheck {
    fn kind(&self) -> TestKind {
        TestKind::Touchscreen
    }

    fn begin(&mut self, _now_ms: u64) -> CheckProgress {
        self.phase = Phase::BasicTouch(TouchAggregator::new(self.settings.window_ms));
        CheckProgress::Schedule(vec![ScheduledTimer::after_ms(
            CheckTimer::TouchWindowElapsed,
            self.settings.window_ms,
        )])
    }

    fn handle_input(&mut self, input: &SurfaceInput, now_ms: u64, latency_ms: f64) -> CheckProgress {
        match input {
            SurfaceInput::FinishTouchWindow if matches!(self.phase, Phase::BasicTouch(_)) => {
                return self.close_window(now_ms)
            }
            SurfaceInput::FinishShape => return self.finish_shape(now_ms),
            _ => {}
        }

        match (&mut self.phase, input) {
            (
                Phase::BasicTouch(aggregator),
                SurfaceInput::TouchBegin {
                    id,
                    x,
                    y,
                    timestamp_ms,
                },
            ) => {
                aggregator.touch_begin(*id, TracePoint::new(*x, *y, *timestamp_ms), latency_ms);
                CheckProgress::Pending
            }
            (Phase::BasicTouch(aggregator), SurfaceInput::TouchEnd { id, .. }) => {
                aggregator.touch_end(*id);
                CheckProgress::Pending
            }
            (
                Phase::Square { trace, .. } | Phase::SecondShape { trace, .. },
                SurfaceInput::TracePoint { x, y, timestamp_ms },
            ) => {
                trace.points.push(TracePoint::new(*x, *y, *timestamp_ms));
                CheckProgress::Pending
            }
            (_, other) => {
                log::debug!("touchscreen check ignoring {:?}", other);
                CheckProgress::Pending
            }
        }
    }

    fn handle_timer(&mut self, timer: CheckTimer, now_ms: u64) -> CheckProgress {
        if timer == CheckTimer::TouchWindowElapsed && matches!(self.phase, Phase::BasicTouch(_)) {
            self.close_window(now_ms)
        } else {
            CheckProgress::Pending
        }
    }
}
