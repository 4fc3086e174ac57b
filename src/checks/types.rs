use crate::scoring::{Shape, TracePoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Test category; also the key a result is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestKind {
    Touchscreen,
    DisplayDefect,
    ProximitySensor,
}

impl TestKind {
    pub fn key(&self) -> &'static str {
        match self {
            TestKind::Touchscreen => "touchscreen",
            TestKind::DisplayDefect => "displayDefect",
            TestKind::ProximitySensor => "proximitySensor",
        }
    }

    /// Payload the actuating robot sends once it has acted on this test
    pub fn confirmation_payload(&self) -> String {
        format!("{}_confirmed", self.key())
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Outcome of the basic multi-touch window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchTestResult {
    pub multi_touch_supported: bool,
    pub max_simultaneous_touches: u32,
    pub average_response_time_ms: f64,
    pub total_touches: u32,
    pub test_duration_ms: u64,
    pub touch_points: Vec<TracePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeTracingResult {
    pub shape: Shape,
    pub accuracy: u8,
    pub completion_time_ms: u64,
    pub trace_points: Vec<TracePoint>,
    pub total_distance: f64,
    pub deviation_score: u32,
}

/// Touchscreen test: basic touch plus two shape traces.
///
/// The overall score is always recomputed from the two shape accuracies;
/// the basic touch metrics are reported but do not contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", into = "CompositeTouchView")]
pub struct CompositeTouchResult {
    pub basic_touch: TouchTestResult,
    pub square_tracing: ShapeTracingResult,
    pub second_shape_tracing: ShapeTracingResult,
}

impl CompositeTouchResult {
    pub fn overall_score(&self) -> u8 {
        let sum = self.square_tracing.accuracy as f64 + self.second_shape_tracing.accuracy as f64;
        (sum / 2.0).round() as u8
    }
}

/// Serialized form of [`CompositeTouchResult`] carrying the derived score
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompositeTouchView {
    basic_touch: TouchTestResult,
    square_tracing: ShapeTracingResult,
    second_shape_tracing: ShapeTracingResult,
    overall_score: u8,
}

impl From<CompositeTouchResult> for CompositeTouchView {
    fn from(result: CompositeTouchResult) -> Self {
        let overall_score = result.overall_score();
        Self {
            basic_touch: result.basic_touch,
            square_tracing: result.square_tracing,
            second_shape_tracing: result.second_shape_tracing,
            overall_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayResult {
    pub colors_shown: Vec<String>,
    pub defects_found: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub phase_duration_ms: u64,
}

impl DisplayResult {
    pub fn passed(&self) -> bool {
        !self.defects_found
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityResult {
    pub sensor_activated: bool,
    #[serde(default)]
    pub activation_time_ms: Option<u64>,
    pub reading_count: u32,
    pub test_duration_ms: u64,
}

impl ProximityResult {
    pub fn passed(&self) -> bool {
        self.sensor_activated
    }
}

/// Result of one executed test, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TestResult {
    Touchscreen(CompositeTouchResult),
    DisplayDefect(DisplayResult),
    ProximitySensor(ProximityResult),
}

impl TestResult {
    pub fn kind(&self) -> TestKind {
        match self {
            TestResult::Touchscreen(_) => TestKind::Touchscreen,
            TestResult::DisplayDefect(_) => TestKind::DisplayDefect,
            TestResult::ProximitySensor(_) => TestKind::ProximitySensor,
        }
    }
}

/// Results of the tests executed so far, keyed by kind.
///
/// Only tests that actually ran have an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteResult {
    entries: BTreeMap<TestKind, TestResult>,
}

impl SuiteResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: TestResult) {
        self.entries.insert(result.kind(), result);
    }

    pub fn get(&self, kind: TestKind) -> Option<&TestResult> {
        self.entries.get(&kind)
    }

    pub fn contains(&self, kind: TestKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestResult> {
        self.entries.values()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn shape_result(shape: Shape, accuracy: u8) -> ShapeTracingResult {
        ShapeTracingResult {
            shape,
            accuracy,
            completion_time_ms: 4_200,
            trace_points: Vec::new(),
            total_distance: 780.5,
            deviation_score: 3,
        }
    }

    pub fn basic_touch(max: u32) -> TouchTestResult {
        TouchTestResult {
            multi_touch_supported: max > 1,
            max_simultaneous_touches: max,
            average_response_time_ms: 1.25,
            total_touches: 6,
            test_duration_ms: 10_000,
            touch_points: Vec::new(),
        }
    }

    pub fn touchscreen(square: u8, second: u8) -> TestResult {
        TestResult::Touchscreen(CompositeTouchResult {
            basic_touch: basic_touch(2),
            square_tracing: shape_result(Shape::Square, square),
            second_shape_tracing: shape_result(Shape::Circle, second),
        })
    }

    pub fn display(defects_found: bool) -> TestResult {
        TestResult::DisplayDefect(DisplayResult {
            colors_shown: vec!["red".into(), "white".into()],
            defects_found,
            notes: None,
            phase_duration_ms: 2_000,
        })
    }

    pub fn proximity(activated: bool) -> TestResult {
        TestResult::ProximitySensor(ProximityResult {
            sensor_activated: activated,
            activation_time_ms: activated.then_some(1_200),
            reading_count: 3,
            test_duration_ms: 10_000,
        })
    }
}
