pub mod publisher;
pub mod types;

use crate::checks::{SuiteResult, TestResult};
use chrono::{DateTime, Utc};
use types::{DiagnosticArray, DiagnosticStatus, Header, KeyValue};

pub use publisher::ReportPublisher;

/// Identity stamped on every outbound status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportContext {
    pub name: String,
    pub hardware_id: String,
    pub frame_id: String,
}

/// 0-100 score of one test category. Pass/fail tests contribute 100 or 0.
pub fn category_score(result: &TestResult) -> u8 {
    match result {
        TestResult::Touchscreen(touch) => touch.overall_score(),
        TestResult::DisplayDefect(display) => pass_score(display.passed()),
        TestResult::ProximitySensor(proximity) => pass_score(proximity.passed()),
    }
}

fn pass_score(passed: bool) -> u8 {
    if passed {
        100
    } else {
        0
    }
}

/// Unweighted mean of the category scores; `None` when nothing ran
pub fn composite_score(results: &SuiteResult) -> Option<u8> {
    if results.is_empty() {
        return None;
    }
    let sum: f64 = results.iter().map(|r| category_score(r) as f64).sum();
    Some((sum / results.len() as f64).round() as u8)
}

fn fixed(value: f64) -> String {
    format!("{:.2}", value)
}

/// Flatten the numeric and boolean fields of one result into key/value
/// pairs prefixed with the test key
pub fn result_metrics(result: &TestResult) -> Vec<KeyValue> {
    let prefix = result.kind().key();
    let kv = |field: &str, value: String| KeyValue::new(format!("{}.{}", prefix, field), value);

    match result {
        TestResult::Touchscreen(touch) => {
            let basic = &touch.basic_touch;
            let mut values = vec![
                kv("overallScore", touch.overall_score().to_string()),
                kv(
                    "basicTouch.multiTouchSupported",
                    basic.multi_touch_supported.to_string(),
                ),
                kv(
                    "basicTouch.maxSimultaneousTouches",
                    basic.max_simultaneous_touches.to_string(),
                ),
                kv(
                    "basicTouch.averageResponseTimeMs",
                    fixed(basic.average_response_time_ms),
                ),
                kv("basicTouch.totalTouches", basic.total_touches.to_string()),
                kv("basicTouch.testDurationMs", basic.test_duration_ms.to_string()),
            ];
            for (name, shape) in [
                ("squareTracing", &touch.square_tracing),
                ("secondShapeTracing", &touch.second_shape_tracing),
            ] {
                values.push(kv(&format!("{}.accuracy", name), shape.accuracy.to_string()));
                values.push(kv(
                    &format!("{}.completionTimeMs", name),
                    shape.completion_time_ms.to_string(),
                ));
                values.push(kv(
                    &format!("{}.totalDistance", name),
                    fixed(shape.total_distance),
                ));
                values.push(kv(
                    &format!("{}.deviationScore", name),
                    shape.deviation_score.to_string(),
                ));
                values.push(kv(
                    &format!("{}.tracePointCount", name),
                    shape.trace_points.len().to_string(),
                ));
            }
            values
        }
        TestResult::DisplayDefect(display) => vec![
            kv("defectsFound", display.defects_found.to_string()),
            kv("colorsShown", display.colors_shown.len().to_string()),
            kv("phaseDurationMs", display.phase_duration_ms.to_string()),
        ],
        TestResult::ProximitySensor(proximity) => {
            let mut values = vec![
                kv("sensorActivated", proximity.sensor_activated.to_string()),
                kv("readingCount", proximity.reading_count.to_string()),
                kv("testDurationMs", proximity.test_duration_ms.to_string()),
            ];
            if let Some(activation) = proximity.activation_time_ms {
                values.push(kv("activationTimeMs", activation.to_string()));
            }
            values
        }
    }
}

fn test_message(result: &TestResult) -> String {
    let verdict = match result {
        TestResult::Touchscreen(touch) => format!(
            "square {}%, {} {}%",
            touch.square_tracing.accuracy,
            touch.second_shape_tracing.shape.name(),
            touch.second_shape_tracing.accuracy
        ),
        TestResult::DisplayDefect(display) if display.passed() => "no defects".to_string(),
        TestResult::DisplayDefect(_) => "defects reported".to_string(),
        TestResult::ProximitySensor(proximity) if proximity.passed() => {
            "sensor activated".to_string()
        }
        TestResult::ProximitySensor(_) => "sensor never activated".to_string(),
    };
    format!("{}: score {} ({})", result.kind(), category_score(result), verdict)
}

/// One status summarizing every executed test
pub fn build_suite_report(
    results: &SuiteResult,
    context: &ReportContext,
    time: DateTime<Utc>,
) -> DiagnosticArray {
    let header = Header::new(time, &context.frame_id);
    let overall = composite_score(results);

    let mut values = vec![KeyValue::new("testsCompleted", results.len())];
    if let Some(score) = overall {
        values.push(KeyValue::new("overallScore", score));
    }
    for result in results.iter() {
        values.extend(result_metrics(result));
    }

    let message = match overall {
        Some(score) => {
            let parts: Vec<String> = results.iter().map(test_message).collect();
            format!(
                "{} test(s) completed, overall score {}; {}",
                results.len(),
                score,
                parts.join("; ")
            )
        }
        None => "no tests completed".to_string(),
    };

    DiagnosticArray {
        header: header.clone(),
        status: vec![DiagnosticStatus {
            header,
            name: context.name.clone(),
            message,
            hardware_id: context.hardware_id.clone(),
            values,
        }],
    }
}

/// Status for a single freshly recorded test
pub fn build_test_report(
    result: &TestResult,
    context: &ReportContext,
    time: DateTime<Utc>,
) -> DiagnosticArray {
    let header = Header::new(time, &context.frame_id);
    DiagnosticArray {
        header: header.clone(),
        status: vec![DiagnosticStatus {
            header,
            name: format!("{}/{}", context.name, result.kind()),
            message: test_message(result),
            hardware_id: context.hardware_id.clone(),
            values: result_metrics(result),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::types::fixtures;
    use chrono::TimeZone;

    fn context() -> ReportContext {
        ReportContext {
            name: "bench".into(),
            hardware_id: "dut-7".into(),
            frame_id: "base".into(),
        }
    }

    fn results(items: Vec<TestResult>) -> SuiteResult {
        let mut results = SuiteResult::new();
        for item in items {
            results.insert(item);
        }
        results
    }

    #[test]
    fn test_category_scores() {
        assert_eq!(category_score(&fixtures::touchscreen(90, 71)), 81);
        assert_eq!(category_score(&fixtures::display(false)), 100);
        assert_eq!(category_score(&fixtures::display(true)), 0);
        assert_eq!(category_score(&fixtures::proximity(true)), 100);
        assert_eq!(category_score(&fixtures::proximity(false)), 0);
    }

    #[test]
    fn test_composite_is_mean_of_present_categories() {
        assert_eq!(composite_score(&SuiteResult::new()), None);
        let all = results(vec![
            fixtures::touchscreen(80, 70),
            fixtures::display(false),
            fixtures::proximity(false),
        ]);
        // (75 + 100 + 0) / 3
        assert_eq!(composite_score(&all), Some(58));

        let skipped = results(vec![fixtures::touchscreen(80, 70), fixtures::display(false)]);
        assert_eq!(composite_score(&skipped), Some(88));
    }

    #[test]
    fn test_metrics_are_prefixed_and_stringified() {
        let metrics = result_metrics(&fixtures::proximity(true));
        let get = |key: &str| {
            metrics
                .iter()
                .find(|kv| kv.key == key)
                .map(|kv| kv.value.clone())
        };
        assert_eq!(get("proximitySensor.sensorActivated").as_deref(), Some("true"));
        assert_eq!(get("proximitySensor.activationTimeMs").as_deref(), Some("1200"));

        let metrics = result_metrics(&fixtures::proximity(false));
        assert!(!metrics.iter().any(|kv| kv.key.ends_with("activationTimeMs")));

        let touch = result_metrics(&fixtures::touchscreen(90, 71));
        assert!(touch
            .iter()
            .any(|kv| kv.key == "touchscreen.secondShapeTracing.accuracy" && kv.value == "71"));
        assert!(touch
            .iter()
            .any(|kv| kv.key == "touchscreen.basicTouch.averageResponseTimeMs" && kv.value == "1.25"));
    }

    #[test]
    fn test_suite_report_envelope() {
        let time = Utc.timestamp_opt(1_700_000_000, 500).unwrap();
        let report = build_suite_report(
            &results(vec![fixtures::display(true), fixtures::proximity(true)]),
            &context(),
            time,
        );
        assert_eq!(report.header.stamp.sec, 1_700_000_000);
        assert_eq!(report.header.stamp.nanosec, 500);
        assert_eq!(report.status.len(), 1);

        let status = &report.status[0];
        assert_eq!(status.hardware_id, "dut-7");
        assert_eq!(status.header.frame_id, "base");
        assert_eq!(status.value("overallScore"), Some("50"));
        assert_eq!(status.value("testsCompleted"), Some("2"));
        assert_eq!(status.value("displayDefect.defectsFound"), Some("true"));
        assert!(status.message.contains("overall score 50"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"][0]["values"][0]["key"], "testsCompleted");
        assert_eq!(json["header"]["stamp"]["nanosec"], 500);
    }

    #[test]
    fn test_single_test_report() {
        let report = build_test_report(&fixtures::touchscreen(90, 71), &context(), Utc::now());
        let status = &report.status[0];
        assert_eq!(status.name, "bench/touchscreen");
        assert_eq!(status.value("touchscreen.overallScore"), Some("81"));
        assert!(status.message.starts_with("touchscreen: score 81"));
    }
}
