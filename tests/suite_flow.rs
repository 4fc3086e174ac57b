use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use touch_diag::bus::{LocalBus, MessageBus};
use touch_diag::checks::{SurfaceInput, TestKind};
use touch_diag::parser::{SuiteDefinition, TestStepDescriptor};
use touch_diag::runner::{StepStatus, SuiteEvent, SuiteExecutor, SuiteHandle, SuitePhase, SuiteSnapshot};
use touch_diag::scoring::{sample_ideal_shape, Point, Shape};
use touch_diag::utils::config::Config;

const CONFIRM_TOPIC: &str = "/test_confirmation";

fn config() -> Config {
    Config {
        settle_delay_ms: 10,
        display_phase_ms: 5,
        publish_each_test: false,
        ..Config::default()
    }
}

/// proximity (confirmed) -> display -> report
fn suite() -> SuiteDefinition {
    SuiteDefinition::new(
        "flow",
        vec![
            TestStepDescriptor::new("proximity", "Proximity", Some(TestKind::ProximitySensor)).confirmed(),
            TestStepDescriptor::new("display", "Display", Some(TestKind::DisplayDefect)),
            TestStepDescriptor::new("report", "Report", None),
        ],
    )
    .unwrap()
}

fn spawn(suite: SuiteDefinition, config: Config, bus: &LocalBus) -> SuiteHandle {
    let (executor, handle) = SuiteExecutor::new(suite, config, Arc::new(bus.clone()));
    tokio::spawn(executor.run());
    handle
}

async fn wait_for(handle: &SuiteHandle, what: impl Fn(&SuiteSnapshot) -> bool) -> SuiteSnapshot {
    let mut watch = handle.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), watch.wait_for(|s| what(s)))
        .await
        .expect("timed out waiting for suite state")
        .expect("executor stopped")
        .clone();
    snapshot
}

fn near() -> SurfaceInput {
    SurfaceInput::Proximity {
        near: true,
        distance_cm: None,
        timestamp_ms: 0,
    }
}

fn verdict(defects_found: bool) -> SurfaceInput {
    SurfaceInput::DisplayVerdict {
        defects_found,
        notes: None,
    }
}

fn confirm(bus: &LocalBus, key: TestKind) {
    bus.publish(
        CONFIRM_TOPIC,
        "std_msgs/String",
        json!({ "data": key.confirmation_payload() }),
    );
}

async fn reach_confirmation(handle: &SuiteHandle) {
    handle.start().await.unwrap();
    handle.surface(near());
    wait_for(handle, |s| {
        matches!(s.state.phase, SuitePhase::AwaitingConfirmation { .. })
    })
    .await;
}

#[tokio::test]
async fn test_confirmed_suite_publishes_report_once() {
    let bus = LocalBus::new();
    let handle = spawn(suite(), config(), &bus);
    let mut events = handle.subscribe();

    reach_confirmation(&handle).await;
    assert_eq!(bus.subscriber_count(CONFIRM_TOPIC), 1);

    // A confirmation for another test does not advance
    confirm(&bus, TestKind::Touchscreen);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.snapshot().state.step_index, 0);

    confirm(&bus, TestKind::ProximitySensor);
    let snapshot = wait_for(&handle, |s| s.state.step_index == 1).await;
    assert_eq!(snapshot.state.status_of("proximity"), StepStatus::Completed);
    assert_eq!(snapshot.state.status_of("display"), StepStatus::Active);
    assert_eq!(bus.subscriber_count(CONFIRM_TOPIC), 0);

    handle.surface(verdict(false));
    let snapshot = wait_for(&handle, |s| s.state.is_terminal()).await;
    assert_eq!(snapshot.state.results.len(), 2);
    assert_eq!(snapshot.state.status_of("report"), StepStatus::Completed);
    assert_eq!(snapshot.overall_score, Some(100));
    assert_eq!(snapshot.last_publish_ok, Some(true));

    let reports = bus.published_on("/diagnostics");
    assert_eq!(reports.len(), 1);
    let status = &reports[0].payload["status"][0];
    assert_eq!(status["name"], "flow");
    assert!(status["values"]
        .as_array()
        .unwrap()
        .iter()
        .any(|kv| kv["key"] == "overallScore" && kv["value"] == "100"));

    let mut finished = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SuiteEvent::SuiteFinished { .. }) {
            finished += 1;
        }
    }
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn test_retry_while_awaiting_drops_late_confirmation() {
    let bus = LocalBus::new();
    let handle = spawn(suite(), config(), &bus);

    reach_confirmation(&handle).await;
    handle.retry().await.unwrap();
    assert_eq!(bus.subscriber_count(CONFIRM_TOPIC), 0);

    confirm(&bus, TestKind::ProximitySensor);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state.phase, SuitePhase::Running);
    assert_eq!(snapshot.state.step_index, 0);
    assert_eq!(snapshot.state.generation, 1);
    assert!(snapshot.state.results.is_empty());

    // The fresh run works normally
    handle.surface(near());
    wait_for(&handle, |s| {
        matches!(s.state.phase, SuitePhase::AwaitingConfirmation { .. })
    })
    .await;
}

#[tokio::test]
async fn test_manual_continue_without_robot() {
    let bus = LocalBus::new();
    let handle = spawn(suite(), config(), &bus);

    reach_confirmation(&handle).await;
    handle.manual_continue().await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state.step_index, 1);
    assert_eq!(snapshot.state.phase, SuitePhase::Running);

    // The robot's late acknowledgment changes nothing
    confirm(&bus, TestKind::ProximitySensor);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.snapshot().state, snapshot.state);
    assert!(handle.manual_continue().await.is_err());
}

#[tokio::test]
async fn test_failed_publish_can_be_republished() {
    let bus = LocalBus::new();
    let handle = spawn(suite(), config(), &bus);

    reach_confirmation(&handle).await;
    handle.manual_continue().await.unwrap();

    bus.set_connected(false);
    handle.surface(verdict(true));
    let snapshot = wait_for(&handle, |s| s.state.is_terminal()).await;
    assert_eq!(snapshot.last_publish_ok, Some(false));
    assert_eq!(snapshot.overall_score, Some(50));

    bus.set_connected(true);
    assert!(handle.republish().await.unwrap());
    assert_eq!(handle.snapshot().last_publish_ok, Some(true));
    assert_eq!(bus.published_on("/diagnostics").len(), 1);
}

#[tokio::test]
async fn test_pause_discards_partial_run() {
    let bus = LocalBus::new();
    let suite = SuiteDefinition::new(
        "pause",
        vec![
            TestStepDescriptor::new("display", "Display", Some(TestKind::DisplayDefect)),
            TestStepDescriptor::new("report", "Report", None),
        ],
    )
    .unwrap();
    let handle = spawn(suite, config(), &bus);

    handle.start().await.unwrap();
    handle.pause().await.unwrap();
    // Input while paused reaches no check
    handle.surface(verdict(false));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handle.snapshot().state.results.is_empty());

    handle.resume().await.unwrap();
    handle.surface(verdict(false));
    let snapshot = wait_for(&handle, |s| s.state.is_terminal()).await;
    assert_eq!(snapshot.state.results.len(), 1);
}

#[tokio::test]
async fn test_touchscreen_session_over_surface_input() {
    let bus = LocalBus::new();
    let config = Config {
        publish_each_test: true,
        ..config()
    };
    let suite = SuiteDefinition::new(
        "touch",
        vec![
            TestStepDescriptor::new("touch", "Touchscreen", Some(TestKind::Touchscreen)),
            TestStepDescriptor::new("report", "Report", None),
        ],
    )
    .unwrap();
    let handle = spawn(suite, config.clone(), &bus);
    handle.start().await.unwrap();

    // Two simultaneous contacts
    for (id, x) in [(1, 100.0), (2, 300.0)] {
        handle.surface(SurfaceInput::TouchBegin {
            id,
            x,
            y: 200.0,
            timestamp_ms: 0,
        });
    }
    for id in [1, 2] {
        handle.surface(SurfaceInput::TouchEnd {
            id,
            timestamp_ms: 500,
        });
    }
    handle.surface(SurfaceInput::FinishTouchWindow);

    let center = Point::new(200.0, 200.0);
    for shape in [Shape::Square, Shape::Circle] {
        for (i, p) in sample_ideal_shape(shape, center, 200.0, 100).into_iter().enumerate() {
            handle.surface(SurfaceInput::TracePoint {
                x: p.x,
                y: p.y,
                timestamp_ms: i as u64 * 16,
            });
        }
        handle.surface(SurfaceInput::FinishShape);
    }

    let snapshot = wait_for(&handle, |s| s.state.is_terminal()).await;
    let Some(touch_diag::checks::TestResult::Touchscreen(result)) =
        snapshot.state.results.get(TestKind::Touchscreen)
    else {
        panic!("expected touchscreen result");
    };
    assert_eq!(result.basic_touch.total_touches, 2);
    assert_eq!(result.basic_touch.max_simultaneous_touches, 2);
    assert!(result.basic_touch.multi_touch_supported);
    assert_eq!(result.square_tracing.accuracy, 100);
    assert_eq!(result.second_shape_tracing.accuracy, 100);
    assert_eq!(result.square_tracing.trace_points.len(), 100);
    assert_eq!(snapshot.overall_score, Some(100));

    // Per-test status followed by the suite report
    let reports = bus.published_on(&config.report_topic);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].payload["status"][0]["name"], "touch/touchscreen");
}
