use super::{build_suite_report, build_test_report, types::DiagnosticArray, ReportContext};
use crate::bus::MessageBus;
use crate::checks::{SuiteResult, TestResult};
use crate::utils::config::Config;
use chrono::Utc;
use std::sync::Arc;

/// Publishes diagnostic reports on the report topic
pub struct ReportPublisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    type_name: String,
    context: ReportContext,
}

impl ReportPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, config: &Config, suite_name: &str) -> Self {
        Self {
            bus,
            topic: config.report_topic.clone(),
            type_name: config.report_type.clone(),
            context: ReportContext {
                name: suite_name.to_string(),
                hardware_id: config.hardware_id.clone(),
                frame_id: config.frame_id.clone(),
            },
        }
    }

    /// Publish the summary of every executed test. Returns the transport's
    /// success flag; failures are left to the caller to retry.
    pub fn publish(&self, results: &SuiteResult) -> bool {
        let report = build_suite_report(results, &self.context, Utc::now());
        self.send(&report)
    }

    pub fn publish_test(&self, result: &TestResult) -> bool {
        let report = build_test_report(result, &self.context, Utc::now());
        self.send(&report)
    }

    fn send(&self, report: &DiagnosticArray) -> bool {
        let payload = match serde_json::to_value(report) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("failed to encode report: {}", e);
                return false;
            }
        };
        let ok = self.bus.publish(&self.topic, &self.type_name, payload);
        if ok {
            log::info!("published report to {}", self.topic);
        } else {
            log::warn!("report publish to {} failed", self.topic);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::checks::types::fixtures;

    #[test]
    fn test_publish_goes_to_report_topic() {
        let bus = LocalBus::new();
        let config = Config::default();
        let publisher = ReportPublisher::new(Arc::new(bus.clone()), &config, "bench");

        let mut results = SuiteResult::new();
        results.insert(fixtures::proximity(true));
        assert!(publisher.publish(&results));
        assert!(publisher.publish_test(&fixtures::display(false)));

        let sent = bus.published_on(&config.report_topic);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].type_name, "diagnostic_msgs/DiagnosticArray");
        assert_eq!(sent[0].payload["status"][0]["name"], "bench");
        assert_eq!(sent[1].payload["status"][0]["name"], "bench/displayDefect");
    }

    #[test]
    fn test_publish_reports_transport_failure() {
        let bus = LocalBus::new();
        bus.set_connected(false);
        let publisher = ReportPublisher::new(Arc::new(bus.clone()), &Config::default(), "bench");
        assert!(!publisher.publish(&SuiteResult::new()));
    }
}
