use super::geometry::TracePoint;
use crate::checks::types::TouchTestResult;
use std::collections::HashMap;

/// Default length of the basic touch window (ms)
pub const DEFAULT_TOUCH_WINDOW_MS: u64 = 10_000;

/// Accumulates touch-begin/touch-end events over a fixed window.
///
/// Contacts are tracked by their stable per-contact id; the running maximum
/// of simultaneously active contacts decides multi-touch support.
#[derive(Debug, Clone)]
pub struct TouchAggregator {
    window_ms: u64,
    active: HashMap<u32, TracePoint>,
    max_concurrent: usize,
    latencies_ms: Vec<f64>,
    points: Vec<TracePoint>,
}

impl TouchAggregator {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            active: HashMap::new(),
            max_concurrent: 0,
            latencies_ms: Vec::new(),
            points: Vec::new(),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Number of contacts currently down
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Record a new contact. `latency_ms` is the time between the event
    /// arriving and this call.
    pub fn touch_begin(&mut self, contact_id: u32, point: TracePoint, latency_ms: f64) {
        self.active.insert(contact_id, point);
        self.max_concurrent = self.max_concurrent.max(self.active.len());
        self.latencies_ms.push(latency_ms.max(0.0));
        self.points.push(point);
    }

    /// Release a contact; unknown ids are ignored
    pub fn touch_end(&mut self, contact_id: u32) {
        if self.active.remove(&contact_id).is_none() {
            log::debug!("touch end for unknown contact {}", contact_id);
        }
    }

    /// Close the window and produce the result
    pub fn finalize(self) -> TouchTestResult {
        let average_response_time_ms = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        };

        TouchTestResult {
            multi_touch_supported: self.max_concurrent > 1,
            max_simultaneous_touches: self.max_concurrent as u32,
            average_response_time_ms,
            total_touches: self.points.len() as u32,
            test_duration_ms: self.window_ms,
            touch_points: self.points,
        }
    }
}
