use crate::checks::touchscreen::TouchscreenSettings;
use crate::scoring::{Point, ScoringThresholds, Shape};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Rosbridge websocket URL
    pub bus_url: String,

    /// Delay before reconnecting after the bus connection closes (ms)
    pub reconnect_delay_ms: u64,

    /// Topic the robot acknowledges tests on
    pub confirmation_topic: String,
    pub confirmation_type: String,

    /// Topic diagnostic reports are published to
    pub report_topic: String,
    pub report_type: String,

    pub hardware_id: String,
    pub frame_id: String,

    /// Publish each test result as soon as it is recorded
    pub publish_each_test: bool,

    /// Pause between a completed step and the next one (ms)
    pub settle_delay_ms: u64,

    /// Basic multi-touch window (ms)
    pub touch_window_ms: u64,

    /// Proximity sensor window (ms)
    pub proximity_window_ms: u64,

    /// Time each display color is shown (ms)
    pub display_phase_ms: u64,
    pub display_colors: Vec<String>,

    /// Center of the shape canvas
    pub canvas_center: Point,

    /// Side length / diameter of the traced shapes (px)
    pub shape_size: f64,

    /// Shape traced after the square
    pub second_shape: Shape,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_url: "ws://localhost:9090".to_string(),
            reconnect_delay_ms: 3000,
            confirmation_topic: "/test_confirmation".to_string(),
            confirmation_type: "std_msgs/String".to_string(),
            report_topic: "/diagnostics".to_string(),
            report_type: "diagnostic_msgs/DiagnosticArray".to_string(),
            hardware_id: "touch-device".to_string(),
            frame_id: String::new(),
            publish_each_test: true,
            settle_delay_ms: 1000,
            touch_window_ms: 10_000,
            proximity_window_ms: 10_000,
            display_phase_ms: 2000,
            display_colors: ["red", "green", "blue", "white", "black"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            canvas_center: Point::new(200.0, 200.0),
            shape_size: 200.0,
            second_shape: Shape::Circle,
        }
    }
}

impl Config {
    /// Load a YAML config file; missing keys fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn touchscreen_settings(&self) -> TouchscreenSettings {
        TouchscreenSettings {
            window_ms: self.touch_window_ms,
            center: self.canvas_center,
            shape_size: self.shape_size,
            second_shape: self.second_shape,
            thresholds: ScoringThresholds::for_size(self.shape_size),
        }
    }
}
