//! Scoring engines that turn raw samples into comparable metrics

pub mod geometry;
pub mod shape;
pub mod touch;

pub use geometry::{distance, sample_ideal_shape, Point, Shape, TracePoint};
pub use shape::{score, score_with, ScoringThresholds, ShapeScore};
pub use touch::TouchAggregator;
