//! Shape accuracy scoring
//!
//! A recorded trace is compared against points sampled along the ideal
//! outline. Each trace point is matched to its nearest ideal sample; points
//! farther than the acceptance radius are treated as excursions and ignored,
//! the rest contribute their distance to a mean deviation that is mapped onto
//! a 0-100 accuracy.

use super::geometry::{distance, path_length, sample_ideal_shape, Point, Shape, TracePoint};

/// Number of ideal points sampled along the outline
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Shape size the absolute pixel thresholds were tuned for
pub const REFERENCE_SHAPE_SIZE: f64 = 200.0;

/// Acceptance radius at the reference size (px)
pub const DEFAULT_ACCEPTANCE_RADIUS: f64 = 50.0;

/// Mean deviation that maps to zero accuracy at the reference size (px)
pub const DEFAULT_MAX_ACCEPTABLE_DEVIATION: f64 = 30.0;

/// Tunables for [`score_with`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringThresholds {
    pub sample_count: usize,
    pub acceptance_radius: f64,
    pub max_acceptable_deviation: f64,
}

impl ScoringThresholds {
    /// Thresholds expressed as fractions of the shape size, so a larger or
    /// smaller canvas keeps the same tolerance relative to the outline.
    pub fn for_size(size: f64) -> Self {
        let scale = size / REFERENCE_SHAPE_SIZE;
        Self {
            sample_count: DEFAULT_SAMPLE_COUNT,
            acceptance_radius: DEFAULT_ACCEPTANCE_RADIUS * scale,
            max_acceptable_deviation: DEFAULT_MAX_ACCEPTABLE_DEVIATION * scale,
        }
    }
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self::for_size(REFERENCE_SHAPE_SIZE)
    }
}

/// Outcome of scoring one trace
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeScore {
    /// 0-100, higher is better
    pub accuracy: u8,
    /// Raw path length of the trace, in px
    pub total_distance: f64,
    /// Mean nearest-neighbour distance of the points inside the acceptance radius
    pub mean_deviation: Option<f64>,
    /// Number of trace points inside the acceptance radius
    pub valid_points: usize,
}

impl ShapeScore {
    /// Mean deviation rounded to whole pixels, zero when nothing was on-shape
    pub fn deviation_score(&self) -> u32 {
        self.mean_deviation.map(|d| d.round() as u32).unwrap_or(0)
    }
}

/// Score a trace with thresholds derived from `size`
pub fn score(trace: &[TracePoint], shape: Shape, center: Point, size: f64) -> ShapeScore {
    score_with(trace, shape, center, size, &ScoringThresholds::for_size(size))
}

/// Score a trace against the ideal outline of `shape`
pub fn score_with(
    trace: &[TracePoint],
    shape: Shape,
    center: Point,
    size: f64,
    thresholds: &ScoringThresholds,
) -> ShapeScore {
    let raw: Vec<Point> = trace.iter().map(TracePoint::point).collect();
    let total_distance = path_length(&raw);

    let ideal = sample_ideal_shape(shape, center, size, thresholds.sample_count);
    if raw.is_empty() || ideal.is_empty() {
        return ShapeScore {
            accuracy: 0,
            total_distance,
            mean_deviation: None,
            valid_points: 0,
        };
    }

    let deviations: Vec<f64> = raw
        .iter()
        .map(|&p| {
            ideal
                .iter()
                .map(|&q| distance(p, q))
                .fold(f64::INFINITY, f64::min)
        })
        .filter(|&d| d <= thresholds.acceptance_radius)
        .collect();

    if deviations.is_empty() {
        return ShapeScore {
            accuracy: 0,
            total_distance,
            mean_deviation: None,
            valid_points: 0,
        };
    }

    let mean = deviations.iter().sum::<f64>() / deviations.len() as f64;
    let accuracy = if thresholds.max_acceptable_deviation > 0.0 {
        (100.0 - (mean / thresholds.max_acceptable_deviation) * 100.0)
            .max(0.0)
            .round()
            .min(100.0) as u8
    } else if mean == 0.0 {
        100
    } else {
        0
    };

    ShapeScore {
        accuracy,
        total_distance,
        mean_deviation: Some(mean),
        valid_points: deviations.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_trace(points: &[Point]) -> Vec<TracePoint> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| TracePoint::new(p.x, p.y, i as u64 * 16))
            .collect()
    }

    const CENTER: Point = Point::new(200.0, 200.0);

    #[test]
    fn test_empty_trace_scores_zero() {
        for shape in [Shape::Square, Shape::Circle, Shape::Diamond] {
            for size in [50.0, 200.0, 640.0] {
                let result = score(&[], shape, CENTER, size);
                assert_eq!(result.accuracy, 0);
                assert_eq!(result.total_distance, 0.0);
            }
        }
    }

    #[test]
    fn test_single_point_has_no_distance() {
        let result = score(&[TracePoint::new(100.0, 100.0, 0)], Shape::Square, CENTER, 200.0);
        assert_eq!(result.total_distance, 0.0);
        assert_eq!(result.accuracy, 100);
        assert_eq!(result.valid_points, 1);
    }

    #[test]
    fn test_perfect_square_trace() {
        let ideal = sample_ideal_shape(Shape::Square, CENTER, 200.0, 100);
        let result = score(&as_trace(&ideal), Shape::Square, CENTER, 200.0);
        assert_eq!(result.accuracy, 100);
        assert!((result.total_distance - 800.0).abs() < 10.0);
        assert_eq!(result.deviation_score(), 0);
    }

    #[test]
    fn test_off_shape_points_are_ignored() {
        let ideal = sample_ideal_shape(Shape::Square, CENTER, 200.0, 100);
        let mut points = ideal.clone();
        // Excursion into the middle of the square, 100px from any edge
        points.push(CENTER);
        let result = score(&as_trace(&points), Shape::Square, CENTER, 200.0);
        assert_eq!(result.accuracy, 100);
        assert_eq!(result.valid_points, 100);
    }

    #[test]
    fn test_all_points_off_shape() {
        let trace = as_trace(&[Point::new(200.0, 200.0), Point::new(205.0, 200.0)]);
        let result = score(&trace, Shape::Circle, CENTER, 200.0);
        assert_eq!(result.accuracy, 0);
        assert_eq!(result.valid_points, 0);
        assert_eq!(result.total_distance, 5.0);
    }

    #[test]
    fn test_accuracy_decreases_with_deviation() {
        let mut previous = u8::MAX;
        for offset in [0.0, 3.0, 6.0, 12.0, 15.0, 24.0, 29.0, 35.0, 45.0] {
            // Concentric circle: each point is exactly `offset` from its ideal sample
            let widened = sample_ideal_shape(Shape::Circle, CENTER, 200.0 + 2.0 * offset, 100);
            let result = score(&as_trace(&widened), Shape::Circle, CENTER, 200.0);
            assert!(result.accuracy <= previous, "offset {} raised accuracy", offset);
            previous = result.accuracy;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_fifteen_pixel_deviation_is_half_score() {
        let widened = sample_ideal_shape(Shape::Circle, CENTER, 230.0, 100);
        let result = score(&as_trace(&widened), Shape::Circle, CENTER, 200.0);
        assert_eq!(result.accuracy, 50);
        assert_eq!(result.deviation_score(), 15);
    }

    #[test]
    fn test_thresholds_scale_with_size() {
        let reference = ScoringThresholds::default();
        assert_eq!(reference.acceptance_radius, 50.0);
        assert_eq!(reference.max_acceptable_deviation, 30.0);

        let doubled = ScoringThresholds::for_size(400.0);
        assert_eq!(doubled.acceptance_radius, 100.0);
        assert_eq!(doubled.max_acceptable_deviation, 60.0);
    }
}
