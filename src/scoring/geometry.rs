use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A position on the capture surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point recorded by the capture surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: u64,
}

impl TracePoint {
    pub const fn new(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self { x, y, timestamp_ms }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Target outline traced during the shape tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Square,
    Circle,
    Diamond,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Square => "square",
            Shape::Circle => "circle",
            Shape::Diamond => "diamond",
        }
    }

    /// Parse a shape name, case-insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "square" => Some(Shape::Square),
            "circle" => Some(Shape::Circle),
            "diamond" => Some(Shape::Diamond),
            _ => None,
        }
    }
}

/// Euclidean distance between two points
pub fn distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Sum of consecutive point-to-point distances
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Sample `sample_count` points evenly spaced along the perimeter of `shape`.
///
/// `size` is the side length of the square, the diameter of the circle and the
/// vertex-to-vertex width of the diamond. Sampling starts at a fixed vertex
/// (top-left for the square, top for the diamond, angle zero for the circle)
/// and walks clockwise in screen coordinates, so identical arguments always
/// produce the identical sequence.
pub fn sample_ideal_shape(shape: Shape, center: Point, size: f64, sample_count: usize) -> Vec<Point> {
    let half = size / 2.0;
    match shape {
        Shape::Circle => (0..sample_count)
            .map(|i| {
                let angle = TAU * i as f64 / sample_count as f64;
                Point::new(center.x + half * angle.cos(), center.y + half * angle.sin())
            })
            .collect(),
        Shape::Square => sample_polygon(
            &[
                Point::new(center.x - half, center.y - half),
                Point::new(center.x + half, center.y - half),
                Point::new(center.x + half, center.y + half),
                Point::new(center.x - half, center.y + half),
            ],
            sample_count,
        ),
        Shape::Diamond => sample_polygon(
            &[
                Point::new(center.x, center.y - half),
                Point::new(center.x + half, center.y),
                Point::new(center.x, center.y + half),
                Point::new(center.x - half, center.y),
            ],
            sample_count,
        ),
    }
}

/// Walk a closed polygon and emit points at equal arc-length intervals
fn sample_polygon(vertices: &[Point], sample_count: usize) -> Vec<Point> {
    let edges: Vec<(Point, Point, f64)> = vertices
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let b = vertices[(i + 1) % vertices.len()];
            (a, b, distance(a, b))
        })
        .collect();
    let perimeter: f64 = edges.iter().map(|(_, _, len)| len).sum();

    (0..sample_count)
        .map(|i| {
            let mut remaining = perimeter * i as f64 / sample_count as f64;
            for (idx, &(a, b, len)) in edges.iter().enumerate() {
                if remaining <= len || idx == edges.len() - 1 {
                    let t = if len > 0.0 { (remaining / len).min(1.0) } else { 0.0 };
                    return Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
                }
                remaining -= len;
            }
            vertices[0]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
        assert_eq!(distance(Point::new(1.0, 1.0), Point::new(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_sample_count_and_determinism() {
        let center = Point::new(200.0, 200.0);
        for shape in [Shape::Square, Shape::Circle, Shape::Diamond] {
            for count in [1, 7, 100, 257] {
                let first = sample_ideal_shape(shape, center, 200.0, count);
                let second = sample_ideal_shape(shape, center, 200.0, count);
                assert_eq!(first.len(), count);
                assert_eq!(first, second);
            }
        }
        assert!(sample_ideal_shape(Shape::Square, center, 200.0, 0).is_empty());
    }

    #[test]
    fn test_square_samples_lie_on_perimeter() {
        let points = sample_ideal_shape(Shape::Square, Point::new(200.0, 200.0), 200.0, 100);
        assert_eq!(points[0], Point::new(100.0, 100.0));
        assert_eq!(points[25], Point::new(300.0, 100.0));
        for p in &points {
            let on_vertical = (p.x - 100.0).abs() < 1e-9 || (p.x - 300.0).abs() < 1e-9;
            let on_horizontal = (p.y - 100.0).abs() < 1e-9 || (p.y - 300.0).abs() < 1e-9;
            assert!(on_vertical || on_horizontal, "{:?} is off the square", p);
        }
        // Equal runs of 25 points per 200px edge
        for w in points.windows(2) {
            assert!((distance(w[0], w[1]) - 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_circle_and_diamond_radius() {
        let center = Point::new(50.0, 50.0);
        for p in sample_ideal_shape(Shape::Circle, center, 40.0, 64) {
            assert!((distance(p, center) - 20.0).abs() < 1e-9);
        }
        for p in sample_ideal_shape(Shape::Diamond, center, 40.0, 64) {
            // |dx| + |dy| == half width on a diamond outline
            assert!(((p.x - 50.0).abs() + (p.y - 50.0).abs() - 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_path_length() {
        let pts = [Point::new(0.0, 0.0), Point::new(3.0, 4.0), Point::new(3.0, 10.0)];
        assert_eq!(path_length(&pts), 11.0);
        assert_eq!(path_length(&pts[..1]), 0.0);
        assert_eq!(path_length(&[]), 0.0);
    }

    #[test]
    fn test_shape_names() {
        assert_eq!(Shape::from_name(" Diamond "), Some(Shape::Diamond));
        assert_eq!(Shape::from_name("triangle"), None);
        assert_eq!(Shape::Circle.name(), "circle");
    }
}
