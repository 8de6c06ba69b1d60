//! Mathematical structs and functions.

use cgmath::prelude::*;
use cgmath::{Point2, Vector2};
use itertools::Itertools;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Computes the total length of a polyline.
pub fn polyline_length(points: &[Point2d]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.distance(*b))
        .sum()
}

/// Samples a polyline at the given distance along it,
/// returning the position and the unit tangent vector.
///
/// Distances outside the polyline are clamped to its ends.
/// Returns `None` if the polyline has fewer than two distinct points.
pub fn sample_polyline(points: &[Point2d], dist: f64) -> Option<(Point2d, Vector2d)> {
    let mut remaining = f64::max(dist, 0.0);
    let mut last = None;
    for (a, b) in points.iter().tuple_windows() {
        let len = a.distance(*b);
        if len <= 0.0 {
            continue;
        }
        let tan = (*b - *a) / len;
        if remaining <= len {
            return Some((*a + tan * remaining, tan));
        }
        remaining -= len;
        last = Some((*b, tan));
    }
    last
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn polyline_with_corner() {
        let points = [
            Point2d::new(0.0, 0.0),
            Point2d::new(30.0, 0.0),
            Point2d::new(30.0, 40.0),
        ];
        assert_approx_eq!(polyline_length(&points), 70.0);

        let (pos, tan) = sample_polyline(&points, 50.0).unwrap();
        assert_approx_eq!(pos.x, 30.0);
        assert_approx_eq!(pos.y, 20.0);
        assert_approx_eq!(tan.y, 1.0);

        let (end, _) = sample_polyline(&points, 500.0).unwrap();
        assert_approx_eq!(end.y, 40.0);
    }

    #[test]
    fn degenerate_polyline() {
        let points = [Point2d::new(1.0, 1.0), Point2d::new(1.0, 1.0)];
        assert_eq!(polyline_length(&points), 0.0);
        assert!(sample_polyline(&points, 0.0).is_none());
    }
}
