//! 2D pixel-space geometry shared by the engine stages.
//!
//! Image coordinates: x grows to the right, y grows downward.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Smallest magnitude treated as a non-degenerate vector
const DEGENERATE_EPS: f32 = 1e-6;

/// Pixel-space point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Mean of all points, `None` for an empty slice
    pub fn centroid(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f32;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }

    /// Point at parameter `t` along the segment self → other
    pub fn lerp(&self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;

    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Angle ∠abc at vertex `b` in degrees (0–180)
///
/// cos(θ) = (ba · bc) / (|ba| × |bc|). A zero-length arm yields 0.
pub fn vertex_angle(a: Point, b: Point, c: Point) -> f32 {
    let ba = a - b;
    let bc = c - b;
    let mag = ba.length() * bc.length();
    if mag < DEGENERATE_EPS {
        return 0.0;
    }
    let cos_angle = ((ba.x * bc.x + ba.y * bc.y) / mag).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Unsigned angle of segment p1–p2 from the vertical axis, 0–90 degrees
pub fn angle_from_vertical(p1: Point, p2: Point) -> f32 {
    let dx = (p1.x - p2.x).abs();
    let dy = (p1.y - p2.y).abs();
    if dy == 0.0 {
        return 90.0;
    }
    (dx / dy).atan().to_degrees()
}

/// Perpendicular distance of `target` from the infinite line through `start` and `end`
///
/// The line length is floored at 1px so coincident endpoints never divide by zero.
/// Returns (distance, floored line length).
pub fn distance_to_line(start: Point, end: Point, target: Point) -> (f32, f32) {
    let num = ((end.x - start.x) * (start.y - target.y) - (start.x - target.x) * (end.y - start.y)).abs();
    let len = start.distance(end).max(1.0);
    (num / len, len)
}
