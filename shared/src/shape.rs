//! Circular collision volumes shared by the server simulation and client mirrors

use crate::error::ShapeError;
use serde::{Deserialize, Serialize};

/// Smallest radius a shape may hold. Keeps the `radius > 0` invariant for
/// shapes built through the infallible constructor.
pub const MIN_RADIUS: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Circle,
}

/// A circle positioned in world space.
///
/// The kind never changes after creation; position and radius are updated
/// by the owning entity every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    radius: f64,
}

impl Shape {
    /// Creates a circle from untrusted input, rejecting non-positive radii.
    pub fn create(x: f64, y: f64, radius: f64) -> Result<Self, ShapeError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ShapeError::NonPositiveRadius(radius));
        }
        Ok(Self {
            kind: ShapeKind::Circle,
            x,
            y,
            radius,
        })
    }

    /// Creates a circle from a radius the caller already trusts.
    pub fn circle(x: f64, y: f64, radius: f64) -> Self {
        Self {
            kind: ShapeKind::Circle,
            x,
            y,
            radius: radius.max(MIN_RADIUS),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Sets the radius, bounded to `[MIN_RADIUS, max]`.
    pub fn set_radius_clamped(&mut self, radius: f64, max: f64) {
        self.radius = radius.min(max).max(MIN_RADIUS);
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    pub fn distance_squared(&self, other: &Shape) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Circle-circle overlap. Touching circles count as intersecting.
    pub fn intersects(&self, other: &Shape) -> bool {
        let reach = self.radius + other.radius;
        self.distance_squared(other) <= reach * reach
    }

    #[cfg(test)]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

/// Free-function form of [`Shape::intersects`].
pub fn intersects(a: &Shape, b: &Shape) -> bool {
    a.intersects(b)
}
