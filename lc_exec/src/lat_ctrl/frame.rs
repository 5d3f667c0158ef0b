//! # Local frame
//!
//! The lane change polyline is followed in a 2D frame local to the start of the manoeuvre. The
//! frame's origin is the vehicle's starting waypoint and its x axis points at the next reference
//! waypoint, so that "ahead" is +x for the whole manoeuvre and the lateral offset is y.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Vector2, Vector3};

use comms_if::sim::Location;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A frame translated to `origin` and rotated about z by `theta`.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Vector3<f64>,
    theta_rad: f64,
    cos_t: f64,
    sin_t: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocalFrame {
    /// Create the frame whose x axis points from `origin` to `reference`.
    ///
    /// If the two points coincide the frame is only translated.
    pub fn new(origin: &Location, reference: &Location) -> Self {
        let theta_rad = (reference.y - origin.y).atan2(reference.x - origin.x);

        Self {
            origin: Vector3::new(origin.x, origin.y, origin.z),
            theta_rad,
            cos_t: theta_rad.cos(),
            sin_t: theta_rad.sin()
        }
    }

    /// Rotation of the frame about z, in radians.
    pub fn theta_rad(&self) -> f64 {
        self.theta_rad
    }

    /// Transform a world point into the frame. The z coordinate is translated but not rotated.
    pub fn to_local(&self, point: &Location) -> Vector3<f64> {
        let p = Vector3::new(point.x, point.y, point.z) - self.origin;

        Vector3::new(
            p.x * self.cos_t + p.y * self.sin_t,
            -p.x * self.sin_t + p.y * self.cos_t,
            p.z
        )
    }

    /// Transform a world point into the frame, dropping z.
    pub fn to_local_2d(&self, point: &Location) -> Vector2<f64> {
        self.to_local(point).xy()
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Planar distance between two points.
pub fn distance_2d(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    (a - b).norm()
}

/// The point on the line through `a` and `b` at the given x.
///
/// Returns `None` if the line is vertical (`a.x == b.x`), as there is either no such point or
/// infinitely many.
pub fn y_on_line(a: &Vector2<f64>, b: &Vector2<f64>, x: f64) -> Option<Vector2<f64>> {
    let dx = a.x - b.x;

    if dx == 0.0 {
        return None
    }

    let m = (a.y - b.y) / dx;
    let c = (a.x * b.y - b.x * a.y) / dx;

    Some(Vector2::new(x, m * x + c))
}

/// The point `distance` along the direction from `from` to `to`.
///
/// Returns `None` if the two points coincide.
pub fn point_toward(
    from: &Vector2<f64>,
    to: &Vector2<f64>,
    distance: f64
) -> Option<Vector2<f64>> {
    let dir = to - from;
    let len = dir.norm();

    if len == 0.0 {
        return None
    }

    Some(from + dir * (distance / len))
}
