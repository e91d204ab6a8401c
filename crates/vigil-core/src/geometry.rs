use std::fmt;

use serde::{Deserialize, Serialize};

/// A position inside a region, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Point {
    /// East/west coordinate.
    pub x: i32,
    /// North/south coordinate.
    pub y: i32,
    /// Height.
    #[serde(default)]
    pub z: i32,
}

impl Point {
    /// Create a point from its three coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Create a point on the ground plane.
    pub const fn flat(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    fn distance_squared(self, other: Point) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Straight-line distance to `other`, rounded down.
    pub fn distance(self, other: Point) -> u32 {
        let d = (self.distance_squared(other) as f64).sqrt();
        d.min(f64::from(u32::MAX)) as u32
    }

    /// True when `other` lies within `radius` units (inclusive).
    pub fn is_within(self, other: Point, radius: u32) -> bool {
        let r = i64::from(radius);
        self.distance_squared(other) <= r * r
    }

    /// The point `step` units from `self` in the direction of `target`.
    /// Returns `target` itself when it is closer than `step`.
    pub fn step_toward(self, target: Point, step: u32) -> Point {
        let dist = self.distance(target);
        if dist <= step || dist == 0 {
            return target;
        }
        let ratio = f64::from(step) / f64::from(dist);
        self.lerp(target, ratio)
    }

    /// The point `distance` units from `self`, directly away from `from`.
    /// When both points coincide the flight direction is due east.
    pub fn away_from(self, from: Point, distance: u32) -> Point {
        let dx = f64::from(self.x) - f64::from(from.x);
        let dy = f64::from(self.y) - f64::from(from.y);
        let len = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = if len < f64::EPSILON {
            (1.0, 0.0)
        } else {
            (dx / len, dy / len)
        };
        let d = f64::from(distance);
        Point {
            x: saturate(f64::from(self.x) + ux * d),
            y: saturate(f64::from(self.y) + uy * d),
            z: self.z,
        }
    }

    fn lerp(self, target: Point, t: f64) -> Point {
        let mix = |a: i32, b: i32| saturate(f64::from(a) + (f64::from(b) - f64::from(a)) * t);
        Point {
            x: mix(self.x, target.x),
            y: mix(self.y, target.y),
            z: mix(self.z, target.z),
        }
    }
}

fn saturate(v: f64) -> i32 {
    v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
