//! geometry.rs — small-vector arithmetic shared by the simulator and the net
//!
//! Integer points describe the surface and the lander position, real points
//! describe velocity. Lines are kept in homogeneous coordinates so both the
//! landing intersection and the obstacle raycast share one construction.

use serde::{Deserialize, Serialize};

use crate::{Fnum, Inum};

// ── Points & spans ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point<T> {
    pub x: T,
    pub y: T,
}

/// Inclusive-on-both-ends in the landing-strip semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span<T> {
    pub start: T,
    pub end: T,
}

pub type IPoint = Point<Inum>;
pub type FPoint = Point<Fnum>;

impl<T> Point<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }
}

impl From<IPoint> for FPoint {
    fn from(p: IPoint) -> Self {
        Self { x: p.x as Fnum, y: p.y as Fnum }
    }
}

impl FPoint {
    pub fn add(&self, other: &FPoint) -> FPoint {
        FPoint::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &FPoint) -> FPoint {
        FPoint::new(self.x - other.x, self.y - other.y)
    }

    pub fn dot(&self, other: &FPoint) -> Fnum {
        self.x * other.x + self.y * other.y
    }
}

// ── Interpolation ─────────────────────────────────────────────────────────────

/// Linear interpolation with a monotonicity-safe endpoint: exact at t=0 and
/// t=1, bounded and consistent in between.
pub fn lerp(a: Fnum, b: Fnum, t: Fnum) -> Fnum {
    if (a <= 0.0 && b >= 0.0) || (a >= 0.0 && b <= 0.0) {
        return t * b + (1.0 - t) * a;
    }
    if t == 1.0 {
        return b;
    }
    let x = a + t * (b - a);
    if (t > 1.0) == (b > a) {
        if b < x { x } else { b }
    } else {
        if b > x { x } else { b }
    }
}

// ── Homogeneous lines ─────────────────────────────────────────────────────────

/// Line through two points as homogeneous coefficients `[a, b, c]`
/// with `a·x + b·y + c = 0`.
pub fn line(a: FPoint, b: FPoint) -> [Fnum; 3] {
    [a.y - b.y, b.x - a.x, a.x * b.y - b.x * a.y]
}

pub fn cross(a: [Fnum; 3], b: [Fnum; 3]) -> [Fnum; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Project a homogeneous point back to the plane. Parallel lines yield
/// non-finite coordinates; callers skip those hits.
pub fn as_point(hp: [Fnum; 3]) -> FPoint {
    FPoint::new(hp[0] / hp[2], hp[1] / hp[2])
}

/// Intersection of the (infinite) lines through two segments, rounded to the
/// integer grid. The segments are known to cross when this is called.
pub fn intersect(l1_start: IPoint, l1_end: IPoint, l2_start: IPoint, l2_end: IPoint) -> IPoint {
    let a = line(l1_start.into(), l1_end.into());
    let b = line(l2_start.into(), l2_end.into());
    let c = cross(a, b);
    IPoint::new(
        (c[0] / c[2]).round() as Inum,
        (c[1] / c[2]).round() as Inum,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_exact_endpoints() {
        assert_eq!(lerp(2.0, 5.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 5.0, 1.0), 5.0);
        assert_eq!(lerp(-3.0, 3.0, 0.5), 0.0);
    }

    #[test]
    fn lerp_is_bounded_inside() {
        let v = lerp(1.0, 2.0, 0.75);
        assert!(v >= 1.0 && v <= 2.0);
    }

    #[test]
    fn intersect_axis_cross() {
        // Vertical drop through a horizontal strip at y=150.
        let p = intersect(
            IPoint::new(4500, 200),
            IPoint::new(4500, 100),
            IPoint::new(4000, 150),
            IPoint::new(5500, 150),
        );
        assert_eq!(p, IPoint::new(4500, 150));
    }

    #[test]
    fn intersect_diagonal() {
        let p = intersect(
            IPoint::new(0, 0),
            IPoint::new(10, 10),
            IPoint::new(0, 10),
            IPoint::new(10, 0),
        );
        assert_eq!(p, IPoint::new(5, 5));
    }
}
