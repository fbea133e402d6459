//! Collision detection and response for circular markers
//!
//! Used by the tick integrator in percent space; nothing here cares which
//! unit is in use.

use glam::Vec2;

/// Result of a collision check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Unit normal pointing from the first shape toward the second
    /// (zero when the centers coincide)
    pub normal: Vec2,
    /// Overlap depth
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Two circles collide when their centers are closer than the sum of radii
pub fn circle_circle_collision(a: Vec2, a_radius: f32, b: Vec2, b_radius: f32) -> CollisionResult {
    let delta = b - a;
    let distance = delta.length();
    let min_distance = a_radius + b_radius;

    if distance >= min_distance {
        return CollisionResult::miss();
    }

    CollisionResult {
        hit: true,
        normal: delta.normalize_or_zero(),
        penetration: min_distance - distance,
    }
}

/// Swap two velocities, keeping `damping` of each
#[inline]
pub fn exchange_velocities(a: Vec2, b: Vec2, damping: f32) -> (Vec2, Vec2) {
    (b * damping, a * damping)
}

/// Push two centers apart along `normal`, each by half the overlap
#[inline]
pub fn separate(a: Vec2, b: Vec2, normal: Vec2, penetration: f32) -> (Vec2, Vec2) {
    let half = normal * (penetration / 2.0);
    (a - half, b + half)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circles_overlapping() {
        let result = circle_circle_collision(Vec2::ZERO, 5.0, Vec2::new(8.0, 0.0), 5.0);
        assert!(result.hit);
        assert_eq!(result.normal, Vec2::X);
        assert!((result.penetration - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_circles_touching_do_not_collide() {
        let result = circle_circle_collision(Vec2::ZERO, 5.0, Vec2::new(10.0, 0.0), 5.0);
        assert!(!result.hit);
    }

    #[test]
    fn test_coincident_centers_have_no_normal() {
        let result = circle_circle_collision(Vec2::ONE, 5.0, Vec2::ONE, 5.0);
        assert!(result.hit);
        assert_eq!(result.normal, Vec2::ZERO);
        assert!((result.penetration - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_exchange_damps_both() {
        let (a, b) = exchange_velocities(Vec2::new(10.0, 0.0), Vec2::new(0.0, -5.0), 0.8);
        assert_eq!(a, Vec2::new(0.0, -4.0));
        assert_eq!(b, Vec2::new(8.0, 0.0));
    }

    #[test]
    fn test_separate_resolves_overlap() {
        let (a, b) = separate(Vec2::ZERO, Vec2::new(8.0, 0.0), Vec2::X, 2.0);
        assert_eq!(a, Vec2::new(-1.0, 0.0));
        assert_eq!(b, Vec2::new(9.0, 0.0));
    }
}
