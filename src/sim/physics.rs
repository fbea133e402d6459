//! Marker physics
//!
//! Two interchangeable layers sit behind [`MotionPhysics`]:
//! - [`TickIntegrator`]: one displacement step per motion sample in percent
//!   space, with naive O(n²) pairwise resolution in iteration order
//! - [`RigidWorld`](super::rigid::RigidWorld): rapier balls in a walled
//!   arena driven by sample-derived gravity
//!
//! Neither layer reports errors. Bad sample components read as zero.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::collision::{circle_circle_collision, exchange_velocities, separate};
use super::motion::MotionSample;
use super::registry::EntityRegistry;
use super::rigid::RigidWorld;
use super::state::MarkerId;
use crate::consts::*;
use crate::settings::PhysicsBackend;
use crate::{ContainerBounds, clamp_to_margin};

/// A collision loud enough to be heard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionCue {
    pub a: MarkerId,
    pub b: MarkerId,
    pub relative_speed: f32,
}

/// Contract shared by both physics layers
pub trait MotionPhysics {
    fn backend(&self) -> PhysicsBackend;

    /// Start simulating the markers currently registered
    fn enable(&mut self, registry: &EntityRegistry, bounds: ContainerBounds);

    /// Strong-shake mode: ×1.5 acceleration and a heavier downward pull
    fn amplify(&mut self);

    /// Advance one step from a sample; returns audible collisions
    fn apply_motion_sample(
        &mut self,
        registry: &mut EntityRegistry,
        bounds: ContainerBounds,
        sample: &MotionSample,
    ) -> Vec<CollisionCue>;

    /// Park every marker on its grid slot (creation order) and stop it
    fn layout_grid(&mut self, registry: &mut EntityRegistry, bounds: ContainerBounds);
}

/// Build the configured layer
pub fn build(backend: PhysicsBackend, seed: u64) -> Box<dyn MotionPhysics> {
    match backend {
        PhysicsBackend::Simplified => Box::new(TickIntegrator::new(seed)),
        PhysicsBackend::RigidBody => Box::new(RigidWorld::new()),
    }
}

/// Grid slot for the n-th marker: 3 columns at 20/50/80%, rows every 15%
pub fn grid_slot(index: usize) -> Vec2 {
    let row = (index / GRID_COLUMNS) as f32;
    let col = (index % GRID_COLUMNS) as f32;
    Vec2::new(
        GRID_ORIGIN_PCT + col * GRID_COLUMN_STEP_PCT,
        GRID_ORIGIN_PCT + row * GRID_ROW_STEP_PCT,
    )
}

/// Place markers on their grid slots and zero their velocities
pub(crate) fn park_on_grid(registry: &mut EntityRegistry) {
    for (index, marker) in registry.iter_mut().enumerate() {
        marker.position = grid_slot(index);
        marker.velocity = Vec2::ZERO;
    }
}

/// Random unit vector for separating markers stacked on the same point
fn random_normal(rng: &mut Pcg32) -> Vec2 {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    Vec2::from_angle(angle)
}

#[derive(Debug, Clone)]
struct TickBody {
    id: MarkerId,
    pos: Vec2,
    vel: Vec2,
    radius: f32,
}

/// Simplified per-sample integrator
#[derive(Debug, Clone)]
pub struct TickIntegrator {
    /// 1.0, or 1.5 once amplified
    pub intensity: f32,
    /// Downward drift in %/tick
    pub gravity_bias: f32,
    rng: Pcg32,
}

impl TickIntegrator {
    pub fn new(seed: u64) -> Self {
        Self {
            intensity: 1.0,
            gravity_bias: 0.0,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Displacement every marker receives from a sample
    pub fn displacement(&self, sample: &MotionSample) -> Vec2 {
        let delta = sample.planar() * DISPLACEMENT_GAIN * self.intensity;
        -delta + Vec2::new(0.0, self.gravity_bias)
    }

    fn integrate(&self, registry: &EntityRegistry, bounds: ContainerBounds, step: Vec2) -> Vec<TickBody> {
        let radius = bounds.marker_radius_pct();
        let low = MARGIN_PCT;
        let high = 100.0 - MARGIN_PCT;

        registry
            .iter()
            .map(|marker| {
                let target = marker.position + step;
                let mut vel = step;
                if target.x <= low || target.x >= high {
                    vel.x *= -DAMPING;
                }
                if target.y <= low || target.y >= high {
                    vel.y *= -DAMPING;
                }
                TickBody {
                    id: marker.id,
                    pos: clamp_to_margin(target),
                    vel,
                    radius,
                }
            })
            .collect()
    }

    /// Pairwise resolution in iteration order; earlier pairs see later
    /// pairs' inputs already moved.
    fn resolve(&mut self, bodies: &mut [TickBody]) -> Vec<CollisionCue> {
        let mut cues = Vec::new();
        for i in 0..bodies.len() {
            let (head, tail) = bodies.split_at_mut(i + 1);
            let a = &mut head[i];
            for b in tail.iter_mut() {
                let hit = circle_circle_collision(a.pos, a.radius, b.pos, b.radius);
                if !hit.hit {
                    continue;
                }

                let relative_speed = (a.vel - b.vel).length();
                if relative_speed > TICK_CUE_MIN_SPEED {
                    cues.push(CollisionCue { a: a.id, b: b.id, relative_speed });
                }

                (a.vel, b.vel) = exchange_velocities(a.vel, b.vel, DAMPING);

                let normal = if hit.normal == Vec2::ZERO {
                    random_normal(&mut self.rng)
                } else {
                    hit.normal
                };
                let (pa, pb) = separate(a.pos, b.pos, normal, hit.penetration);
                a.pos = clamp_to_margin(pa);
                b.pos = clamp_to_margin(pb);
            }
        }
        cues
    }
}

impl MotionPhysics for TickIntegrator {
    fn backend(&self) -> PhysicsBackend {
        PhysicsBackend::Simplified
    }

    fn enable(&mut self, registry: &EntityRegistry, _bounds: ContainerBounds) {
        log::info!("Tick integrator enabled with {} markers", registry.len());
    }

    fn amplify(&mut self) {
        self.intensity = STRONG_INTENSITY;
        self.gravity_bias = STRONG_GRAVITY_BIAS;
    }

    fn apply_motion_sample(
        &mut self,
        registry: &mut EntityRegistry,
        bounds: ContainerBounds,
        sample: &MotionSample,
    ) -> Vec<CollisionCue> {
        let step = self.displacement(sample);
        let mut bodies = self.integrate(registry, bounds, step);
        let cues = self.resolve(&mut bodies);

        for body in bodies {
            if let Some(marker) = registry.get_mut(body.id) {
                marker.position = body.pos;
                marker.velocity = body.vel;
            }
        }
        cues
    }

    fn layout_grid(&mut self, registry: &mut EntityRegistry, _bounds: ContainerBounds) {
        park_on_grid(registry);
    }
}
