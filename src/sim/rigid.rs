//! Rigid-body delegate
//!
//! Markers become equal-size rapier balls in a pixel-space arena bounded by
//! four fixed walls. Each motion sample sets world gravity and advances one
//! fixed step. Contacts only feed the audible cue; they never touch session
//! state.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;
use rapier2d::crossbeam::channel::unbounded;
use rapier2d::prelude::*;

use super::motion::MotionSample;
use super::physics::{CollisionCue, MotionPhysics, park_on_grid};
use super::registry::EntityRegistry;
use super::state::MarkerId;
use crate::ContainerBounds;
use crate::consts::*;
use crate::settings::PhysicsBackend;

/// Wall slab thickness, outside the arena (pixels)
const WALL_THICKNESS: f32 = MARKER_SIZE_PX;

/// Body `user_data` for anything that is not a marker
const NOT_A_MARKER: u128 = 0;

fn to_rapier(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn from_rapier(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Walled arena of rapier balls, one per marker
pub struct RigidWorld {
    /// Gravity in world units (1.0 = `RIGID_GRAVITY_PX` px/s²)
    pub gravity: Vec2,
    pub intensity: f32,
    pub gravity_bias: f32,
    arena: Vec2,
    markers: BTreeMap<MarkerId, RigidBodyHandle>,
    walls: Vec<RigidBodyHandle>,

    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
}

impl fmt::Debug for RigidWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RigidWorld")
            .field("gravity", &self.gravity)
            .field("intensity", &self.intensity)
            .field("gravity_bias", &self.gravity_bias)
            .field("arena", &self.arena)
            .field("bodies", &self.markers.len())
            .finish()
    }
}

impl Default for RigidWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidWorld {
    pub fn new() -> Self {
        let params = IntegrationParameters {
            dt: RIGID_DT,
            length_unit: MARKER_SIZE_PX,
            ..IntegrationParameters::default()
        };

        Self {
            gravity: Vec2::ZERO,
            intensity: 1.0,
            gravity_bias: 0.0,
            arena: Vec2::ZERO,
            markers: BTreeMap::new(),
            walls: Vec::new(),
            pipeline: PhysicsPipeline::new(),
            params,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.markers.len()
    }

    /// Pixel position and velocity (px/s) of a marker's body
    pub fn body(&self, id: MarkerId) -> Option<(Vec2, Vec2)> {
        let body = self.bodies.get(*self.markers.get(&id)?)?;
        Some((from_rapier(body.translation()), from_rapier(body.linvel())))
    }

    fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn spawn_ball(&mut self, id: MarkerId, pos: Vec2) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(to_rapier(pos))
            .linvel(vector![0.0, 0.0])
            .linear_damping(RIGID_AIR_FRICTION / RIGID_DT)
            .lock_rotations()
            .ccd_enabled(true)
            .user_data(id.0 as u128)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::ball(MARKER_SIZE_PX / 2.0)
            .restitution(RIGID_RESTITUTION)
            .friction(RIGID_FRICTION)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Four fixed slabs just outside the arena
    fn build_walls(&mut self) {
        for handle in std::mem::take(&mut self.walls) {
            self.remove_body(handle);
        }
        let (w, h) = (self.arena.x, self.arena.y);
        let t = WALL_THICKNESS;
        let slabs = [
            (Vec2::new(w / 2.0, -t / 2.0), Vec2::new(w / 2.0 + t, t / 2.0)),
            (Vec2::new(w / 2.0, h + t / 2.0), Vec2::new(w / 2.0 + t, t / 2.0)),
            (Vec2::new(-t / 2.0, h / 2.0), Vec2::new(t / 2.0, h / 2.0 + t)),
            (Vec2::new(w + t / 2.0, h / 2.0), Vec2::new(t / 2.0, h / 2.0 + t)),
        ];

        for (center, half) in slabs {
            let body = RigidBodyBuilder::fixed()
                .translation(to_rapier(center))
                .user_data(NOT_A_MARKER)
                .build();
            let handle = self.bodies.insert(body);
            let collider = ColliderBuilder::cuboid(half.x, half.y)
                .restitution(RIGID_RESTITUTION)
                .friction(RIGID_FRICTION)
                .build();
            self.colliders.insert_with_parent(collider, handle, &mut self.bodies);
            self.walls.push(handle);
        }
    }

    /// Match bodies to the registry: new markers gain a resting body,
    /// removed markers lose theirs. A resized container moves every body
    /// back onto its marker's stored percentage.
    fn sync(&mut self, registry: &EntityRegistry, bounds: ContainerBounds) {
        let arena = Vec2::new(bounds.width, bounds.height);
        if arena != self.arena {
            self.resize_arena(registry, bounds, arena);
        }

        let gone: Vec<MarkerId> = self
            .markers
            .keys()
            .copied()
            .filter(|id| !registry.contains(*id))
            .collect();
        for id in gone {
            if let Some(handle) = self.markers.remove(&id) {
                self.remove_body(handle);
            }
        }

        for marker in registry.iter() {
            if !self.markers.contains_key(&marker.id) {
                let handle = self.spawn_ball(marker.id, bounds.to_pixels(marker.position));
                self.markers.insert(marker.id, handle);
            }
        }
    }

    fn resize_arena(&mut self, registry: &EntityRegistry, bounds: ContainerBounds, arena: Vec2) {
        let old = self.arena;
        let scale = if old.x > 0.0 && old.y > 0.0 { arena / old } else { Vec2::ONE };

        for (id, handle) in &self.markers {
            let (Some(marker), Some(body)) = (registry.get(*id), self.bodies.get_mut(*handle)) else {
                continue;
            };
            let vel = from_rapier(body.linvel()) * scale;
            body.set_translation(to_rapier(bounds.to_pixels(marker.position)), true);
            body.set_linvel(to_rapier(vel), true);
        }

        log::debug!("Rigid arena {}x{} -> {}x{}", old.x, old.y, arena.x, arena.y);
        self.arena = arena;
        self.build_walls();
    }

    fn marker_of(&self, collider: ColliderHandle) -> Option<MarkerId> {
        let body = self.bodies.get(self.colliders.get(collider)?.parent()?)?;
        (body.user_data != NOT_A_MARKER).then_some(MarkerId(body.user_data as u32))
    }

    /// Advance one fixed step; returns marker pairs that started touching
    /// faster than the audible threshold
    fn step(&mut self) -> Vec<CollisionCue> {
        // Impact speed is judged on velocities going into the step
        let before: BTreeMap<MarkerId, Vec2> = self
            .markers
            .iter()
            .filter_map(|(id, handle)| Some((*id, from_rapier(self.bodies.get(*handle)?.linvel()))))
            .collect();

        let (collision_send, collision_recv) = unbounded();
        let (force_send, _force_recv) = unbounded();
        let events = ChannelEventCollector::new(collision_send, force_send);
        let gravity = to_rapier(self.gravity * RIGID_GRAVITY_PX);

        self.pipeline.step(
            &gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            None,
            &(),
            &events,
        );

        let mut cues = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let CollisionEvent::Started(h1, h2, _) = event else {
                continue;
            };
            let (Some(a), Some(b)) = (self.marker_of(h1), self.marker_of(h2)) else {
                continue;
            };
            let (a, b) = (a.min(b), a.max(b));
            let relative_speed = match (before.get(&a), before.get(&b)) {
                (Some(va), Some(vb)) => (*vb - *va).length(),
                _ => 0.0,
            };
            if relative_speed > RIGID_CUE_MIN_SPEED {
                cues.push(CollisionCue { a, b, relative_speed });
            }
        }
        cues
    }

    fn write_back(&self, registry: &mut EntityRegistry, bounds: ContainerBounds) {
        for (id, handle) in &self.markers {
            let (Some(marker), Some(body)) = (registry.get_mut(*id), self.bodies.get(*handle)) else {
                continue;
            };
            marker.position = bounds.to_percent(from_rapier(body.translation()));
            marker.velocity = bounds.to_percent(from_rapier(body.linvel()) * RIGID_DT);
        }
    }

    fn clear_markers(&mut self) {
        for handle in std::mem::take(&mut self.markers).into_values() {
            self.remove_body(handle);
        }
    }

    #[cfg(test)]
    fn set_velocity(&mut self, id: MarkerId, vel: Vec2) {
        if let Some(body) = self.markers.get(&id).and_then(|h| self.bodies.get_mut(*h)) {
            body.set_linvel(to_rapier(vel), true);
        }
    }

    #[cfg(test)]
    fn total_kinetic_energy(&self) -> f32 {
        self.markers
            .keys()
            .filter_map(|id| self.body(*id))
            .map(|(_, vel)| 0.5 * vel.length_squared())
            .sum()
    }
}

impl MotionPhysics for RigidWorld {
    fn backend(&self) -> PhysicsBackend {
        PhysicsBackend::RigidBody
    }

    fn enable(&mut self, registry: &EntityRegistry, bounds: ContainerBounds) {
        self.clear_markers();
        self.sync(registry, bounds);
        log::info!(
            "Rigid world enabled: {} bodies in {}x{} arena",
            self.markers.len(),
            bounds.width,
            bounds.height
        );
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
        self.sync(registry, bounds);
        self.gravity = sample.planar() * RIGID_GRAVITY_GAIN * self.intensity + Vec2::new(0.0, self.gravity_bias);
        let cues = self.step();
        self.write_back(registry, bounds);
        cues
    }

    fn layout_grid(&mut self, registry: &mut EntityRegistry, bounds: ContainerBounds) {
        park_on_grid(registry);
        self.clear_markers();
        self.sync(registry, bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::registry::Placement;
    use crate::sim::state::MarkerColor;

    fn setup(bounds: ContainerBounds, at: &[Vec2]) -> (RigidWorld, EntityRegistry, Vec<MarkerId>) {
        let mut reg = EntityRegistry::new();
        let ids = at
            .iter()
            .map(|p| reg.create(Placement::percent(*p), MarkerColor::Yellow, bounds))
            .collect();
        let mut w = RigidWorld::new();
        w.enable(&reg, bounds);
        (w, reg, ids)
    }

    #[test]
    fn test_gravity_follows_sample() {
        let bounds = ContainerBounds::new(400.0, 400.0);
        let (mut w, mut reg, ids) = setup(bounds, &[Vec2::new(50.0, 50.0)]);

        w.apply_motion_sample(&mut reg, bounds, &MotionSample::new(0.0, 10.0, 0.0));
        assert!((w.gravity - Vec2::new(0.0, 3.0)).length() < 1e-5);
        assert!(reg.get(ids[0]).unwrap().position.y > 50.0);
    }

    #[test]
    fn test_amplified_gravity() {
        let bounds = ContainerBounds::new(400.0, 400.0);
        let (mut w, mut reg, _) = setup(bounds, &[Vec2::new(50.0, 50.0)]);
        w.amplify();
        w.apply_motion_sample(&mut reg, bounds, &MotionSample::new(10.0, 0.0, 0.0));
        assert!((w.gravity - Vec2::new(4.5, STRONG_GRAVITY_BIAS)).length() < 1e-5);
    }

    #[test]
    fn test_walls_contain_bodies() {
        let bounds = ContainerBounds::new(300.0, 300.0);
        let (mut w, mut reg, ids) = setup(bounds, &[Vec2::new(50.0, 50.0)]);
        for _ in 0..240 {
            w.apply_motion_sample(&mut reg, bounds, &MotionSample::new(15.0, 15.0, 0.0));
        }
        let (pos, _) = w.body(ids[0]).unwrap();
        let slack = 2.0;
        assert!(pos.x <= 270.0 + slack && pos.y <= 270.0 + slack, "{pos:?}");
        assert!(pos.x >= 30.0 - slack && pos.y >= 30.0 - slack, "{pos:?}");
        let stored = reg.get(ids[0]).unwrap().position;
        assert!(stored.x <= 100.0 && stored.y <= 100.0);
    }

    #[test]
    fn test_head_on_collision_loses_energy_and_cues_once() {
        let bounds = ContainerBounds::new(1000.0, 1000.0);
        let (mut w, mut reg, ids) = setup(bounds, &[Vec2::new(44.0, 50.0), Vec2::new(56.0, 50.0)]);
        w.set_velocity(ids[0], Vec2::new(600.0, 0.0));
        w.set_velocity(ids[1], Vec2::new(-600.0, 0.0));
        let before = w.total_kinetic_energy();

        let mut cues = Vec::new();
        for _ in 0..30 {
            cues.extend(w.apply_motion_sample(&mut reg, bounds, &MotionSample::default()));
        }
        assert_eq!(cues.len(), 1);
        assert_eq!((cues[0].a, cues[0].b), (ids[0], ids[1]));
        assert!(w.total_kinetic_energy() < before);
        let (_, va) = w.body(ids[0]).unwrap();
        let (_, vb) = w.body(ids[1]).unwrap();
        assert!(va.x < 0.0 && vb.x > 0.0);
    }

    #[test]
    fn test_slow_contact_is_silent() {
        let bounds = ContainerBounds::new(1000.0, 1000.0);
        let (mut w, mut reg, ids) = setup(bounds, &[Vec2::new(47.0, 50.0), Vec2::new(53.1, 50.0)]);
        w.set_velocity(ids[0], Vec2::new(60.0, 0.0));
        let mut cues = Vec::new();
        for _ in 0..10 {
            cues.extend(w.apply_motion_sample(&mut reg, bounds, &MotionSample::default()));
        }
        assert!(cues.is_empty());
    }

    #[test]
    fn test_removed_marker_loses_body() {
        let bounds = ContainerBounds::new(400.0, 400.0);
        let mut reg = EntityRegistry::new();
        reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds);
        let gone = reg.create(Placement::percent(Vec2::new(20.0, 20.0)), MarkerColor::Red, bounds);
        let mut w = RigidWorld::new();
        w.enable(&reg, bounds);
        assert_eq!(w.body_count(), 2);

        reg.remove(gone);
        w.apply_motion_sample(&mut reg, bounds, &MotionSample::default());
        assert_eq!(w.body_count(), 1);
        assert!(w.body(gone).is_none());
    }

    #[test]
    fn test_resize_keeps_stored_percentages() {
        let small = ContainerBounds::new(400.0, 400.0);
        let (mut w, mut reg, ids) = setup(small, &[Vec2::new(50.0, 50.0), Vec2::new(20.0, 30.0)]);
        w.apply_motion_sample(&mut reg, small, &MotionSample::default());

        let large = ContainerBounds::new(800.0, 800.0);
        w.apply_motion_sample(&mut reg, large, &MotionSample::default());
        assert!((reg.get(ids[0]).unwrap().position - Vec2::new(50.0, 50.0)).length() < 1e-2);
        assert!((reg.get(ids[1]).unwrap().position - Vec2::new(20.0, 30.0)).length() < 1e-2);
        let (pos, _) = w.body(ids[0]).unwrap();
        assert!((pos - Vec2::new(400.0, 400.0)).length() < 0.1);
    }

    #[test]
    fn test_grid_layout_resets_bodies() {
        let bounds = ContainerBounds::new(400.0, 400.0);
        let (mut w, mut reg, ids) = setup(bounds, &[Vec2::new(50.0, 50.0)]);
        w.apply_motion_sample(&mut reg, bounds, &MotionSample::new(25.0, 0.0, 0.0));

        w.layout_grid(&mut reg, bounds);
        let (pos, vel) = w.body(ids[0]).unwrap();
        assert_eq!(vel, Vec2::ZERO);
        assert!((pos - Vec2::new(80.0, 80.0)).length() < 1e-3);
        assert_eq!(reg.get(ids[0]).unwrap().position, crate::sim::physics::grid_slot(0));
    }
}
