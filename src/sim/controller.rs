//! Step controller
//!
//! Every input event runs to completion against the current [`SessionState`]:
//! the active step's precondition is checked, the registry and physics are
//! updated, and at most one step transition happens. Events that do not fit
//! the step are dropped without touching state.

use std::fmt;
use std::time::Duration;

use glam::Vec2;
use serde::Serialize;

use super::motion::{MotionReading, MotionSample};
use super::physics::{self, MotionPhysics};
use super::registry::{EntityRegistry, Placement};
use super::state::{Binding, Marker, MarkerColor, MarkerId, MotionAccess, SessionState};
use crate::consts::*;
use crate::settings::Settings;
use crate::surface::{Capabilities, Instruction, MarkerSpawn, PAGE_BACKGROUND, SoundClip};
use crate::ContainerBounds;

/// External input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Click or press on a marker
    Click(MarkerId),
    /// Touch start or pointer hover on a marker
    Touch(MarkerId),
    /// Acceleration sample
    Motion(MotionSample),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Group counters for steps 5-7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Reference,
    Red,
    Blue,
}

impl Counter {
    fn binding(self) -> Binding {
        match self {
            Counter::Reference => Binding::ReferenceCounter,
            Counter::Red => Binding::RedCounter,
            Counter::Blue => Binding::BlueCounter,
        }
    }

    /// Color of the column spawned when the counter fills
    fn column(self) -> MarkerColor {
        match self {
            Counter::Reference => MarkerColor::Yellow,
            Counter::Red => MarkerColor::Red,
            Counter::Blue => MarkerColor::Blue,
        }
    }
}

/// One interaction session: state, markers and the physics layer
pub struct Session {
    pub state: SessionState,
    pub registry: EntityRegistry,
    physics: Box<dyn MotionPhysics>,
    reveal_stagger: Duration,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("markers", &self.registry.len())
            .field("physics", &self.physics.backend())
            .finish()
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    state: &'a SessionState,
    markers: Vec<&'a Marker>,
}

impl Session {
    /// Start a session: draws the reference marker at the container center
    pub fn new<C>(bounds: ContainerBounds, settings: &Settings, seed: u64, io: &mut C) -> Self
    where
        C: Capabilities + ?Sized,
    {
        let mut session = Self {
            state: SessionState::new(bounds),
            registry: EntityRegistry::new(),
            physics: physics::build(settings.physics, seed),
            reveal_stagger: Duration::from_millis(settings.reveal_stagger_ms as u64),
        };

        io.set_background(PAGE_BACKGROUND);
        session.spawn(Placement::percent(Vec2::splat(50.0)), MarkerColor::Yellow, Duration::ZERO, io);
        io.set_text(Instruction::PressYellow);
        log::info!("Session started ({} physics)", settings.physics.as_str());
        session
    }

    pub fn step(&self) -> u8 {
        self.state.step
    }

    pub fn reference(&self) -> Option<MarkerId> {
        self.registry.find_by_reference()
    }

    /// Instruction for the current step
    pub fn instruction(&self) -> Instruction {
        match self.state.step {
            1 => Instruction::PressYellow,
            2 => Instruction::PressAgain,
            3 => Instruction::TouchLeft,
            4 => Instruction::TouchRight,
            5 => Instruction::PressYellowFive,
            6 => Instruction::PressRedFive,
            7 => Instruction::PressBlueFive,
            8 => Instruction::Shake,
            9 => Instruction::ShakeHarder,
            10 => Instruction::TiltLeft,
            11 => Instruction::TiltRight,
            12 => Instruction::ShakeToArrange,
            _ if self.state.completed => Instruction::Complete,
            _ => Instruction::PressAllYellow,
        }
    }

    /// Record the platform's motion permission answer
    pub fn set_motion_permission(&mut self, granted: bool) {
        self.state.motion_access = if granted { MotionAccess::Granted } else { MotionAccess::Denied };
        if granted {
            log::info!("Motion input granted");
        } else {
            log::warn!("Motion input denied; shake and tilt steps are unreachable");
        }
    }

    /// Audio could not start: nudge the user, leave the step alone
    pub fn notify_audio_unavailable<C>(&mut self, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        log::warn!("Audio unavailable at step {}", self.state.step);
        io.set_text(Instruction::AudioRetry);
    }

    /// Container resized. Stored percentages stay valid.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.state.container_bounds = ContainerBounds::new(width, height);
        log::debug!("Container resized to {}x{}", width, height);
    }

    /// Serialized state and markers for diagnostics
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Snapshot {
            state: &self.state,
            markers: self.registry.iter().collect(),
        })
    }

    /// Dispatch one input event
    pub fn handle<C>(&mut self, event: InputEvent, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        match event {
            InputEvent::Click(id) => self.on_marker(id, Binding::Press, io),
            InputEvent::Touch(id) => self.on_marker(id, Binding::Touch, io),
            InputEvent::Motion(sample) => self.on_motion(&sample, io),
        }
    }

    // === Marker input ===

    fn on_marker<C>(&mut self, id: MarkerId, binding: Binding, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        if !self.registry.is_bound(id, binding) {
            log::debug!("Ignoring {:?} on unbound or stale {}", binding, id);
            return;
        }
        let is_click = binding == Binding::Press;

        let accepted = match self.state.step {
            1 | 2 if is_click && self.is_reference(id) => self.spawn_side_marker(io),
            3 => self.recolor_side(id, Side::Left, MarkerColor::Red, io),
            4 => self.recolor_side(id, Side::Right, MarkerColor::Blue, io),
            5 if is_click => self.count(id, Counter::Reference, io),
            6 if is_click => self.count(id, Counter::Red, io),
            7 if is_click => self.count(id, Counter::Blue, io),
            14 if is_click => self.cover(id, io),
            _ => false,
        };

        if !accepted {
            log::debug!("{:?} on {} does not apply at step {}", binding, id, self.state.step);
        } else if is_click {
            self.registry.record_click(id);
        }
    }

    fn is_reference(&self, id: MarkerId) -> bool {
        self.registry.get(id).is_some_and(|m| m.is_reference)
    }

    /// Steps 1-2: Yellow markers left, then right, of the reference
    fn spawn_side_marker<C>(&mut self, io: &mut C) -> bool
    where
        C: Capabilities + ?Sized,
    {
        let Some(reference) = self.reference().and_then(|id| self.registry.get(id)) else {
            return false;
        };
        let offset = SIDE_SPACING_FRACTION * 100.0 * SIDE_OFFSET_SPACINGS;
        let (dx, next, text) = if self.state.step == 1 {
            (-offset, 2, Instruction::PressAgain)
        } else {
            (offset, 3, Instruction::TouchLeft)
        };
        let at = reference.position + Vec2::new(dx, 0.0);

        io.play(SoundClip::Press);
        self.spawn(Placement::percent(at), MarkerColor::Yellow, Duration::ZERO, io);
        io.set_text(text);
        self.state.advance_to(next);
        true
    }

    /// Which side of the reference a marker is on, right now
    fn side_of(&self, id: MarkerId) -> Option<Side> {
        let reference = self.registry.get(self.reference()?)?;
        let x = self.registry.get(id)?.position.x;
        if x < reference.position.x {
            Some(Side::Left)
        } else if x > reference.position.x {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Steps 3-4: recolor the Yellow marker on the required side
    fn recolor_side<C>(&mut self, id: MarkerId, side: Side, color: MarkerColor, io: &mut C) -> bool
    where
        C: Capabilities + ?Sized,
    {
        let is_yellow = self.registry.get(id).is_some_and(|m| m.color == MarkerColor::Yellow);
        if !is_yellow || self.side_of(id) != Some(side) {
            return false;
        }

        io.play(SoundClip::Press);
        self.recolor(id, color, io);

        if side == Side::Left {
            io.set_text(Instruction::TouchRight);
            self.state.advance_to(4);
        } else {
            io.set_text(Instruction::PressYellowFive);
            self.state.yellow_clicks = 0;
            if let Some(reference) = self.reference() {
                self.registry.bind(reference, Binding::ReferenceCounter);
            }
            self.state.advance_to(5);
        }
        true
    }

    /// Steps 5-7: five clicks across a group spawn that group's column
    fn count<C>(&mut self, id: MarkerId, counter: Counter, io: &mut C) -> bool
    where
        C: Capabilities + ?Sized,
    {
        if !self.registry.is_bound(id, counter.binding()) {
            return false;
        }
        let tally = match counter {
            Counter::Reference => &mut self.state.yellow_clicks,
            Counter::Red => &mut self.state.red_clicks,
            Counter::Blue => &mut self.state.blue_clicks,
        };
        *tally += 1;
        let clicks = *tally;

        io.play(SoundClip::Press);
        if let Some(marker) = self.registry.get(id) {
            io.show_counter(marker.position, clicks);
        }
        if clicks < COUNTER_TARGET {
            return true;
        }

        self.registry.unbind_all(counter.binding());
        self.spawn_column(counter.column(), io);

        match counter {
            Counter::Reference => {
                self.state.red_clicks = 0;
                self.arm(MarkerColor::Red, Binding::RedCounter);
                io.set_text(Instruction::PressRedFive);
                self.state.advance_to(6);
            }
            Counter::Red => {
                self.state.blue_clicks = 0;
                self.arm(MarkerColor::Blue, Binding::BlueCounter);
                io.set_text(Instruction::PressBlueFive);
                self.state.advance_to(7);
            }
            Counter::Blue => {
                self.state.motion_enabled = true;
                if self.state.motion_access == MotionAccess::Denied {
                    log::warn!("Motion enabled but permission was denied");
                }
                io.set_text(Instruction::Shake);
                self.state.advance_to(8);
            }
        }
        true
    }

    /// Bind a counter to every marker currently of `color`
    fn arm(&mut self, color: MarkerColor, binding: Binding) {
        for id in self.registry.query_by_color(color) {
            self.registry.bind(id, binding);
        }
    }

    /// Step 14: every grid Yellow clicked at least once
    fn cover<C>(&mut self, id: MarkerId, io: &mut C) -> bool
    where
        C: Capabilities + ?Sized,
    {
        if !self.registry.unbind(id, Binding::GridCoverage) {
            return false;
        }
        self.state.final_clicks += 1;
        io.play(SoundClip::Press);
        if let Some(marker) = self.registry.get(id) {
            io.show_counter(marker.position, self.state.final_clicks);
        }

        if self.registry.bound_to(Binding::GridCoverage).is_empty() && !self.state.completed {
            self.state.completed = true;
            io.play(SoundClip::Light);
            io.set_text(Instruction::Complete);
            log::info!("All {} grid yellows covered", self.state.final_clicks);
        }
        true
    }

    // === Motion input ===

    fn on_motion<C>(&mut self, sample: &MotionSample, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        if !self.state.accepts_motion() {
            return;
        }
        let reading = sample.classify();
        self.advance_on_motion(&reading, io);

        if self.state.physics_enabled && (9..=12).contains(&self.state.step) {
            let cues = self.physics.apply_motion_sample(&mut self.registry, self.state.container_bounds, sample);
            for cue in &cues {
                log::debug!("{} hit {} at {:.2}", cue.a, cue.b, cue.relative_speed);
                io.play(SoundClip::Collision);
            }
            self.sync_positions(io);
        }
    }

    fn advance_on_motion<C>(&mut self, reading: &MotionReading, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        match self.state.step {
            8 if reading.is_shake() => {
                log::info!("Shake detected ({:.1})", reading.magnitude);
                self.physics.enable(&self.registry, self.state.container_bounds);
                self.state.physics_enabled = true;
                io.set_text(Instruction::ShakeHarder);
                self.state.advance_to(9);
            }
            9 if reading.is_strong_shake() => {
                log::info!("Strong shake detected ({:.1})", reading.magnitude);
                self.physics.amplify();
                self.state.amplified = true;
                io.set_text(Instruction::TiltLeft);
                self.state.advance_to(10);
            }
            10 if reading.tilt_left() => {
                self.rotate(-TILT_ANGLE_DEG, io);
                io.set_text(Instruction::TiltRight);
                self.state.advance_to(11);
            }
            11 if reading.tilt_right() => {
                self.rotate(TILT_ANGLE_DEG, io);
                io.set_text(Instruction::ShakeToArrange);
                self.state.advance_to(12);
            }
            12 if reading.is_shake() => self.arrange_grid(io),
            _ => {}
        }
    }

    fn rotate<C>(&mut self, degrees: f32, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        self.state.rotation_deg = degrees;
        io.rotate(degrees);
    }

    /// Step 12 → 13 → 14: straighten the container and park markers on a
    /// red/yellow/blue grid, padding to fifteen markers
    fn arrange_grid<C>(&mut self, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        self.state.advance_to(13);
        self.rotate(0.0, io);

        while self.registry.len() < GRID_MIN_MARKERS {
            let color = MarkerColor::cycled(self.registry.len());
            self.spawn(Placement::percent(Vec2::splat(GRID_PAD_PCT)), color, Duration::ZERO, io);
        }
        for (index, id) in self.registry.ids().into_iter().enumerate() {
            self.recolor(id, MarkerColor::cycled(index), io);
        }
        self.physics.layout_grid(&mut self.registry, self.state.container_bounds);
        self.sync_positions(io);

        self.registry.unbind_all(Binding::GridCoverage);
        self.arm(MarkerColor::Yellow, Binding::GridCoverage);
        self.state.final_clicks = 0;

        io.set_text(Instruction::PressAllYellow);
        self.state.advance_to(14);
    }

    // === Registry + surface bookkeeping ===

    fn spawn<C>(&mut self, placement: Placement, color: MarkerColor, reveal_after: Duration, io: &mut C) -> MarkerId
    where
        C: Capabilities + ?Sized,
    {
        let id = self.registry.create(placement, color, self.state.container_bounds);
        if let Some(marker) = self.registry.get_mut(id) {
            let handle = io.create_marker(&MarkerSpawn {
                id,
                position: marker.position,
                color,
                reveal_after,
            });
            marker.handle = Some(handle);
        }
        id
    }

    fn despawn<C>(&mut self, id: MarkerId, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        if let Some(handle) = self.registry.remove(id).and_then(|m| m.handle) {
            io.remove_marker(handle);
        }
    }

    fn recolor<C>(&mut self, id: MarkerId, color: MarkerColor, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        if !self.registry.recolor(id, color) {
            return;
        }
        if let Some(handle) = self.registry.get(id).and_then(|m| m.handle) {
            io.recolor_marker(handle, color);
        }
    }

    /// Vertical column through the first marker of `color`. Same-colored
    /// markers already in that column are replaced.
    fn spawn_column<C>(&mut self, color: MarkerColor, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        let members = self.registry.query_by_color(color);
        let Some(anchor) = members.first().and_then(|id| self.registry.get(*id)) else {
            log::warn!("No {} marker to anchor a column", color.as_str());
            return;
        };
        let anchor_id = anchor.id;
        let origin = anchor.position;
        let tolerance = self.state.container_bounds.width_pct(COLUMN_TOLERANCE_PX);

        let stale: Vec<MarkerId> = members
            .iter()
            .copied()
            .filter(|id| *id != anchor_id)
            .filter(|id| {
                self.registry
                    .get(*id)
                    .is_some_and(|m| (m.position.x - origin.x).abs() < tolerance)
            })
            .collect();
        for id in stale {
            self.despawn(id, io);
        }

        for slot in COLUMN_SLOTS {
            let at = origin + Vec2::new(0.0, slot as f32 * COLUMN_SPACING_PCT);
            let reveal_after = self.reveal_stagger * slot.unsigned_abs();
            self.spawn(Placement::percent(at), color, reveal_after, io);
        }
    }

    fn sync_positions<C>(&self, io: &mut C)
    where
        C: Capabilities + ?Sized,
    {
        for marker in self.registry.iter() {
            if let Some(handle) = marker.handle {
                io.move_marker(handle, marker.position);
            }
        }
    }
}
