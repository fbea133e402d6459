//! Marker and session state
//!
//! Everything the step machine reads or writes between events lives here.
//! Positions are percentages of the container so layout stays
//! resolution-independent.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::ContainerBounds;

/// Stable marker identifier (allocated in creation order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u32);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Opaque handle issued by the Render Surface for a drawn marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

/// Marker color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerColor {
    Yellow,
    Red,
    Blue,
}

impl MarkerColor {
    /// Repeating order used by the grid layout
    pub const GRID_CYCLE: [MarkerColor; 3] = [MarkerColor::Red, MarkerColor::Yellow, MarkerColor::Blue];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerColor::Yellow => "yellow",
            MarkerColor::Red => "red",
            MarkerColor::Blue => "blue",
        }
    }

    /// Color at a position of the red/yellow/blue cycle
    pub fn cycled(index: usize) -> Self {
        Self::GRID_CYCLE[index % Self::GRID_CYCLE.len()]
    }
}

/// Input subscriptions a marker can carry.
///
/// Bindings are owned by the registry entry, so removing a marker drops
/// every handler attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Binding {
    /// Plain click/press
    Press,
    /// Touch start or pointer hover
    Touch,
    /// Reference marker five-click counter (step 5)
    ReferenceCounter,
    /// Red group five-click counter (step 6)
    RedCounter,
    /// Blue group five-click counter (step 7)
    BlueCounter,
    /// Yellow grid marker not yet clicked (step 14)
    GridCoverage,
}

/// A visual marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub color: MarkerColor,
    /// Center, in percent of container (x of width, y of height)
    pub position: Vec2,
    /// Percent per tick; only meaningful once physics is active
    pub velocity: Vec2,
    pub click_count: u32,
    pub is_reference: bool,
    /// Surface handle once drawn
    #[serde(skip)]
    pub handle: Option<SurfaceHandle>,
}

impl Marker {
    pub fn new(id: MarkerId, color: MarkerColor, position: Vec2) -> Self {
        Self {
            id,
            color,
            position,
            velocity: Vec2::ZERO,
            click_count: 0,
            is_reference: false,
            handle: None,
        }
    }
}

/// Platform motion permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionAccess {
    /// Not asked yet
    #[default]
    Pending,
    Granted,
    Denied,
}

/// Process-wide session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Current step (1-based, never decreases)
    pub step: u8,
    /// Reference marker clicks while armed (step 5)
    pub yellow_clicks: u32,
    /// Aggregate red clicks while armed (step 6)
    pub red_clicks: u32,
    /// Aggregate blue clicks while armed (step 7)
    pub blue_clicks: u32,
    /// Distinct yellow grid markers clicked (step 14)
    pub final_clicks: u32,
    /// Motion samples are consumed (set on reaching step 8)
    pub motion_enabled: bool,
    pub motion_access: MotionAccess,
    pub physics_enabled: bool,
    /// Strong shake performed; physics runs amplified
    pub amplified: bool,
    /// Container rotation in degrees
    pub rotation_deg: f32,
    /// All grid yellows covered
    pub completed: bool,
    pub container_bounds: ContainerBounds,
}

impl SessionState {
    pub fn new(container_bounds: ContainerBounds) -> Self {
        Self {
            step: 1,
            yellow_clicks: 0,
            red_clicks: 0,
            blue_clicks: 0,
            final_clicks: 0,
            motion_enabled: false,
            motion_access: MotionAccess::Pending,
            physics_enabled: false,
            amplified: false,
            rotation_deg: 0.0,
            completed: false,
            container_bounds,
        }
    }

    /// Advance to `next`. Steps never go backwards.
    pub fn advance_to(&mut self, next: u8) {
        if next > self.step {
            log::info!("Step {} -> {}", self.step, next);
            self.step = next;
        }
    }

    /// Motion samples are acted upon
    pub fn accepts_motion(&self) -> bool {
        self.motion_enabled && self.motion_access == MotionAccess::Granted
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(ContainerBounds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_at_step_one() {
        let state = SessionState::default();
        assert_eq!(state.step, 1);
        assert!(!state.physics_enabled);
        assert!(!state.accepts_motion());
    }

    #[test]
    fn test_advance_never_goes_backwards() {
        let mut state = SessionState::default();
        state.advance_to(6);
        state.advance_to(3);
        assert_eq!(state.step, 6);
    }

    #[test]
    fn test_motion_needs_grant_and_enable() {
        let mut state = SessionState::default();
        state.motion_enabled = true;
        assert!(!state.accepts_motion());
        state.motion_access = MotionAccess::Granted;
        assert!(state.accepts_motion());
        state.motion_access = MotionAccess::Denied;
        assert!(!state.accepts_motion());
    }

    #[test]
    fn test_grid_cycle() {
        assert_eq!(MarkerColor::cycled(0), MarkerColor::Red);
        assert_eq!(MarkerColor::cycled(4), MarkerColor::Yellow);
        assert_eq!(MarkerColor::cycled(5), MarkerColor::Blue);
    }
}
