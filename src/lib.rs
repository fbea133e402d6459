//! Press Here - a guided press, tilt and shake interaction
//!
//! Core modules:
//! - `sim`: Deterministic step machine, marker registry and physics
//! - `surface`: Render/audio capabilities the core drives
//! - `settings`: Persisted preferences
//! - `audio`: Browser clip playback (wasm32 only)

#[cfg(target_arch = "wasm32")]
pub mod audio;
pub mod settings;
pub mod sim;
pub mod surface;

pub use settings::{PhysicsBackend, Settings};
pub use sim::{InputEvent, Session};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Interaction tuning constants
pub mod consts {
    /// Rendered marker diameter in pixels
    pub const MARKER_SIZE_PX: f32 = 60.0;

    /// Side markers sit 1.5 spacings from the reference, spacing = 20% of width
    pub const SIDE_SPACING_FRACTION: f32 = 0.2;
    pub const SIDE_OFFSET_SPACINGS: f32 = 1.5;

    /// Vertical column slots relative to the anchor, in spacing units
    pub const COLUMN_SLOTS: [i32; 4] = [-2, -1, 1, 2];
    /// Column spacing as a percentage of container height
    pub const COLUMN_SPACING_PCT: f32 = 15.0;
    /// Markers closer than this horizontally share a column (pixels)
    pub const COLUMN_TOLERANCE_PX: f32 = 10.0;

    /// Clicks required by each counter step
    pub const COUNTER_TARGET: u32 = 5;

    /// Motion thresholds (m/s², device units)
    pub const SHAKE_THRESHOLD: f32 = 20.0;
    pub const STRONG_SHAKE_THRESHOLD: f32 = 30.0;
    pub const TILT_THRESHOLD: f32 = 3.0;
    /// Container rotation applied on tilt (degrees)
    pub const TILT_ANGLE_DEG: f32 = 10.0;

    /// Percentage-space displacement per unit of acceleration
    pub const DISPLACEMENT_GAIN: f32 = 0.5;
    pub const STRONG_INTENSITY: f32 = 1.5;
    /// Downward drift added once the strong shake has been performed (%/tick)
    pub const STRONG_GRAVITY_BIAS: f32 = 1.0;
    /// Keep-out margin around the container edge (%)
    pub const MARGIN_PCT: f32 = 5.0;
    /// Velocity retained on wall bounce and on collision exchange
    pub const DAMPING: f32 = 0.8;
    /// Relative speed (%/tick) above which a collision is audible
    pub const TICK_CUE_MIN_SPEED: f32 = 1.0;

    /// Rigid-body delegate
    pub const RIGID_DT: f32 = 1.0 / 60.0;
    pub const RIGID_RESTITUTION: f32 = 0.7;
    pub const RIGID_FRICTION: f32 = 0.05;
    pub const RIGID_AIR_FRICTION: f32 = 0.001;
    /// Acceleration sample → world gravity
    pub const RIGID_GRAVITY_GAIN: f32 = 0.3;
    /// One unit of world gravity in px/s²
    pub const RIGID_GRAVITY_PX: f32 = 1000.0;
    /// 5 px per 60 Hz step
    pub const RIGID_CUE_MIN_SPEED: f32 = 300.0;

    /// Grid layout
    pub const GRID_COLUMNS: usize = 3;
    pub const GRID_MIN_MARKERS: usize = 15;
    pub const GRID_ORIGIN_PCT: f32 = 20.0;
    pub const GRID_COLUMN_STEP_PCT: f32 = 30.0;
    pub const GRID_ROW_STEP_PCT: f32 = 15.0;
    pub const GRID_PAD_PCT: f32 = 10.0;

    /// Default reveal stagger per column slot (ms)
    pub const REVEAL_STAGGER_MS: u32 = 100;
}

/// Size of the marker container in Render Surface units (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerBounds {
    pub width: f32,
    pub height: f32,
}

impl ContainerBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Convert a container-relative pixel point to percentages.
    /// Degenerate axes map to 0%.
    pub fn to_percent(&self, px: Vec2) -> Vec2 {
        Vec2::new(ratio(px.x, self.width), ratio(px.y, self.height))
    }

    /// Convert a percentage point to container-relative pixels
    pub fn to_pixels(&self, pct: Vec2) -> Vec2 {
        Vec2::new(pct.x / 100.0 * self.width, pct.y / 100.0 * self.height)
    }

    /// Marker radius in horizontal percentage units
    pub fn marker_radius_pct(&self) -> f32 {
        ratio(consts::MARKER_SIZE_PX, self.width) / 2.0
    }

    /// Horizontal pixel distance expressed as a percentage of width
    pub fn width_pct(&self, px: f32) -> f32 {
        ratio(px, self.width)
    }
}

impl Default for ContainerBounds {
    fn default() -> Self {
        Self::new(400.0, 600.0)
    }
}

#[inline]
fn ratio(value: f32, extent: f32) -> f32 {
    if extent > 0.0 { value / extent * 100.0 } else { 0.0 }
}

/// Clamp a percentage point into the keep-out margin
#[inline]
pub fn clamp_to_margin(pos: Vec2) -> Vec2 {
    use consts::MARGIN_PCT;
    pos.clamp(Vec2::splat(MARGIN_PCT), Vec2::splat(100.0 - MARGIN_PCT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_round_trip_on_non_square_container() {
        let bounds = ContainerBounds::new(400.0, 800.0);
        let pct = bounds.to_percent(Vec2::new(100.0, 200.0));
        assert!((pct - Vec2::new(25.0, 25.0)).length() < 1e-4);
        assert!((bounds.to_pixels(pct) - Vec2::new(100.0, 200.0)).length() < 1e-3);
    }

    #[test]
    fn test_degenerate_bounds_do_not_divide_by_zero() {
        let bounds = ContainerBounds::new(0.0, 0.0);
        assert_eq!(bounds.to_percent(Vec2::new(30.0, 30.0)), Vec2::ZERO);
        assert_eq!(bounds.marker_radius_pct(), 0.0);
    }

    #[test]
    fn test_marker_radius_follows_width() {
        let bounds = ContainerBounds::new(600.0, 300.0);
        assert!((bounds.marker_radius_pct() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_clamp_to_margin() {
        let p = clamp_to_margin(Vec2::new(-10.0, 120.0));
        assert_eq!(p, Vec2::new(5.0, 95.0));
    }
}
