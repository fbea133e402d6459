//! Motion input classification
//!
//! Raw device samples may omit axes (or report garbage); every missing or
//! non-finite component reads as zero.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::{SHAKE_THRESHOLD, STRONG_SHAKE_THRESHOLD, TILT_THRESHOLD};

/// One acceleration sample as delivered by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl MotionSample {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x: Some(x), y: Some(y), z: Some(z) }
    }

    /// Sample with only a horizontal component (tilt tests, partial sensors)
    pub fn tilt(x: f32) -> Self {
        Self { x: Some(x), y: None, z: None }
    }

    /// Components with missing/malformed axes zeroed
    pub fn vector(&self) -> Vec3 {
        Vec3::new(axis(self.x), axis(self.y), axis(self.z))
    }

    /// Screen-plane components
    pub fn planar(&self) -> Vec2 {
        self.vector().truncate()
    }

    pub fn classify(&self) -> MotionReading {
        let v = self.vector();
        MotionReading { magnitude: v.length(), tilt: v.x }
    }
}

#[inline]
fn axis(v: Option<f32>) -> f32 {
    v.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Classified sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReading {
    /// Euclidean norm of all three axes
    pub magnitude: f32,
    /// Raw x-axis component
    pub tilt: f32,
}

impl MotionReading {
    pub fn is_shake(&self) -> bool {
        self.magnitude > SHAKE_THRESHOLD
    }

    pub fn is_strong_shake(&self) -> bool {
        self.magnitude > STRONG_SHAKE_THRESHOLD
    }

    pub fn tilt_left(&self) -> bool {
        self.tilt < -TILT_THRESHOLD
    }

    pub fn tilt_right(&self) -> bool {
        self.tilt > TILT_THRESHOLD
    }
}
