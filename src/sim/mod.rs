//! Deterministic interaction core
//!
//! Everything the book does lives here, free of DOM and audio:
//! - Positions are container percentages
//! - Seeded RNG only
//! - Stable iteration order (by marker ID)
//! - Output goes through the capabilities in [`crate::surface`]

pub mod collision;
pub mod controller;
pub mod motion;
pub mod physics;
pub mod registry;
pub mod rigid;
pub mod state;

pub use collision::{CollisionResult, circle_circle_collision};
pub use controller::{InputEvent, Session};
pub use motion::{MotionReading, MotionSample};
pub use physics::{CollisionCue, MotionPhysics, TickIntegrator, grid_slot};
pub use registry::{Coord, EntityRegistry, Placement, PlacementError};
pub use rigid::RigidWorld;
pub use state::{Binding, Marker, MarkerColor, MarkerId, MotionAccess, SessionState, SurfaceHandle};
