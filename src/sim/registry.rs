//! Entity registry
//!
//! Owns every marker plus the input bindings attached to it. Ids are
//! allocated monotonically, so iteration over the map is creation order.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use glam::Vec2;
use thiserror::Error;

use super::state::{Binding, Marker, MarkerColor, MarkerId};
use crate::ContainerBounds;

/// Failure to read a position string
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("empty coordinate")]
    Empty,

    #[error("unparseable coordinate {0:?}")]
    Invalid(String),

    #[error("coordinate {0:?} is not finite")]
    NotFinite(String),
}

/// One axis of a placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coord {
    /// Container-relative pixels
    Px(f32),
    /// Percent of the container extent
    Pct(f32),
}

impl Coord {
    fn to_percent(self, extent: f32) -> f32 {
        match self {
            Coord::Pct(v) => v,
            Coord::Px(v) if extent > 0.0 => v / extent * 100.0,
            Coord::Px(_) => 0.0,
        }
    }
}

impl FromStr for Coord {
    type Err = PlacementError;

    /// Accepts `"12.5%"`, `"30px"` or a bare pixel number
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PlacementError::Empty);
        }
        let (number, pct) = if let Some(n) = s.strip_suffix('%') {
            (n, true)
        } else if let Some(n) = s.strip_suffix("px") {
            (n, false)
        } else {
            (s, false)
        };
        let value: f32 = number
            .trim()
            .parse()
            .map_err(|_| PlacementError::Invalid(s.to_string()))?;
        if !value.is_finite() {
            return Err(PlacementError::NotFinite(s.to_string()));
        }
        Ok(if pct { Coord::Pct(value) } else { Coord::Px(value) })
    }
}

/// Where to put a new marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: Coord,
    pub y: Coord,
}

impl Placement {
    pub fn pixels(at: Vec2) -> Self {
        Self { x: Coord::Px(at.x), y: Coord::Px(at.y) }
    }

    pub fn percent(at: Vec2) -> Self {
        Self { x: Coord::Pct(at.x), y: Coord::Pct(at.y) }
    }

    /// Parse a pair of position strings such as `("20%", "35%")`
    pub fn parse(x: &str, y: &str) -> Result<Self, PlacementError> {
        Ok(Self { x: x.parse()?, y: y.parse()? })
    }

    /// Percentage-of-container point
    pub fn normalize(&self, bounds: ContainerBounds) -> Vec2 {
        Vec2::new(self.x.to_percent(bounds.width), self.y.to_percent(bounds.height))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    marker: Marker,
    bindings: BTreeSet<Binding>,
}

/// Markers by id
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entries: BTreeMap<MarkerId, Entry>,
    next_id: u32,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), next_id: 1 }
    }

    /// Create a marker. The first Yellow marker created becomes the reference.
    /// New markers accept presses and touches.
    pub fn create(&mut self, placement: Placement, color: MarkerColor, bounds: ContainerBounds) -> MarkerId {
        let id = MarkerId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        let mut marker = Marker::new(id, color, placement.normalize(bounds));
        if color == MarkerColor::Yellow && self.find_by_reference().is_none() {
            marker.is_reference = true;
        }
        log::debug!(
            "Created {} {} at ({:.1}%, {:.1}%){}",
            color.as_str(),
            id,
            marker.position.x,
            marker.position.y,
            if marker.is_reference { " [reference]" } else { "" }
        );

        let bindings = BTreeSet::from([Binding::Press, Binding::Touch]);
        self.entries.insert(id, Entry { marker, bindings });
        id
    }

    /// Returns false if the marker no longer exists
    pub fn recolor(&mut self, id: MarkerId, color: MarkerColor) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.marker.color = color;
                true
            }
            None => false,
        }
    }

    /// Remove a marker and every binding on it. Absent ids are a no-op.
    /// The reference marker is never removed.
    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        if self.entries.get(&id).is_some_and(|e| e.marker.is_reference) {
            log::warn!("Refusing to remove reference {}", id);
            return None;
        }
        self.entries.remove(&id).map(|entry| {
            log::debug!("Removed {} ({} bindings dropped)", id, entry.bindings.len());
            entry.marker
        })
    }

    pub fn find_by_reference(&self) -> Option<MarkerId> {
        self.entries
            .values()
            .find(|e| e.marker.is_reference)
            .map(|e| e.marker.id)
    }

    /// Ids of a color in creation order
    pub fn query_by_color(&self, color: MarkerColor) -> Vec<MarkerId> {
        self.entries
            .values()
            .filter(|e| e.marker.color == color)
            .map(|e| e.marker.id)
            .collect()
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.entries.get(&id).map(|e| &e.marker)
    }

    pub fn get_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.entries.get_mut(&id).map(|e| &mut e.marker)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Ids in creation order
    pub fn ids(&self) -> Vec<MarkerId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.entries.values().map(|e| &e.marker)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Marker> {
        self.entries.values_mut().map(|e| &mut e.marker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Increment a marker's click count, returning the new value
    pub fn record_click(&mut self, id: MarkerId) -> Option<u32> {
        let marker = self.get_mut(id)?;
        marker.click_count += 1;
        Some(marker.click_count)
    }

    /// Attach a binding. Returns false for absent markers.
    pub fn bind(&mut self, id: MarkerId, binding: Binding) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.bindings.insert(binding);
                true
            }
            None => false,
        }
    }

    /// Detach a binding; returns whether it was attached
    pub fn unbind(&mut self, id: MarkerId, binding: Binding) -> bool {
        self.entries
            .get_mut(&id)
            .is_some_and(|entry| entry.bindings.remove(&binding))
    }

    /// Detach a binding from every marker
    pub fn unbind_all(&mut self, binding: Binding) {
        for entry in self.entries.values_mut() {
            entry.bindings.remove(&binding);
        }
    }

    pub fn is_bound(&self, id: MarkerId, binding: Binding) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.bindings.contains(&binding))
    }

    /// Markers currently carrying a binding
    pub fn bound_to(&self, binding: Binding) -> Vec<MarkerId> {
        self.entries
            .values()
            .filter(|e| e.bindings.contains(&binding))
            .map(|e| e.marker.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> ContainerBounds {
        ContainerBounds::new(400.0, 800.0)
    }

    #[test]
    fn test_first_yellow_becomes_reference() {
        let mut reg = EntityRegistry::new();
        let red = reg.create(Placement::percent(Vec2::new(10.0, 10.0)), MarkerColor::Red, bounds());
        let first = reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        let second = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Yellow, bounds());

        assert!(!reg.get(red).unwrap().is_reference);
        assert_eq!(reg.find_by_reference(), Some(first));
        assert!(!reg.get(second).unwrap().is_reference);
        assert_eq!(reg.iter().filter(|m| m.is_reference).count(), 1);
    }

    #[test]
    fn test_pixel_placement_is_stored_as_percent() {
        let mut reg = EntityRegistry::new();
        let id = reg.create(Placement::pixels(Vec2::new(100.0, 200.0)), MarkerColor::Yellow, bounds());
        let pos = reg.get(id).unwrap().position;
        assert!((pos - Vec2::new(25.0, 25.0)).length() < 1e-4);
    }

    #[test]
    fn test_parse_percent_and_pixel_strings() {
        let p = Placement::parse("20%", " 35.5% ").unwrap();
        assert_eq!(p, Placement::percent(Vec2::new(20.0, 35.5)));

        let p = Placement::parse("40px", "80").unwrap();
        assert_eq!(p.normalize(bounds()), Vec2::new(10.0, 10.0));

        assert_eq!(Placement::parse("", "1%"), Err(PlacementError::Empty));
        assert!(matches!(Placement::parse("abc%", "1%"), Err(PlacementError::Invalid(_))));
        assert!(matches!(Placement::parse("inf", "1%"), Err(PlacementError::NotFinite(_))));
    }

    #[test]
    fn test_query_by_color_in_creation_order() {
        let mut reg = EntityRegistry::new();
        let a = reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        let b = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Red, bounds());
        let c = reg.create(Placement::percent(Vec2::new(80.0, 50.0)), MarkerColor::Yellow, bounds());
        assert_eq!(reg.query_by_color(MarkerColor::Yellow), vec![a, c]);
        assert_eq!(reg.query_by_color(MarkerColor::Red), vec![b]);

        reg.recolor(c, MarkerColor::Red);
        assert_eq!(reg.query_by_color(MarkerColor::Red), vec![b, c]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut reg = EntityRegistry::new();
        reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        let id = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Yellow, bounds());

        assert!(reg.remove(id).is_some());
        let len = reg.len();
        assert!(reg.remove(id).is_none());
        assert!(reg.remove(id).is_none());
        assert!(reg.remove(MarkerId(999)).is_none());
        assert_eq!(reg.len(), len);
    }

    #[test]
    fn test_reference_cannot_be_removed() {
        let mut reg = EntityRegistry::new();
        let id = reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        assert!(reg.remove(id).is_none());
        assert_eq!(reg.find_by_reference(), Some(id));
    }

    #[test]
    fn test_bindings_die_with_marker() {
        let mut reg = EntityRegistry::new();
        reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        let id = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Red, bounds());

        assert!(reg.is_bound(id, Binding::Press));
        assert!(reg.bind(id, Binding::RedCounter));
        reg.remove(id);
        assert!(!reg.is_bound(id, Binding::RedCounter));
        assert!(reg.bound_to(Binding::RedCounter).is_empty());
        assert!(!reg.bind(id, Binding::RedCounter));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut reg = EntityRegistry::new();
        reg.create(Placement::percent(Vec2::new(50.0, 50.0)), MarkerColor::Yellow, bounds());
        let a = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Blue, bounds());
        reg.remove(a);
        let b = reg.create(Placement::percent(Vec2::new(20.0, 50.0)), MarkerColor::Blue, bounds());
        assert!(b > a);
    }
}
