//! Interaction settings and preferences
//!
//! Persisted in LocalStorage on the web; natively the defaults apply.

use serde::{Deserialize, Serialize};

use crate::consts::REVEAL_STAGGER_MS;

/// Which physics layer animates the markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PhysicsBackend {
    /// Per-sample displacement with pairwise velocity exchange
    #[default]
    Simplified,
    /// Walled arena of circular rigid bodies
    RigidBody,
}

impl PhysicsBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicsBackend::Simplified => "Simplified",
            PhysicsBackend::RigidBody => "RigidBody",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simplified" | "simple" | "tick" => Some(PhysicsBackend::Simplified),
            "rigidbody" | "rigid" => Some(PhysicsBackend::RigidBody),
            _ => None,
        }
    }
}

/// Preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub physics: PhysicsBackend,

    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    pub muted: bool,

    // === Feedback ===
    /// Vibration pulse when the instruction text changes
    pub haptics: bool,
    /// Delay between column markers appearing (ms per slot)
    pub reveal_stagger_ms: u32,

    // === Accessibility ===
    /// Skip the container rotation animation (steps still advance)
    pub reduced_motion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            physics: PhysicsBackend::Simplified,
            master_volume: 0.8,
            muted: false,
            haptics: true,
            reveal_stagger_ms: REVEAL_STAGGER_MS,
            reduced_motion: false,
        }
    }
}

impl Settings {
    /// Volume after mute
    pub fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.master_volume.clamp(0.0, 1.0) }
    }

    /// Parse stored JSON, falling back to defaults
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring stored settings: {}", e);
                Self::default()
            }
        }
    }

    /// Apply `physics=<backend>` from a URL query string such as
    /// `?physics=rigid&x=1`. Returns true when the backend changed.
    pub fn apply_query(&mut self, query: &str) -> bool {
        let query = query.strip_prefix('?').unwrap_or(query);
        let Some(value) = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(key, value)| (key == "physics").then_some(value))
        else {
            return false;
        };

        match PhysicsBackend::from_str(value) {
            Some(backend) if backend != self.physics => {
                log::info!("Physics backend set to {} from the page URL", backend.as_str());
                self.physics = backend;
                true
            }
            Some(_) => false,
            None => {
                log::warn!("Unknown physics backend {:?} in the page URL", value);
                false
            }
        }
    }

    /// LocalStorage key
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "press_here_settings";

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                log::info!("Loaded settings from LocalStorage");
                return Self::from_json(&json);
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Settings saved");
            }
        }
    }

    /// Native stubs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        Self::default()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // No-op for native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(PhysicsBackend::from_str("Rigid"), Some(PhysicsBackend::RigidBody));
        assert_eq!(PhysicsBackend::from_str("tick"), Some(PhysicsBackend::Simplified));
        assert_eq!(PhysicsBackend::from_str("matter"), None);
        assert_eq!(PhysicsBackend::RigidBody.as_str(), "RigidBody");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(r#"{"physics":"RigidBody","muted":true}"#);
        assert_eq!(settings.physics, PhysicsBackend::RigidBody);
        assert!(settings.muted);
        assert_eq!(settings.reveal_stagger_ms, REVEAL_STAGGER_MS);
        assert_eq!(settings.effective_volume(), 0.0);
    }

    #[test]
    fn test_query_overrides_backend() {
        let mut settings = Settings::default();
        assert!(settings.apply_query("?lang=en&physics=rigid"));
        assert_eq!(settings.physics, PhysicsBackend::RigidBody);

        // Same backend again is not a change
        assert!(!settings.apply_query("physics=RigidBody"));
        assert!(settings.apply_query("physics=simple"));
        assert_eq!(settings.physics, PhysicsBackend::Simplified);
    }

    #[test]
    fn test_query_without_known_backend_is_ignored() {
        let mut settings = Settings::default();
        for query in ["", "?", "?physics", "?physics=matter", "?phys=rigid"] {
            assert!(!settings.apply_query(query), "{query}");
            assert_eq!(settings.physics, PhysicsBackend::Simplified);
        }
    }

    #[test]
    fn test_garbage_json_uses_defaults() {
        let settings = Settings::from_json("not json");
        assert_eq!(settings.physics, PhysicsBackend::Simplified);
        assert!((settings.effective_volume() - 0.8).abs() < 1e-6);
    }
}
