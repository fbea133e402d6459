//! Capabilities driven by the step machine
//!
//! The core never touches the DOM or an audio device directly. It talks to
//! a [`RenderSurface`] in container percentages and to [`AudioFeedback`] by
//! clip id.

use std::time::Duration;

use glam::Vec2;

use crate::sim::state::{MarkerColor, MarkerId, SurfaceHandle};

/// Sound clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundClip {
    /// Marker press
    Press,
    /// Completion chime
    Light,
    /// Markers knocking together
    Collision,
}

impl SoundClip {
    pub const ALL: [SoundClip; 3] = [SoundClip::Press, SoundClip::Light, SoundClip::Collision];

    /// Asset path relative to the page
    pub fn path(&self) -> &'static str {
        match self {
            SoundClip::Press => "./press.mp3",
            SoundClip::Light => "./light.mp3",
            SoundClip::Collision => "./collision.mp3",
        }
    }
}

/// Page background at session start
pub const PAGE_BACKGROUND: &str = "#fff";

/// Instruction shown above the markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    PressYellow,
    PressAgain,
    TouchLeft,
    TouchRight,
    PressYellowFive,
    PressRedFive,
    PressBlueFive,
    Shake,
    ShakeHarder,
    TiltLeft,
    TiltRight,
    ShakeToArrange,
    PressAllYellow,
    Complete,
    AudioRetry,
}

impl Instruction {
    pub fn text(&self) -> &'static str {
        match self {
            Instruction::PressYellow => "Press this yellow dot",
            Instruction::PressAgain => "Great! Press it again",
            Instruction::TouchLeft => "Very good! Now gently touch the yellow dot on the left",
            Instruction::TouchRight => "That's it! Now touch the yellow dot on the right",
            Instruction::PressYellowFive => "Wonderful, now press the yellow dot five times",
            Instruction::PressRedFive => "Now press the red ones five times...",
            Instruction::PressBlueFive => "Then press the blue ones five times",
            Instruction::Shake => "Excellent! Now pick it up and give it a shake",
            Instruction::ShakeHarder => "Not bad! Shake it harder...",
            Instruction::TiltLeft => "Very good! Now tilt it to the left and see what happens...",
            Instruction::TiltRight => "And to the right? Want to try?",
            Instruction::ShakeToArrange => "Brilliant! Shake it once more to line the dots up",
            Instruction::PressAllYellow => "Lovely! Press every yellow dot and see what happens...",
            Instruction::Complete => "Fantastic! You finished every challenge!",
            Instruction::AudioRetry => "Audio failed to start, tap to retry",
        }
    }
}

/// A marker about to be drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSpawn {
    pub id: MarkerId,
    /// Center, percent of container
    pub position: Vec2,
    pub color: MarkerColor,
    /// Cosmetic fade-in delay; the marker is live immediately
    pub reveal_after: Duration,
}

/// Visual output
pub trait RenderSurface {
    fn create_marker(&mut self, spawn: &MarkerSpawn) -> SurfaceHandle;
    fn remove_marker(&mut self, handle: SurfaceHandle);
    fn move_marker(&mut self, handle: SurfaceHandle, position: Vec2);
    fn recolor_marker(&mut self, handle: SurfaceHandle, color: MarkerColor);
    /// Transient `+n` click badge at a marker's position
    fn show_counter(&mut self, position: Vec2, count: u32);
    fn set_text(&mut self, instruction: Instruction);
    /// CSS color of the page
    fn set_background(&mut self, color: &str);
    /// Rotate the whole container (degrees)
    fn rotate(&mut self, degrees: f32);
}

/// Fire-and-forget sound; implementations swallow and log their failures
pub trait AudioFeedback {
    fn play(&mut self, clip: SoundClip);
}

/// Everything a session drives
pub trait Capabilities: RenderSurface + AudioFeedback {}

impl<T: RenderSurface + AudioFeedback> Capabilities for T {}

/// Surface and audio that only log, for headless runs
#[derive(Debug, Default)]
pub struct LogSurface {
    next_handle: u64,
}

impl RenderSurface for LogSurface {
    fn create_marker(&mut self, spawn: &MarkerSpawn) -> SurfaceHandle {
        self.next_handle += 1;
        log::info!(
            "draw {} {} at ({:.1}%, {:.1}%)",
            spawn.color.as_str(),
            spawn.id,
            spawn.position.x,
            spawn.position.y
        );
        SurfaceHandle(self.next_handle)
    }

    fn remove_marker(&mut self, handle: SurfaceHandle) {
        log::info!("erase handle {}", handle.0);
    }

    fn move_marker(&mut self, _handle: SurfaceHandle, _position: Vec2) {}

    fn recolor_marker(&mut self, handle: SurfaceHandle, color: MarkerColor) {
        log::info!("recolor handle {} {}", handle.0, color.as_str());
    }

    fn show_counter(&mut self, _position: Vec2, count: u32) {
        log::info!("+{}", count);
    }

    fn set_text(&mut self, instruction: Instruction) {
        log::info!("\"{}\"", instruction.text());
    }

    fn set_background(&mut self, color: &str) {
        log::info!("background {}", color);
    }

    fn rotate(&mut self, degrees: f32) {
        log::info!("rotate {}deg", degrees);
    }
}

impl AudioFeedback for LogSurface {
    fn play(&mut self, clip: SoundClip) {
        log::debug!("play {}", clip.path());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Records everything the core asks for
    #[derive(Debug, Default)]
    pub struct Recorder {
        next_handle: u64,
        pub live: HashMap<SurfaceHandle, (MarkerId, Vec2, MarkerColor)>,
        pub spawns: Vec<MarkerSpawn>,
        pub removed: Vec<SurfaceHandle>,
        pub texts: Vec<Instruction>,
        pub counters: Vec<u32>,
        pub backgrounds: Vec<String>,
        pub rotations: Vec<f32>,
        pub sounds: Vec<SoundClip>,
    }

    impl Recorder {
        pub fn last_text(&self) -> Option<Instruction> {
            self.texts.last().copied()
        }

        pub fn count_sounds(&self, clip: SoundClip) -> usize {
            self.sounds.iter().filter(|c| **c == clip).count()
        }
    }

    impl RenderSurface for Recorder {
        fn create_marker(&mut self, spawn: &MarkerSpawn) -> SurfaceHandle {
            self.next_handle += 1;
            let handle = SurfaceHandle(self.next_handle);
            self.live.insert(handle, (spawn.id, spawn.position, spawn.color));
            self.spawns.push(*spawn);
            handle
        }

        fn remove_marker(&mut self, handle: SurfaceHandle) {
            self.live.remove(&handle);
            self.removed.push(handle);
        }

        fn move_marker(&mut self, handle: SurfaceHandle, position: Vec2) {
            if let Some(entry) = self.live.get_mut(&handle) {
                entry.1 = position;
            }
        }

        fn recolor_marker(&mut self, handle: SurfaceHandle, color: MarkerColor) {
            if let Some(entry) = self.live.get_mut(&handle) {
                entry.2 = color;
            }
        }

        fn show_counter(&mut self, _position: Vec2, count: u32) {
            self.counters.push(count);
        }

        fn set_text(&mut self, instruction: Instruction) {
            self.texts.push(instruction);
        }

        fn set_background(&mut self, color: &str) {
            self.backgrounds.push(color.to_string());
        }

        fn rotate(&mut self, degrees: f32) {
            self.rotations.push(degrees);
        }
    }

    impl AudioFeedback for Recorder {
        fn play(&mut self, clip: SoundClip) {
            self.sounds.push(clip);
        }
    }
}
